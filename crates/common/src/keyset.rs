use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::key::{KeyVersionList, VersionStatus};

#[derive(Debug, thiserror::Error)]
pub enum KeysetError {
    #[error("not a supported key template. See 'knox key-templates'")]
    UnknownTemplate,
    #[error("<key_identifier> must have prefix '{0}'")]
    IdPrefixMismatch(&'static str),
    #[error("key {0} does not use a recognized keyset prefix")]
    NotAKeysetKey(String),
    #[error("cannot decode keyset: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("version {0} holds a keyset with no subkey")]
    EmptyVersionKeyset(u64),
    #[error("failed to generate key material")]
    Material,
}

/// How ciphertext produced under a subkey is tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPrefix {
    Tink,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubkeyStatus {
    Enabled,
    Disabled,
}

/// One typed subkey inside a keyset. Each knox version of a keyset-typed
/// key stores a keyset holding exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subkey {
    pub id: u32,
    pub type_url: String,
    pub status: SubkeyStatus,
    pub output_prefix: OutputPrefix,
    #[serde(with = "b64_material")]
    pub material: Vec<u8>,
}

mod b64_material {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        BASE64_STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A set of subkeys with one marked primary. The encoded form is what a
/// keyset-typed key's version data contains; consumers treat it as opaque
/// bytes apart from this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyset {
    pub primary_id: u32,
    pub subkeys: Vec<Subkey>,
}

impl Keyset {
    pub fn encode(&self) -> Vec<u8> {
        // the encoding is internal to knox; JSON keeps it inspectable
        serde_json::to_vec(self).expect("keyset serialization cannot fail")
    }

    pub fn decode(data: &[u8]) -> Result<Keyset, KeysetError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// A supported keyset template: the knox id prefix its keys must use and
/// how to mint fresh material.
pub struct KeyTemplate {
    pub name: &'static str,
    pub id_prefix: &'static str,
    pub type_url: &'static str,
    pub material_len: usize,
    pub output_prefix: OutputPrefix,
}

pub const TEMPLATES: &[KeyTemplate] = &[
    KeyTemplate {
        name: "TINK_AEAD_AES256_GCM",
        id_prefix: "tink:aead:",
        type_url: "type.googleapis.com/google.crypto.tink.AesGcmKey",
        material_len: 32,
        output_prefix: OutputPrefix::Tink,
    },
    KeyTemplate {
        name: "TINK_AEAD_AES128_GCM",
        id_prefix: "tink:aead:",
        type_url: "type.googleapis.com/google.crypto.tink.AesGcmKey",
        material_len: 16,
        output_prefix: OutputPrefix::Tink,
    },
    KeyTemplate {
        name: "TINK_MAC_HMAC_SHA512_256BITTAG",
        id_prefix: "tink:mac:",
        type_url: "type.googleapis.com/google.crypto.tink.HmacKey",
        material_len: 64,
        output_prefix: OutputPrefix::Tink,
    },
    KeyTemplate {
        name: "TINK_DSIG_ED25519",
        id_prefix: "tink:dsig:",
        type_url: "type.googleapis.com/google.crypto.tink.Ed25519PrivateKey",
        material_len: 32,
        output_prefix: OutputPrefix::Tink,
    },
    KeyTemplate {
        name: "TINK_DAEAD_AES256_SIV",
        id_prefix: "tink:daead:",
        type_url: "type.googleapis.com/google.crypto.tink.AesSivKey",
        material_len: 64,
        output_prefix: OutputPrefix::Tink,
    },
    KeyTemplate {
        name: "TINK_SAEAD_AES128_GCM_HKDF_1MB",
        id_prefix: "tink:saead:",
        type_url: "type.googleapis.com/google.crypto.tink.AesGcmHkdfStreamingKey",
        material_len: 16,
        output_prefix: OutputPrefix::Raw,
    },
    KeyTemplate {
        name: "TINK_SAEAD_AES128_GCM_HKDF_4KB",
        id_prefix: "tink:saead:",
        type_url: "type.googleapis.com/google.crypto.tink.AesGcmHkdfStreamingKey",
        material_len: 16,
        output_prefix: OutputPrefix::Raw,
    },
];

pub fn template_by_name(name: &str) -> Result<&'static KeyTemplate, KeysetError> {
    TEMPLATES
        .iter()
        .find(|t| t.name == name)
        .ok_or(KeysetError::UnknownTemplate)
}

/// Supported template names, sorted for display.
pub fn template_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = TEMPLATES.iter().map(|t| t.name).collect();
    names.sort_unstable();
    names
}

/// Keys built from a template must be named `<prefix><anything>`, e.g.
/// `tink:aead:payments`.
pub fn obeys_naming_rule(template: &KeyTemplate, key_id: &str) -> Result<(), KeysetError> {
    if key_id.starts_with(template.id_prefix) {
        Ok(())
    } else {
        Err(KeysetError::IdPrefixMismatch(template.id_prefix))
    }
}

/// Whether the key id carries any recognized keyset prefix.
pub fn is_keyset_id(key_id: &str) -> bool {
    TEMPLATES.iter().any(|t| key_id.starts_with(t.id_prefix))
}

fn fresh_subkey(template: &KeyTemplate, taken: &HashSet<u32>) -> Result<Subkey, KeysetError> {
    let mut material = vec![0u8; template.material_len];
    getrandom::getrandom(&mut material).map_err(|_| KeysetError::Material)?;

    // Re-roll until the id is nonzero and unused anywhere in the key.
    let mut id = rand::random::<u32>();
    while id == 0 || taken.contains(&id) {
        id = rand::random::<u32>();
    }

    Ok(Subkey {
        id,
        type_url: template.type_url.to_string(),
        status: SubkeyStatus::Enabled,
        output_prefix: template.output_prefix,
        material,
    })
}

/// Mint a fresh single-subkey keyset for a new key's first version.
pub fn new_keyset(template: &KeyTemplate) -> Result<Vec<u8>, KeysetError> {
    let subkey = fresh_subkey(template, &HashSet::new())?;
    Ok(Keyset {
        primary_id: subkey.id,
        subkeys: vec![subkey],
    }
    .encode())
}

/// Mint the keyset for a new version of an existing key. The fresh subkey
/// id must not collide with the subkey id stored in any existing version,
/// which requires decoding every one of them.
pub fn add_keyset(
    template: &KeyTemplate,
    versions: &KeyVersionList,
) -> Result<Vec<u8>, KeysetError> {
    let mut taken = HashSet::new();
    for v in versions.iter() {
        let ks = Keyset::decode(&v.data)?;
        for sk in &ks.subkeys {
            taken.insert(sk.id);
        }
    }
    let subkey = fresh_subkey(template, &taken)?;
    Ok(Keyset {
        primary_id: subkey.id,
        subkeys: vec![subkey],
    }
    .encode())
}

/// Combine the single-subkey keysets of every version into one keyset.
/// The primary version's subkey becomes the keyset primary. Also returns
/// the subkey-id to knox-version-id mapping used by the metadata view.
pub fn aggregate(versions: &KeyVersionList) -> Result<(Keyset, BTreeMap<u32, u64>), KeysetError> {
    let mut combined = Keyset {
        primary_id: 0,
        subkeys: Vec::new(),
    };
    let mut version_by_subkey = BTreeMap::new();
    for v in versions.iter() {
        let ks = Keyset::decode(&v.data)?;
        let subkey = ks
            .subkeys
            .into_iter()
            .next()
            .ok_or(KeysetError::EmptyVersionKeyset(v.id))?;
        if v.status == VersionStatus::Primary {
            combined.primary_id = subkey.id;
        }
        version_by_subkey.insert(subkey.id, v.id);
        combined.subkeys.push(subkey);
    }
    Ok((combined, version_by_subkey))
}

/// Metadata for one subkey; no key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubkeyInfo {
    pub type_url: String,
    pub status: SubkeyStatus,
    pub key_id: u32,
    pub output_prefix: OutputPrefix,
    pub knox_version_id: u64,
}

/// Metadata projection of an aggregated keyset, for info queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetInfo {
    pub primary_key_id: u32,
    pub key_info: Vec<SubkeyInfo>,
}

impl KeysetInfo {
    pub fn new(keyset: &Keyset, version_by_subkey: &BTreeMap<u32, u64>) -> KeysetInfo {
        KeysetInfo {
            primary_key_id: keyset.primary_id,
            key_info: keyset
                .subkeys
                .iter()
                .map(|sk| SubkeyInfo {
                    type_url: sk.type_url.clone(),
                    status: sk.status,
                    key_id: sk.id,
                    output_prefix: sk.output_prefix,
                    knox_version_id: version_by_subkey.get(&sk.id).copied().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyVersion;

    fn aead_template() -> &'static KeyTemplate {
        template_by_name("TINK_AEAD_AES256_GCM").unwrap()
    }

    fn version_with(data: Vec<u8>, id: u64, status: VersionStatus) -> KeyVersion {
        KeyVersion {
            id,
            data,
            status,
            creation_time: 0,
        }
    }

    #[test]
    fn naming_rule() {
        let t = aead_template();
        obeys_naming_rule(t, "tink:aead:payments").unwrap();
        assert!(obeys_naming_rule(t, "payments").is_err());
        assert!(is_keyset_id("tink:mac:checksums"));
        assert!(!is_keyset_id("plain_secret"));
        assert!(template_by_name("NOT_A_TEMPLATE").is_err());
    }

    #[test]
    fn new_keyset_has_one_enabled_primary_subkey() {
        let ks = Keyset::decode(&new_keyset(aead_template()).unwrap()).unwrap();
        assert_eq!(ks.subkeys.len(), 1);
        assert_eq!(ks.primary_id, ks.subkeys[0].id);
        assert_eq!(ks.subkeys[0].status, SubkeyStatus::Enabled);
        assert_eq!(ks.subkeys[0].material.len(), 32);
        assert_ne!(ks.subkeys[0].id, 0);
    }

    #[test]
    fn add_keyset_avoids_existing_subkey_ids() {
        let t = aead_template();
        let mut versions = KeyVersionList(vec![version_with(
            new_keyset(t).unwrap(),
            1,
            VersionStatus::Primary,
        )]);
        let mut seen: HashSet<u32> = versions
            .iter()
            .map(|v| Keyset::decode(&v.data).unwrap().subkeys[0].id)
            .collect();

        for i in 0..20 {
            let data = add_keyset(t, &versions).unwrap();
            let id = Keyset::decode(&data).unwrap().subkeys[0].id;
            assert!(seen.insert(id), "duplicate subkey id generated");
            versions
                .0
                .push(version_with(data, i + 2, VersionStatus::Active));
        }
    }

    #[test]
    fn aggregate_marks_primary_and_maps_versions() {
        let t = aead_template();
        let primary_data = new_keyset(t).unwrap();
        let primary_subkey = Keyset::decode(&primary_data).unwrap().primary_id;
        let versions = KeyVersionList(vec![
            version_with(primary_data, 10, VersionStatus::Primary),
            version_with(new_keyset(t).unwrap(), 11, VersionStatus::Active),
        ]);

        let (combined, mapping) = aggregate(&versions).unwrap();
        assert_eq!(combined.subkeys.len(), 2);
        assert_eq!(combined.primary_id, primary_subkey);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[&primary_subkey], 10);

        let info = KeysetInfo::new(&combined, &mapping);
        assert_eq!(info.primary_key_id, primary_subkey);
        assert_eq!(info.key_info.len(), 2);
        let text = serde_json::to_string(&info).unwrap();
        assert!(!text.contains("material"));
    }

    #[test]
    fn aggregate_rejects_garbage_version_data() {
        let versions = KeyVersionList(vec![version_with(
            b"not a keyset".to_vec(),
            1,
            VersionStatus::Primary,
        )]);
        assert!(aggregate(&versions).is_err());
    }
}
