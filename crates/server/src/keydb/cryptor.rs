use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

const NONCE_SIZE: usize = 12;
pub const MASTER_KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptorError {
    #[error("sealed blob is too short")]
    Truncated,
    #[error("sealed blob was produced under master key id {0}")]
    UnknownKeyId(u8),
    #[error("encrypt error")]
    Encrypt,
    #[error("decrypt error")]
    Decrypt,
    #[error("failed to generate nonce")]
    Nonce,
}

/// The envelope-encryption boundary. The key manager hands cleartext
/// version material in and stores whatever comes out; nothing else in
/// the server sees either side.
pub trait Cryptor: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptorError>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptorError>;
}

/// ChaCha20-Poly1305 cryptor under a single master key.
///
/// Sealed layout: `key_id (1 byte) || nonce (12 bytes) || ciphertext`.
/// The key id byte leaves room for master-key rotation: a decryptor can
/// refuse blobs sealed under a key it does not hold.
pub struct ChaChaCryptor {
    key_id: u8,
    cipher: ChaCha20Poly1305,
}

impl ChaChaCryptor {
    pub fn new(key_id: u8, master_key: &[u8; MASTER_KEY_SIZE]) -> Self {
        ChaChaCryptor {
            key_id,
            cipher: ChaCha20Poly1305::new(Key::from_slice(master_key)),
        }
    }
}

impl Cryptor for ChaChaCryptor {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptorError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes).map_err(|_| CryptorError::Nonce)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|_| CryptorError::Encrypt)?;

        let mut out = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        out.push(self.key_id);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptorError> {
        if data.len() < 1 + NONCE_SIZE {
            return Err(CryptorError::Truncated);
        }
        if data[0] != self.key_id {
            return Err(CryptorError::UnknownKeyId(data[0]));
        }
        let nonce = Nonce::from_slice(&data[1..1 + NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &data[1 + NONCE_SIZE..])
            .map_err(|_| CryptorError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cryptor() -> ChaChaCryptor {
        ChaChaCryptor::new(0, b"testtesttesttesttesttesttesttest")
    }

    #[test]
    fn seal_and_open() {
        let c = cryptor();
        let sealed = c.encrypt(b"key material").unwrap();
        assert_ne!(&sealed[1 + NONCE_SIZE..], b"key material");
        assert_eq!(c.decrypt(&sealed).unwrap(), b"key material");
    }

    #[test]
    fn tampering_fails_decrypt() {
        let c = cryptor();
        let mut sealed = c.encrypt(b"key material").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(c.decrypt(&sealed), Err(CryptorError::Decrypt)));
    }

    #[test]
    fn wrong_key_id_is_refused() {
        let c = cryptor();
        let mut sealed = c.encrypt(b"key material").unwrap();
        sealed[0] = 9;
        assert!(matches!(c.decrypt(&sealed), Err(CryptorError::UnknownKeyId(9))));
    }

    #[test]
    fn short_blob_is_refused() {
        let c = cryptor();
        assert!(matches!(c.decrypt(&[0u8; 4]), Err(CryptorError::Truncated)));
    }
}
