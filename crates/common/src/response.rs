use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status subcodes carried in the response envelope. These are knox-level
/// codes, not HTTP statuses; the HTTP layer maps each to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    NoKeyId = 1,
    InternalServerError = 2,
    KeyIdentifierExists = 3,
    KeyVersionDoesNotExist = 4,
    KeyIdentifierDoesNotExist = 5,
    Unauthenticated = 6,
    Unauthorized = 7,
    NotYetImplemented = 8,
    NotFound = 9,
    NoKeyData = 10,
    BadRequestData = 11,
    BadKeyFormat = 12,
    BadPrincipalIdentifier = 13,
    BadAcl = 14,
    NoMultipleHumanAdminsInAcl = 15,
}

impl Code {
    pub fn from_i64(value: i64) -> Option<Code> {
        use Code::*;
        Some(match value {
            0 => Ok,
            1 => NoKeyId,
            2 => InternalServerError,
            3 => KeyIdentifierExists,
            4 => KeyVersionDoesNotExist,
            5 => KeyIdentifierDoesNotExist,
            6 => Unauthenticated,
            7 => Unauthorized,
            8 => NotYetImplemented,
            9 => NotFound,
            10 => NoKeyData,
            11 => BadRequestData,
            12 => BadKeyFormat,
            13 => BadPrincipalIdentifier,
            14 => BadAcl,
            15 => NoMultipleHumanAdminsInAcl,
            _ => return None,
        })
    }
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(*self as i64)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(d)?;
        Code::from_i64(value)
            .ok_or_else(|| D::Error::custom(format!("unknown status code {}", value)))
    }
}

/// The envelope wrapped around every server response. `data` holds the
/// operation result for `status == "ok"` responses and is left untyped
/// here; callers decode it into the shape the operation promises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
    pub code: Code,
    pub host: String,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_as_numbers() {
        let text = serde_json::to_string(&Code::Unauthorized).unwrap();
        assert_eq!(text, "7");
        let back: Code = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Code::Unauthorized);
        assert!(serde_json::from_str::<Code>("99").is_err());
    }

    #[test]
    fn envelope_shape() {
        let resp = Response {
            status: "ok".to_string(),
            code: Code::Ok,
            host: "test".to_string(),
            timestamp: 1234567890,
            message: String::new(),
            data: Some(serde_json::json!(["a", "b"])),
        };
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains("\"code\":0"));
        assert!(text.contains("\"ts\":1234567890"));
        let back: Response = serde_json::from_str(&text).unwrap();
        assert!(back.is_ok());
        assert_eq!(back.data, resp.data);
    }
}
