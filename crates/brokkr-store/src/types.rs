//! Record and index primitives shared by every backend driver.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A driver-level record: the stored value plus its encryption envelope.
///
/// `iv` and `tag` are either both present (the value is ciphertext) or both
/// absent (the value is plaintext JSON). Drivers persist these three fields
/// verbatim and never interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Serialized value: plaintext JSON, or base64 ciphertext when encrypted.
    pub value: String,
    /// Base64 initialization vector, present only for encrypted records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Base64 authentication tag, present only for encrypted records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Record {
    /// Build a plaintext record.
    #[must_use]
    pub fn plain(value: String) -> Self {
        Self {
            value,
            iv: None,
            tag: None,
        }
    }

    /// Build an encrypted record from envelope fields.
    #[must_use]
    pub fn encrypted(value: String, iv: String, tag: String) -> Self {
        Self {
            value,
            iv: Some(iv),
            tag: Some(tag),
        }
    }

    /// Classify this record at the encryption boundary.
    ///
    /// A record carrying exactly one of iv/tag is malformed and surfaces as a
    /// decryption failure, not as plaintext.
    pub fn sealed(self) -> StoreResult<Sealed> {
        match (self.iv, self.tag) {
            (Some(iv), Some(tag)) => Ok(Sealed::Encrypted {
                value: self.value,
                iv,
                tag,
            }),
            (None, None) => Ok(Sealed::Plain(self.value)),
            _ => Err(StoreError::Decryption(
                "record carries only one of iv/tag".to_string(),
            )),
        }
    }
}

/// The two valid shapes of a stored value, decided once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sealed {
    /// Plaintext JSON, stored without a configured encryption key.
    Plain(String),
    /// AES-GCM ciphertext with its envelope, all base64.
    Encrypted {
        value: String,
        iv: String,
        tag: String,
    },
}

/// A secondary index entry attached to a record at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub value: String,
}

impl Index {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Physical key of a record within a backend.
pub(crate) fn record_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// Physical key of a secondary index entry within a backend.
pub(crate) fn index_key(namespace: &str, index: &Index) -> String {
    format!("{namespace}:{}:{}", index.name, index.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_record_classifies_as_plain() {
        let record = Record::plain("{\"a\":1}".to_string());
        assert_eq!(
            record.sealed().unwrap(),
            Sealed::Plain("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_encrypted_record_classifies_as_encrypted() {
        let record = Record::encrypted("ct".to_string(), "iv".to_string(), "tag".to_string());
        match record.sealed().unwrap() {
            Sealed::Encrypted { value, iv, tag } => {
                assert_eq!(value, "ct");
                assert_eq!(iv, "iv");
                assert_eq!(tag, "tag");
            }
            Sealed::Plain(_) => panic!("expected encrypted"),
        }
    }

    #[test]
    fn test_iv_without_tag_is_malformed() {
        let record = Record {
            value: "ct".to_string(),
            iv: Some("iv".to_string()),
            tag: None,
        };
        assert!(matches!(
            record.sealed(),
            Err(StoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_tag_without_iv_is_malformed() {
        let record = Record {
            value: "ct".to_string(),
            iv: None,
            tag: Some("tag".to_string()),
        };
        assert!(record.sealed().is_err());
    }

    #[test]
    fn test_record_json_omits_absent_envelope() {
        let json = serde_json::to_string(&Record::plain("{}".to_string())).unwrap();
        assert!(!json.contains("iv"));
        assert!(!json.contains("tag"));
    }

    #[test]
    fn test_key_composition() {
        assert_eq!(record_key("oauth:code", "abc"), "oauth:code:abc");
        let index = Index::new("tenant_product", "acme:hr");
        assert_eq!(
            index_key("sso:connection", &index),
            "sso:connection:tenant_product:acme:hr"
        );
    }
}
