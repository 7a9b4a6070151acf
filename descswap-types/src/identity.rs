//! Package identity records: the deserialized structures carrying a
//! package's reported signing credentials.
//!
//! Host versions populate one of two representations (a flat credential
//! list or a structured signing block), sometimes both. Anything that
//! rewrites credentials has to check both.

use serde::{Deserialize, Serialize};

/// One signing credential, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningCredential(pub String);

impl SigningCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Structured signing representation used by newer host versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningBlock {
    pub signers: Vec<SigningCredential>,
}

/// A deserialized package identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub package_name: String,
    /// Legacy flat representation. May be empty.
    #[serde(default)]
    pub signatures: Vec<SigningCredential>,
    /// Structured representation. May be absent on older hosts.
    #[serde(default)]
    pub signing_block: Option<SigningBlock>,
}

impl PackageIdentity {
    /// True if the record carries any non-empty signing credential, in
    /// either representation.
    pub fn has_credentials(&self) -> bool {
        self.signatures.iter().any(|s| !s.0.is_empty())
            || self
                .signing_block
                .as_ref()
                .is_some_and(|b| b.signers.iter().any(|s| !s.0.is_empty()))
    }

    /// The credential an outside observer sees first, from whichever
    /// representation is populated.
    pub fn reported_credential(&self) -> Option<&SigningCredential> {
        self.signatures
            .first()
            .or_else(|| self.signing_block.as_ref().and_then(|b| b.signers.first()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_record_has_no_credentials() {
        let id = PackageIdentity {
            package_name: "com.example".into(),
            signatures: vec![],
            signing_block: None,
        };
        assert!(!id.has_credentials());
        assert!(id.reported_credential().is_none());
    }

    #[test]
    fn either_representation_counts() {
        let flat = PackageIdentity {
            package_name: "a".into(),
            signatures: vec![SigningCredential::new("aa")],
            signing_block: None,
        };
        let block = PackageIdentity {
            package_name: "b".into(),
            signatures: vec![],
            signing_block: Some(SigningBlock {
                signers: vec![SigningCredential::new("bb")],
            }),
        };
        assert!(flat.has_credentials());
        assert!(block.has_credentials());
        assert_eq!(block.reported_credential().unwrap().as_str(), "bb");
    }

    #[test]
    fn serde_round_trip_tolerates_missing_fields() {
        let json = r#"{"package_name":"com.example"}"#;
        let id: PackageIdentity = serde_json::from_str(json).unwrap();
        assert!(id.signatures.is_empty());
        assert!(id.signing_block.is_none());
    }
}
