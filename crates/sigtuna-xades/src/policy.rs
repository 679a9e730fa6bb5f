#![forbid(unsafe_code)]

//! Signature policy metadata.
//!
//! A signing deployment ships a catalog of policies; the engine only
//! consumes the fields below. Catalog acquisition and parsing stay with
//! the caller.

use sigtuna_transforms::TransformChain;

/// A commitment type a policy offers to signers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentType {
    /// Identifier URI recorded in `CommitmentTypeId`.
    pub id: String,
    /// Human-readable description.
    pub description: Option<String>,
}

/// Metadata describing one signature policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyInfo {
    /// Policy identifier, also used as the fetch URI when `url` is unset.
    pub id: String,
    pub description: Option<String>,
    /// Digest method URI for the policy document hash.
    pub digest_method: String,
    /// Transforms applied to the policy document before hashing.
    pub transform_chain: TransformChain,
    /// Location of the policy document, when distinct from `id`.
    pub url: Option<String>,
    /// Digest methods the policy permits for references.
    pub allowed_digest_methods: Vec<String>,
    /// Commitment types signers may indicate under this policy.
    pub commitment_types: Vec<CommitmentType>,
}

impl PolicyInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            digest_method: sigtuna_core::algorithm::SHA256.to_owned(),
            ..Self::default()
        }
    }

    /// The URI the policy document is fetched from.
    pub fn fetch_uri(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_uri_prefers_the_url() {
        let mut policy = PolicyInfo::new("urn:policy:1");
        assert_eq!(policy.fetch_uri(), "urn:policy:1");
        policy.url = Some("https://example.org/policy.pdf".into());
        assert_eq!(policy.fetch_uri(), "https://example.org/policy.pdf");
    }
}
