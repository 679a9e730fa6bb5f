#![forbid(unsafe_code)]

//! The `<xades:SignedSignatureProperties>` block: signing time, signing
//! certificate and signature policy.

use crate::hash;
use crate::policy::PolicyInfo;
use crate::resolver::{self, UriResolver};
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_crypto::digest;
use sigtuna_keys::x509;
use sigtuna_transforms::{TransformChain, TransformData};
use sigtuna_xml::document::{find_child, text_at};
use sigtuna_xml::writer::XmlWriter;
use tracing::{debug, warn};

const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Signature-level signed properties.
#[derive(Debug, Clone, Default)]
pub struct SignatureProperties {
    /// Claimed signing time; filled with the current time on create
    /// when unset.
    pub signing_time: Option<DateTime<Utc>>,
    /// Policy identifier; `None` means the policy is implied.
    pub policy_id: Option<String>,
    /// Location the policy document is fetched from, when distinct
    /// from the identifier.
    pub policy_url: Option<String>,
    /// Transforms applied to the policy document before hashing.
    pub policy_transform_chain: TransformChain,
    /// Digest method URI for the policy hash.
    pub policy_digest_method: String,
    /// The policy hash; computed lazily on create when unset.
    pub policy_digest: Option<Vec<u8>>,
}

impl SignatureProperties {
    pub fn new() -> Self {
        Self {
            policy_digest_method: algorithm::SHA256.to_owned(),
            ..Self::default()
        }
    }

    /// Take the policy fields from a policy catalog entry.
    pub fn apply_policy(&mut self, policy: &PolicyInfo) {
        self.policy_id = Some(policy.id.clone());
        self.policy_url = policy.url.clone();
        self.policy_transform_chain = policy.transform_chain.clone();
        self.policy_digest_method = policy.digest_method.clone();
        self.policy_digest = None;
    }

    /// Parse from an existing `<SignedProperties>` element. Absent or
    /// malformed optional values are dropped, not errors.
    pub fn from_signed_properties(signed_properties: roxmltree::Node<'_, '_>) -> Self {
        let mut props = Self::new();
        let Some(ssp) = find_child(
            signed_properties,
            ns::XADES,
            ns::node::SIGNED_SIGNATURE_PROPERTIES,
        ) else {
            return props;
        };

        if let Some(text) = text_at(ssp, &[(ns::XADES, ns::node::SIGNING_TIME)]) {
            props.signing_time = parse_signing_time(&text);
        }

        let policy_id_node = find_child(ssp, ns::XADES, ns::node::SIGNATURE_POLICY_IDENTIFIER)
            .and_then(|n| find_child(n, ns::XADES, ns::node::SIGNATURE_POLICY_ID));
        if let Some(policy) = policy_id_node {
            props.policy_id = text_at(
                policy,
                &[
                    (ns::XADES, ns::node::SIG_POLICY_ID),
                    (ns::XADES, ns::node::IDENTIFIER),
                ],
            );
            if let Some(transforms) = find_child(policy, ns::DSIG, ns::node::TRANSFORMS) {
                match TransformChain::from_transforms_node(transforms) {
                    Ok(chain) => props.policy_transform_chain = chain,
                    Err(e) => warn!(error = %e, "ignoring unparsable policy transform chain"),
                }
            }
            if let Some(hash_node) = find_child(policy, ns::XADES, ns::node::SIG_POLICY_HASH) {
                if let Some(method) = find_child(hash_node, ns::DSIG, ns::node::DIGEST_METHOD)
                    .and_then(|n| n.attribute(ns::attr::ALGORITHM))
                {
                    props.policy_digest_method = method.to_owned();
                }
                if let Some(value) = text_at(hash_node, &[(ns::DSIG, ns::node::DIGEST_VALUE)]) {
                    let clean: String =
                        value.chars().filter(|c| !c.is_whitespace()).collect();
                    match base64::engine::general_purpose::STANDARD.decode(&clean) {
                        Ok(bytes) => props.policy_digest = Some(bytes),
                        Err(e) => warn!(error = %e, "ignoring unparsable policy digest"),
                    }
                }
            }
        }
        props
    }

    /// Compute the policy digest from the policy document.
    pub fn update_hash(&mut self, resolver: Option<&UriResolver<'_>>) -> Result<(), Error> {
        let uri = self
            .policy_url
            .as_deref()
            .or(self.policy_id.as_deref())
            .ok_or_else(|| Error::XmlStructure("policy hash requested without a policy".into()))?;
        debug!(uri, "fetching policy document for hashing");
        let bytes = resolver::fetch(uri, resolver)?;
        self.policy_digest = Some(hash::calculate_hash(
            TransformData::Binary(bytes),
            &self.policy_transform_chain,
            &self.policy_digest_method,
        )?);
        Ok(())
    }

    /// Refetch the policy document and compare its digest with the
    /// stored value. Fails closed on any error.
    pub fn check_digest(&self, resolver: Option<&UriResolver<'_>>) -> bool {
        let Some(expected) = self.policy_digest.as_deref() else {
            return false;
        };
        let Some(uri) = self.policy_url.as_deref().or(self.policy_id.as_deref()) else {
            return false;
        };
        let computed = resolver::fetch(uri, resolver).and_then(|bytes| {
            hash::calculate_hash(
                TransformData::Binary(bytes),
                &self.policy_transform_chain,
                &self.policy_digest_method,
            )
        });
        match computed {
            Ok(digest) => hash::digest_equal(&digest, expected),
            Err(e) => {
                warn!(uri, error = %e, "policy digest check failed");
                false
            }
        }
    }

    /// Serialize as `<xades:SignedSignatureProperties>`, binding the
    /// signing certificate. Computes the policy digest when it has not
    /// been set yet.
    pub fn write_into(
        &mut self,
        w: &mut XmlWriter,
        cert_der: &[u8],
        resolver: Option<&UriResolver<'_>>,
    ) -> Result<(), Error> {
        let engine = base64::engine::general_purpose::STANDARD;
        let cert = x509::parse_certificate(cert_der)?;

        if self.signing_time.is_none() {
            self.signing_time = Some(Utc::now());
        }
        let signing_time = self
            .signing_time
            .as_ref()
            .map(|t| t.format(SIGNING_TIME_FORMAT).to_string())
            .unwrap_or_default();

        w.start_element("xades:SignedSignatureProperties", &[]);

        w.start_element("xades:SigningTime", &[]);
        w.write_text(&signing_time);
        w.end_element();

        w.start_element("xades:SigningCertificate", &[]);
        w.start_element("xades:Cert", &[]);
        w.start_element("xades:CertDigest", &[]);
        w.empty_element("ds:DigestMethod", &[(ns::attr::ALGORITHM, algorithm::SHA256)]);
        w.start_element("ds:DigestValue", &[]);
        w.write_text(&engine.encode(digest::digest(algorithm::SHA256, cert_der)?));
        w.end_element();
        w.end_element();
        w.start_element("xades:IssuerSerial", &[]);
        w.start_element("ds:X509IssuerName", &[]);
        w.write_text(&x509::issuer_name(&cert));
        w.end_element();
        w.start_element("ds:X509SerialNumber", &[]);
        w.write_text(&x509::serial_decimal(&cert));
        w.end_element();
        w.end_element();
        w.end_element();
        w.end_element();

        w.start_element("xades:SignaturePolicyIdentifier", &[]);
        if let Some(policy_id) = self.policy_id.clone() {
            w.start_element("xades:SignaturePolicyId", &[]);
            w.start_element("xades:SigPolicyId", &[]);
            w.start_element("xades:Identifier", &[]);
            w.write_text(&policy_id);
            w.end_element();
            w.end_element();
            self.policy_transform_chain.write_into(w);
            if self.policy_digest.is_none() {
                self.update_hash(resolver)?;
            }
            let policy_digest = self.policy_digest.clone().unwrap_or_default();
            w.start_element("xades:SigPolicyHash", &[]);
            w.empty_element(
                "ds:DigestMethod",
                &[(ns::attr::ALGORITHM, &self.policy_digest_method)],
            );
            w.start_element("ds:DigestValue", &[]);
            w.write_text(&engine.encode(&policy_digest));
            w.end_element();
            w.end_element();
            w.end_element();
        } else {
            w.empty_element("xades:SignaturePolicyImplied", &[]);
        }
        w.end_element();

        w.end_element();
        Ok(())
    }
}

fn parse_signing_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, SIGNING_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_props(xml: &str) -> SignatureProperties {
        let doc = roxmltree::Document::parse(xml).unwrap();
        SignatureProperties::from_signed_properties(doc.root_element())
    }

    #[test]
    fn parses_signing_time_and_policy() {
        let props = parse_props(&format!(
            "<xades:SignedProperties xmlns:xades=\"{xades}\" xmlns:ds=\"{dsig}\">\
             <xades:SignedSignatureProperties>\
             <xades:SigningTime>2024-05-17T09:30:00</xades:SigningTime>\
             <xades:SignaturePolicyIdentifier><xades:SignaturePolicyId>\
             <xades:SigPolicyId><xades:Identifier>urn:policy:1</xades:Identifier></xades:SigPolicyId>\
             <xades:SigPolicyHash>\
             <ds:DigestMethod Algorithm=\"{sha}\"/>\
             <ds:DigestValue>cG9saWN5aGFzaA==</ds:DigestValue>\
             </xades:SigPolicyHash>\
             </xades:SignaturePolicyId></xades:SignaturePolicyIdentifier>\
             </xades:SignedSignatureProperties>\
             </xades:SignedProperties>",
            xades = ns::XADES,
            dsig = ns::DSIG,
            sha = algorithm::SHA256,
        ));
        let time = props.signing_time.unwrap();
        assert_eq!(time.format(SIGNING_TIME_FORMAT).to_string(), "2024-05-17T09:30:00");
        assert_eq!(props.policy_id.as_deref(), Some("urn:policy:1"));
        assert_eq!(props.policy_digest_method, algorithm::SHA256);
        assert_eq!(props.policy_digest.as_deref(), Some(&b"policyhash"[..]));
    }

    #[test]
    fn implied_policy_parses_to_none() {
        let props = parse_props(&format!(
            "<xades:SignedProperties xmlns:xades=\"{xades}\">\
             <xades:SignedSignatureProperties>\
             <xades:SigningTime>2024-05-17T09:30:00</xades:SigningTime>\
             <xades:SignaturePolicyIdentifier><xades:SignaturePolicyImplied/>\
             </xades:SignaturePolicyIdentifier>\
             </xades:SignedSignatureProperties>\
             </xades:SignedProperties>",
            xades = ns::XADES,
        ));
        assert!(props.policy_id.is_none());
        assert!(props.policy_digest.is_none());
    }

    #[test]
    fn policy_check_fails_closed_without_a_digest() {
        let mut props = SignatureProperties::new();
        props.policy_id = Some("urn:policy:1".into());
        assert!(!props.check_digest(None));
    }

    #[test]
    fn policy_digest_round_trip() {
        let mut props = SignatureProperties::new();
        props.policy_id = Some("urn:policy:1".into());
        let resolver = |uri: &str| (uri == "urn:policy:1").then(|| b"the policy".to_vec());
        props.update_hash(Some(&resolver)).unwrap();
        assert!(props.check_digest(Some(&resolver)));
        let changed = |uri: &str| (uri == "urn:policy:1").then(|| b"another policy".to_vec());
        assert!(!props.check_digest(Some(&changed)));
    }

    #[test]
    fn policy_url_overrides_the_identifier_for_fetching() {
        let mut props = SignatureProperties::new();
        props.policy_id = Some("urn:policy:1".into());
        props.policy_url = Some("urn:mirror:policy:1".into());
        let resolver = |uri: &str| (uri == "urn:mirror:policy:1").then(|| b"p".to_vec());
        props.update_hash(Some(&resolver)).unwrap();
        assert!(props.policy_digest.is_some());
    }
}
