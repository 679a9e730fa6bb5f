#![forbid(unsafe_code)]

//! XAdES signature creation and verification.
//!
//! A signature covers a set of files plus its own `SignedProperties`
//! block. Verification reports three independent findings: the
//! signature value over `SignedInfo`, the per-file reference digests,
//! and the signed-properties digest. The document is valid only when
//! all three hold, but each is computed even when another fails.

use crate::file::FileReference;
use crate::hash;
use crate::properties::SignatureProperties;
use crate::resolver::UriResolver;
use crate::sink::PackagingSink;
use base64::Engine;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_keys::{keyinfo, Key};
use sigtuna_transforms::{Transform, TransformChain, TransformData};
use sigtuna_xml::document::{find_child, find_children, find_element};
use sigtuna_xml::writer::XmlWriter;
use sigtuna_xml::NodeSet;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Outcome of [`XadesSignature::verify`].
#[derive(Debug)]
pub struct VerifyReport {
    /// The signature value verifies over the canonicalized SignedInfo.
    pub signature_valid: bool,
    /// Every file reference digest matches.
    pub references_valid: bool,
    /// The signed-properties digest matches.
    pub properties_valid: bool,
    /// Per-reference results, keyed by reference id (URI when no id).
    pub reference_status: Vec<(String, bool)>,
    /// DER certificate attached to the key that validated the
    /// signature, when `KeyInfo` carried one.
    pub certificate: Option<Vec<u8>>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.signature_valid && self.references_valid && self.properties_valid
    }
}

struct PropertiesReference {
    id: String,
    chain: TransformChain,
    digest_method: String,
    expected_digest: Vec<u8>,
}

struct LoadedSignature {
    xml: String,
    props: Option<PropertiesReference>,
}

/// A XAdES signature over a set of file references.
pub struct XadesSignature {
    /// Canonicalization method for `SignedInfo`.
    pub canonicalization_method: String,
    /// Signature method for the signature value.
    pub signature_method: String,
    /// Signature-level signed properties.
    pub properties: SignatureProperties,
    /// The files this signature covers.
    pub files: Vec<FileReference>,
    loaded: Option<LoadedSignature>,
}

impl XadesSignature {
    /// New empty signature with the default methods.
    pub fn new() -> Self {
        Self {
            canonicalization_method: algorithm::C14N_WITH_COMMENTS.to_owned(),
            signature_method: algorithm::RSA_SHA256.to_owned(),
            properties: SignatureProperties::new(),
            files: Vec::new(),
            loaded: None,
        }
    }

    /// Parse an existing signature document for verification.
    pub fn from_xml(xml: &str) -> Result<Self, Error> {
        let doc = sigtuna_xml::parse(xml)?;
        let sig_node = find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE.into()))?;
        let signed_info = find_child(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;

        let canonicalization_method =
            find_child(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
                .and_then(|n| n.attribute(ns::attr::ALGORITHM))
                .ok_or_else(|| Error::MissingElement(ns::node::CANONICALIZATION_METHOD.into()))?
                .to_owned();
        let signature_method = find_child(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE_METHOD.into()))?
            .to_owned();

        let mut files = Vec::new();
        let mut props_ref = None;
        let mut props_node = None;
        for reference in find_children(signed_info, ns::DSIG, ns::node::REFERENCE) {
            let uri = reference.attribute(ns::attr::URI).unwrap_or("");
            if reference.attribute(ns::attr::TYPE) == Some(algorithm::XADES_REFERENCE_TYPE) {
                if let Some(id) = uri.strip_prefix('#') {
                    if let Some(sp) = find_signed_properties(&doc, id) {
                        props_ref = Some(parse_properties_reference(reference, id)?);
                        props_node = Some(sp);
                        continue;
                    }
                }
            }
            files.push(FileReference::from_reference_node(reference)?);
        }

        let properties = match props_node {
            Some(sp) => {
                for file in &mut files {
                    file.parse_properties(sp);
                }
                SignatureProperties::from_signed_properties(sp)
            }
            None => {
                warn!("signature document has no signed-properties reference");
                SignatureProperties::new()
            }
        };

        Ok(Self {
            canonicalization_method,
            signature_method,
            properties,
            files,
            loaded: Some(LoadedSignature {
                xml: xml.to_owned(),
                props: props_ref,
            }),
        })
    }

    /// Assign the lowest unused `ref{N}` id to every file without one
    /// (or with a duplicate). Deterministic: the same list always gets
    /// the same ids.
    pub fn assign_file_ids(&mut self) {
        let mut ids: HashSet<String> = HashSet::new();
        let mut n = 0usize;
        for file in &mut self.files {
            let taken = file.id.as_ref().is_none_or(|id| ids.contains(id));
            if taken {
                let mut candidate = format!("ref{n}");
                while ids.contains(&candidate) {
                    n += 1;
                    candidate = format!("ref{n}");
                }
                file.id = Some(candidate);
            }
            if let Some(id) = &file.id {
                ids.insert(id.clone());
            }
        }
    }

    /// Create the signature document. Fails without partial output:
    /// an unreadable file, an unavailable policy document or a signing
    /// failure abort the whole run.
    pub fn create(
        &mut self,
        key: &Key,
        resolver: Option<&UriResolver<'_>>,
    ) -> Result<String, Error> {
        if !key.can_sign() {
            return Err(Error::Key("signing requires a private key".into()));
        }
        let cert_der = key
            .certificate_der()
            .ok_or_else(|| Error::Key("signing requires a certificate".into()))?
            .to_vec();
        self.assign_file_ids();

        let engine = base64::engine::general_purpose::STANDARD;
        let props_chain = TransformChain::new(vec![Transform::Canonicalize {
            with_comments: true,
        }]);

        let mut w = XmlWriter::new();
        w.start_element(
            "ds:Signature",
            &[
                ("xmlns:ds", ns::DSIG),
                (ns::attr::ID, algorithm::XADES_SIGNATURE_ROOT_ID),
            ],
        );
        w.start_element("ds:SignedInfo", &[]);
        w.empty_element(
            "ds:CanonicalizationMethod",
            &[(ns::attr::ALGORITHM, &self.canonicalization_method)],
        );
        w.empty_element(
            "ds:SignatureMethod",
            &[(ns::attr::ALGORITHM, &self.signature_method)],
        );

        // The signed-properties reference; its digest is filled in
        // after the whole template exists.
        w.start_element(
            "ds:Reference",
            &[
                (ns::attr::TYPE, algorithm::XADES_REFERENCE_TYPE),
                (
                    ns::attr::URI,
                    &format!("#{}", algorithm::XADES_SIGNED_PROPERTIES_ID),
                ),
            ],
        );
        props_chain.write_into(&mut w);
        w.empty_element("ds:DigestMethod", &[(ns::attr::ALGORITHM, algorithm::SHA256)]);
        w.start_element("ds:DigestValue", &[]);
        w.write_text("");
        w.end_element();
        w.end_element();

        for file in &self.files {
            file.write_reference(&mut w, resolver)?;
        }
        w.end_element();

        w.start_element("ds:SignatureValue", &[]);
        w.write_text("");
        w.end_element();

        w.start_element("ds:KeyInfo", &[]);
        w.start_element("ds:X509Data", &[]);
        for der in &key.x509_chain {
            w.start_element("ds:X509Certificate", &[]);
            w.write_text(&engine.encode(der));
            w.end_element();
        }
        w.end_element();
        w.end_element();

        w.start_element("ds:Object", &[]);
        w.start_element(
            "xades:QualifyingProperties",
            &[
                ("xmlns:xades", ns::XADES),
                (
                    ns::attr::TARGET,
                    &format!("#{}", algorithm::XADES_SIGNATURE_ROOT_ID),
                ),
            ],
        );
        w.start_element(
            "xades:SignedProperties",
            &[(ns::attr::ID, algorithm::XADES_SIGNED_PROPERTIES_ID)],
        );
        self.properties.write_into(&mut w, &cert_der, resolver)?;
        w.start_element("xades:SignedDataObjectProperties", &[]);
        for file in &self.files {
            file.write_object_format(&mut w)?;
        }
        for file in &self.files {
            file.write_commitment_type_indication(&mut w)?;
        }
        w.end_element();
        w.end_element();
        w.end_element();
        w.end_element();
        w.end_element();
        let mut xml = w.into_string();

        // Fill the signed-properties digest. The placeholder is the
        // only remaining empty DigestValue.
        let props_digest_b64 = {
            let doc = sigtuna_xml::parse(&xml)?;
            let sp = find_signed_properties(&doc, algorithm::XADES_SIGNED_PROPERTIES_ID)
                .ok_or_else(|| {
                    Error::XmlStructure("SignedProperties missing from template".into())
                })?;
            let set = NodeSet::tree(sp, true);
            let data = TransformData::Xml {
                xml_text: xml.clone(),
                node_set: Some(set),
            };
            engine.encode(hash::calculate_hash(data, &props_chain, algorithm::SHA256)?)
        };
        xml = xml.replacen(
            "<ds:DigestValue></ds:DigestValue>",
            &format!("<ds:DigestValue>{props_digest_b64}</ds:DigestValue>"),
            1,
        );

        // Canonicalize SignedInfo and sign it.
        let sig_b64 = {
            let doc = sigtuna_xml::parse(&xml)?;
            let sig_node = find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
                .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE.into()))?;
            let signed_info = find_child(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
                .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;
            let mode = C14nMode::from_uri(&self.canonicalization_method).ok_or_else(|| {
                Error::UnsupportedAlgorithm(format!("C14N: {}", self.canonicalization_method))
            })?;
            let set = NodeSet::tree(signed_info, mode.with_comments());
            let bytes = sigtuna_c14n::canonicalize_doc(&doc, mode, Some(&set))?;
            let alg = sigtuna_crypto::sign::from_uri(&self.signature_method)?;
            debug!(method = %self.signature_method, "signing SignedInfo");
            engine.encode(alg.sign(&key.to_signing_key(), &bytes)?)
        };
        xml = xml.replacen(
            "<ds:SignatureValue></ds:SignatureValue>",
            &format!("<ds:SignatureValue>{sig_b64}</ds:SignatureValue>"),
            1,
        );

        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{xml}"))
    }

    /// Create the signature and hand it to a packaging sink under
    /// `name`. The sink is finalized on success and aborted on any
    /// failure.
    pub fn create_into(
        &mut self,
        sink: &mut dyn PackagingSink,
        name: &str,
        key: &Key,
        resolver: Option<&UriResolver<'_>>,
    ) -> Result<(), Error> {
        let result = self.create(key, resolver).and_then(|xml| {
            sink.add(name, xml.as_bytes())?;
            sink.finalize()
        });
        if result.is_err() {
            sink.abort();
        }
        result
    }

    /// Verify a loaded signature document.
    pub fn verify(&self, resolver: Option<&UriResolver<'_>>) -> Result<VerifyReport, Error> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| Error::XmlStructure("no signature document loaded".into()))?;
        let doc = sigtuna_xml::parse(&loaded.xml)?;
        let sig_node = find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE.into()))?;
        let signed_info = find_child(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;

        let (signature_valid, certificate) = self.verify_signed_info(&doc, sig_node, signed_info)?;

        let mut references_valid = true;
        let mut reference_status = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let ok = file.check_digest(resolver);
            references_valid &= ok;
            reference_status.push((
                file.id.clone().unwrap_or_else(|| file.uri.clone()),
                ok,
            ));
        }

        let properties_valid = match &loaded.props {
            Some(props_ref) => match find_signed_properties(&doc, &props_ref.id) {
                Some(node) => {
                    let set = NodeSet::tree(node, true);
                    let data = TransformData::Xml {
                        xml_text: loaded.xml.clone(),
                        node_set: Some(set),
                    };
                    match hash::calculate_hash(data, &props_ref.chain, &props_ref.digest_method)
                    {
                        Ok(digest) => hash::digest_equal(&digest, &props_ref.expected_digest),
                        Err(e) => {
                            warn!(error = %e, "signed-properties digest check failed");
                            false
                        }
                    }
                }
                None => false,
            },
            None => false,
        };

        debug!(
            signature_valid,
            references_valid, properties_valid, "verification finished"
        );
        Ok(VerifyReport {
            signature_valid,
            references_valid,
            properties_valid,
            reference_status,
            certificate,
        })
    }

    /// Check the signature value against every candidate key from
    /// `KeyInfo`, in document order. A key that fails is skipped so a
    /// bad first candidate cannot mask a working one. On success the
    /// winning key's certificate is returned alongside the flag.
    fn verify_signed_info(
        &self,
        doc: &roxmltree::Document<'_>,
        sig_node: roxmltree::Node<'_, '_>,
        signed_info: roxmltree::Node<'_, '_>,
    ) -> Result<(bool, Option<Vec<u8>>), Error> {
        let mode = C14nMode::from_uri(&self.canonicalization_method).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("C14N: {}", self.canonicalization_method))
        })?;
        let set = NodeSet::tree(signed_info, mode.with_comments());
        let bytes = sigtuna_c14n::canonicalize_doc(doc, mode, Some(&set))?;

        let sig_value_text = find_child(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .and_then(|n| n.text())
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE_VALUE.into()))?;
        let clean: String = sig_value_text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let sig_value = base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

        let alg = sigtuna_crypto::sign::from_uri(&self.signature_method)?;
        let Some(key_info) = find_child(sig_node, ns::DSIG, ns::node::KEY_INFO) else {
            return Ok((false, None));
        };
        for (index, key) in keyinfo::candidate_keys(key_info).into_iter().enumerate() {
            match alg.verify(&key.to_signing_key(), &bytes, &sig_value) {
                Ok(true) => {
                    debug!(index, "signature verified with candidate key");
                    return Ok((true, key.certificate_der().map(<[u8]>::to_vec)));
                }
                Ok(false) => {}
                Err(e) => warn!(index, error = %e, "candidate key failed"),
            }
        }
        Ok((false, None))
    }
}

impl Default for XadesSignature {
    fn default() -> Self {
        Self::new()
    }
}

fn find_signed_properties<'a>(
    doc: &'a roxmltree::Document<'a>,
    id: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == ns::node::SIGNED_PROPERTIES
            && n.tag_name().namespace() == Some(ns::XADES)
            && n.attribute(ns::attr::ID) == Some(id)
    })
}

fn parse_properties_reference(
    reference: roxmltree::Node<'_, '_>,
    id: &str,
) -> Result<PropertiesReference, Error> {
    let chain = match find_child(reference, ns::DSIG, ns::node::TRANSFORMS) {
        Some(t) => TransformChain::from_transforms_node(t)?,
        None => TransformChain::default(),
    };
    let digest_method = find_child(reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement(ns::node::DIGEST_METHOD.into()))?
        .to_owned();
    let digest_text = find_child(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .and_then(|n| n.text())
        .ok_or_else(|| Error::MissingElement(ns::node::DIGEST_VALUE.into()))?;
    let clean: String = digest_text.chars().filter(|c| !c.is_whitespace()).collect();
    let expected_digest = base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;
    Ok(PropertiesReference {
        id: id.to_owned(),
        chain,
        digest_method,
        expected_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_transforms::TransformChain;

    fn file_with_id(id: Option<&str>) -> FileReference {
        let mut file = FileReference::new("doc.xml", TransformChain::default());
        file.id = id.map(str::to_owned);
        file
    }

    #[test]
    fn id_assignment_is_deterministic() {
        let mut sig = XadesSignature::new();
        sig.files = vec![file_with_id(None), file_with_id(Some("x")), file_with_id(None)];
        sig.assign_file_ids();
        let ids: Vec<_> = sig.files.iter().map(|f| f.id.clone().unwrap()).collect();
        assert_eq!(ids, ["ref0", "x", "ref1"]);

        // Running again changes nothing.
        sig.assign_file_ids();
        let again: Vec<_> = sig.files.iter().map(|f| f.id.clone().unwrap()).collect();
        assert_eq!(again, ids);
    }

    #[test]
    fn id_assignment_skips_taken_ref_ids() {
        let mut sig = XadesSignature::new();
        sig.files = vec![file_with_id(Some("ref0")), file_with_id(None)];
        sig.assign_file_ids();
        assert_eq!(sig.files[1].id.as_deref(), Some("ref1"));
    }

    #[test]
    fn duplicate_ids_are_replaced() {
        let mut sig = XadesSignature::new();
        sig.files = vec![file_with_id(Some("a")), file_with_id(Some("a"))];
        sig.assign_file_ids();
        assert_eq!(sig.files[0].id.as_deref(), Some("a"));
        assert_eq!(sig.files[1].id.as_deref(), Some("ref0"));
    }

    #[test]
    fn verify_without_a_loaded_document_is_an_error() {
        let sig = XadesSignature::new();
        assert!(sig.verify(None).is_err());
    }
}
