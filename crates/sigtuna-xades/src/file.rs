#![forbid(unsafe_code)]

//! One signed file: its `<ds:Reference>` and the XAdES data-object
//! properties correlated with it.
//!
//! The URI is stored unescaped; serialization percent-escapes it and
//! parsing unescapes it, so `check_digest` always fetches the plain
//! form.

use crate::hash;
use crate::resolver::{self, UriResolver};
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_transforms::{TransformChain, TransformData};
use sigtuna_xml::document::{find_child, text_at};
use sigtuna_xml::writer::XmlWriter;
use tracing::warn;

/// Everything except the RFC 3986 unreserved characters is escaped.
const URI_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A file covered by the signature.
#[derive(Debug, Clone, Default)]
pub struct FileReference {
    /// Reference `Id`, assigned by the engine when unset.
    pub id: Option<String>,
    /// Unescaped reference URI.
    pub uri: String,
    /// Transforms applied before digesting.
    pub transform_chain: TransformChain,
    /// Digest method URI.
    pub digest_method: String,
    /// `DataObjectFormat` description; defaults to the URI on emit.
    pub description: Option<String>,
    /// `DataObjectFormat` object identifier.
    pub object_identifier: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    /// Identifier of the commitment the signer expresses for this file.
    pub commitment_type_id: Option<String>,
    expected_digest: Option<Vec<u8>>,
}

impl FileReference {
    /// New reference for the given URI, hashing with SHA-256.
    pub fn new(uri: impl Into<String>, transform_chain: TransformChain) -> Self {
        Self {
            uri: uri.into(),
            transform_chain,
            digest_method: algorithm::SHA256.to_owned(),
            ..Self::default()
        }
    }

    /// Parse an existing `<ds:Reference>` element.
    pub fn from_reference_node(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let raw_uri = node
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on Reference".into()))?;
        let uri = percent_decode_str(raw_uri)
            .decode_utf8()
            .map_err(|e| Error::InvalidUri(format!("{raw_uri}: {e}")))?
            .into_owned();

        let transform_chain = match find_child(node, ns::DSIG, ns::node::TRANSFORMS) {
            Some(t) => TransformChain::from_transforms_node(t)?,
            None => TransformChain::default(),
        };

        let digest_method = find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?
            .to_owned();

        let digest_text = find_child(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .and_then(|n| n.text())
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        let clean: String = digest_text.chars().filter(|c| !c.is_whitespace()).collect();
        let expected_digest = base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            uri,
            transform_chain,
            digest_method,
            expected_digest: Some(expected_digest),
            ..Self::default()
        })
    }

    /// The digest value stored in the parsed reference, if any.
    pub fn expected_digest(&self) -> Option<&[u8]> {
        self.expected_digest.as_deref()
    }

    fn require_id(&self) -> Result<&str, Error> {
        self.id
            .as_deref()
            .ok_or_else(|| Error::XmlStructure("file reference without an Id".into()))
    }

    /// Serialize the `<ds:Reference>`, fetching the file and computing
    /// its digest.
    pub fn write_reference(
        &self,
        w: &mut XmlWriter,
        resolver: Option<&UriResolver<'_>>,
    ) -> Result<(), Error> {
        let id = self.require_id()?;
        let bytes = resolver::fetch(&self.uri, resolver)?;
        let digest = hash::calculate_hash(
            TransformData::Binary(bytes),
            &self.transform_chain,
            &self.digest_method,
        )?;
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(&digest);
        let escaped = utf8_percent_encode(&self.uri, URI_ESCAPE).to_string();

        w.start_element(
            "ds:Reference",
            &[(ns::attr::ID, id), (ns::attr::URI, &escaped)],
        );
        self.transform_chain.write_into(w);
        w.empty_element(
            "ds:DigestMethod",
            &[(ns::attr::ALGORITHM, &self.digest_method)],
        );
        w.start_element("ds:DigestValue", &[]);
        w.write_text(&digest_b64);
        w.end_element();
        w.end_element();
        Ok(())
    }

    /// Serialize the `<xades:DataObjectFormat>` for this file.
    pub fn write_object_format(&self, w: &mut XmlWriter) -> Result<(), Error> {
        let id = self.require_id()?;
        w.start_element(
            "xades:DataObjectFormat",
            &[(ns::attr::OBJECT_REFERENCE, &format!("#{id}"))],
        );
        // A format must carry at least one of the descriptive fields;
        // fall back to the URI as description.
        if self.description.is_some()
            || (self.object_identifier.is_none() && self.mime_type.is_none())
        {
            w.start_element("xades:Description", &[]);
            w.write_text(self.description.as_deref().unwrap_or(&self.uri));
            w.end_element();
        }
        if let Some(identifier) = &self.object_identifier {
            w.start_element("xades:ObjectIdentifier", &[]);
            w.start_element("xades:Identifier", &[]);
            w.write_text(identifier);
            w.end_element();
            w.end_element();
        }
        if let Some(mime) = &self.mime_type {
            w.start_element("xades:MimeType", &[]);
            w.write_text(mime);
            w.end_element();
        }
        if let Some(encoding) = &self.encoding {
            w.start_element("xades:Encoding", &[]);
            w.write_text(encoding);
            w.end_element();
        }
        w.end_element();
        Ok(())
    }

    /// Serialize the `<xades:CommitmentTypeIndication>` for this file.
    pub fn write_commitment_type_indication(&self, w: &mut XmlWriter) -> Result<(), Error> {
        let id = self.require_id()?;
        w.start_element("xades:CommitmentTypeIndication", &[]);
        w.start_element("xades:CommitmentTypeId", &[]);
        w.start_element("xades:Identifier", &[]);
        if let Some(commitment) = &self.commitment_type_id {
            w.write_text(commitment);
        } else {
            w.write_text("");
        }
        w.end_element();
        w.end_element();
        w.start_element("xades:ObjectReference", &[]);
        w.write_text(&format!("#{id}"));
        w.end_element();
        w.end_element();
        Ok(())
    }

    /// Recover the descriptive properties from `<SignedProperties>`,
    /// correlated through `ObjectReference="#id"`. Absent blocks leave
    /// the fields unset.
    pub fn parse_properties(&mut self, signed_properties: roxmltree::Node<'_, '_>) {
        let Some(id) = self.id.as_deref() else {
            return;
        };
        let object_ref = format!("#{id}");
        let Some(data_props) = find_child(
            signed_properties,
            ns::XADES,
            ns::node::SIGNED_DATA_OBJECT_PROPERTIES,
        ) else {
            return;
        };

        let object_format = data_props.children().find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::DATA_OBJECT_FORMAT
                && n.attribute(ns::attr::OBJECT_REFERENCE) == Some(&object_ref)
        });
        if let Some(format) = object_format {
            self.description = text_at(format, &[(ns::XADES, ns::node::DESCRIPTION)]);
            self.object_identifier = text_at(
                format,
                &[
                    (ns::XADES, ns::node::OBJECT_IDENTIFIER),
                    (ns::XADES, ns::node::IDENTIFIER),
                ],
            );
            self.mime_type = text_at(format, &[(ns::XADES, ns::node::MIME_TYPE)]);
            self.encoding = text_at(format, &[(ns::XADES, ns::node::ENCODING)]);
        }

        let commitment = data_props.children().find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::COMMITMENT_TYPE_INDICATION
                && text_at(*n, &[(ns::XADES, ns::node::OBJECT_REFERENCE)]).as_deref()
                    == Some(&object_ref)
        });
        if let Some(commitment) = commitment {
            self.commitment_type_id = text_at(
                commitment,
                &[
                    (ns::XADES, ns::node::COMMITMENT_TYPE_ID),
                    (ns::XADES, ns::node::IDENTIFIER),
                ],
            );
        }
    }

    /// Fetch the file and compare its digest with the stored value.
    /// Every failure records `false`; one unreadable file must not
    /// abort the remaining references.
    pub fn check_digest(&self, resolver: Option<&UriResolver<'_>>) -> bool {
        let Some(expected) = self.expected_digest.as_deref() else {
            return false;
        };
        let computed = resolver::fetch(&self.uri, resolver).and_then(|bytes| {
            hash::calculate_hash(
                TransformData::Binary(bytes),
                &self.transform_chain,
                &self.digest_method,
            )
        });
        match computed {
            Ok(digest) => hash::digest_equal(&digest, expected),
            Err(e) => {
                warn!(uri = %self.uri, error = %e, "reference digest check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_reference(xml: &str) -> FileReference {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::DSIG, ns::node::REFERENCE)))
            .unwrap();
        FileReference::from_reference_node(node).unwrap()
    }

    #[test]
    fn parses_and_unescapes_a_reference() {
        let file = parse_reference(&format!(
            "<ds:Reference xmlns:ds=\"{dsig}\" Id=\"ref0\" URI=\"report%202024.xml\">\
             <ds:DigestMethod Algorithm=\"{sha}\"/>\
             <ds:DigestValue>aGFzaA==</ds:DigestValue>\
             </ds:Reference>",
            dsig = ns::DSIG,
            sha = algorithm::SHA256,
        ));
        assert_eq!(file.uri, "report 2024.xml");
        assert_eq!(file.id.as_deref(), Some("ref0"));
        assert_eq!(file.expected_digest(), Some(&b"hash"[..]));
        assert!(file.transform_chain.is_empty());
    }

    #[test]
    fn escapes_the_uri_on_emit() {
        let path = std::env::temp_dir().join("sigtuna file ref.xml");
        std::fs::write(&path, b"<doc/>").unwrap();
        let mut file = FileReference::new(path.to_str().unwrap(), TransformChain::default());
        file.id = Some("ref0".into());
        let mut w = XmlWriter::new();
        w.start_element("root", &[("xmlns:ds", ns::DSIG)]);
        file.write_reference(&mut w, None).unwrap();
        w.end_element();
        let xml = w.into_string();
        assert!(xml.contains("sigtuna%20file%20ref.xml"));
        assert!(!xml.contains("sigtuna file ref.xml"));
        std::fs::remove_file(&path).unwrap();

        // Round-trip restores the unescaped URI.
        let parsed = parse_reference(&xml);
        assert_eq!(parsed.uri, path.to_str().unwrap());
    }

    #[test]
    fn digest_check_fails_closed() {
        let mut file = FileReference::new("/no/such/file", TransformChain::default());
        file.expected_digest = Some(b"anything".to_vec());
        assert!(!file.check_digest(None));
        // No stored digest at all.
        let bare = FileReference::new("/no/such/file", TransformChain::default());
        assert!(!bare.check_digest(None));
    }

    #[test]
    fn digest_check_matches_the_resolved_bytes() {
        let mut file = FileReference::new("urn:report", TransformChain::default());
        file.expected_digest = Some(
            sigtuna_crypto::digest::digest(algorithm::SHA256, b"content").unwrap(),
        );
        let resolver = |uri: &str| (uri == "urn:report").then(|| b"content".to_vec());
        assert!(file.check_digest(Some(&resolver)));
        let tampered = |uri: &str| (uri == "urn:report").then(|| b"Content".to_vec());
        assert!(!file.check_digest(Some(&tampered)));
    }

    #[test]
    fn recovers_properties_by_object_reference() {
        let xml = format!(
            "<xades:SignedProperties xmlns:xades=\"{xades}\">\
             <xades:SignedDataObjectProperties>\
             <xades:DataObjectFormat ObjectReference=\"#other\">\
             <xades:MimeType>text/plain</xades:MimeType>\
             </xades:DataObjectFormat>\
             <xades:DataObjectFormat ObjectReference=\"#ref0\">\
             <xades:Description>Annual report</xades:Description>\
             <xades:ObjectIdentifier><xades:Identifier>urn:kind:report</xades:Identifier></xades:ObjectIdentifier>\
             <xades:MimeType>application/xml</xades:MimeType>\
             </xades:DataObjectFormat>\
             <xades:CommitmentTypeIndication>\
             <xades:CommitmentTypeId><xades:Identifier>urn:commit:approve</xades:Identifier></xades:CommitmentTypeId>\
             <xades:ObjectReference>#ref0</xades:ObjectReference>\
             </xades:CommitmentTypeIndication>\
             </xades:SignedDataObjectProperties>\
             </xades:SignedProperties>",
            xades = ns::XADES,
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let mut file = FileReference::new("report.xml", TransformChain::default());
        file.id = Some("ref0".into());
        file.parse_properties(doc.root_element());
        assert_eq!(file.description.as_deref(), Some("Annual report"));
        assert_eq!(file.object_identifier.as_deref(), Some("urn:kind:report"));
        assert_eq!(file.mime_type.as_deref(), Some("application/xml"));
        assert_eq!(file.commitment_type_id.as_deref(), Some("urn:commit:approve"));
        assert!(file.encoding.is_none());
    }
}
