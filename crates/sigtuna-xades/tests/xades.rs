//! End-to-end signature creation and verification.

use sha2::{Digest, Sha256};
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_keys::Key;
use sigtuna_transforms::{FilterOp, FilterStep, Transform, TransformChain, TransformData};
use sigtuna_xades::{CommitmentType, FileReference, PackagingSink, PolicyInfo, XadesSignature};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

fn signing_key() -> Key {
    let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    sigtuna_keys::loader::load_signing_identity(&base.join("key.pem"), &base.join("cert.pem"))
        .unwrap()
}

fn test_store() -> HashMap<&'static str, Vec<u8>> {
    let mut store = HashMap::new();
    store.insert(
        "report.xml",
        b"<report><total>42</total></report>".to_vec(),
    );
    store.insert("notes and figures.txt", b"plain text notes\n".to_vec());
    store.insert("urn:policy:test", b"the policy document".to_vec());
    store
}

fn test_policy() -> PolicyInfo {
    let mut policy = PolicyInfo::new("urn:policy:test");
    policy.description = Some("Test signing policy".into());
    policy.allowed_digest_methods = vec![algorithm::SHA256.to_owned()];
    policy.commitment_types = vec![
        CommitmentType {
            id: "urn:commitment:approval".into(),
            description: Some("Document approval".into()),
        },
        CommitmentType {
            id: "urn:commitment:receipt".into(),
            description: None,
        },
    ];
    policy
}

fn build_signature() -> XadesSignature {
    let policy = test_policy();
    let mut sig = XadesSignature::new();
    sig.properties.apply_policy(&policy);

    let mut report = FileReference::new(
        "report.xml",
        TransformChain::new(vec![Transform::Canonicalize {
            with_comments: false,
        }]),
    );
    report.mime_type = Some("application/xml".into());
    report.commitment_type_id = Some(policy.commitment_types[0].id.clone());
    assert!(policy.allowed_digest_methods.contains(&report.digest_method));

    let mut notes = FileReference::new("notes and figures.txt", TransformChain::default());
    notes.commitment_type_id = Some(policy.commitment_types[1].id.clone());

    sig.files = vec![report, notes];
    sig
}

#[test]
fn sign_verify_round_trip() {
    let store = test_store();
    let resolver = |uri: &str| store.get(uri).cloned();

    let mut sig = build_signature();
    let xml = sig.create(&signing_key(), Some(&resolver)).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

    let parsed = XadesSignature::from_xml(&xml).unwrap();
    let report = parsed.verify(Some(&resolver)).unwrap();
    assert!(report.signature_valid);
    assert!(report.references_valid);
    assert!(report.properties_valid);
    assert!(report.is_valid());
    assert_eq!(
        report.certificate.as_deref(),
        signing_key().certificate_der()
    );
    assert_eq!(
        report.reference_status,
        vec![("ref0".to_owned(), true), ("ref1".to_owned(), true)]
    );

    // The data-object properties survive the round trip.
    assert_eq!(parsed.files.len(), 2);
    assert_eq!(parsed.files[0].uri, "report.xml");
    assert_eq!(parsed.files[0].mime_type.as_deref(), Some("application/xml"));
    assert_eq!(
        parsed.files[0].commitment_type_id.as_deref(),
        Some("urn:commitment:approval")
    );
    assert_eq!(parsed.files[1].uri, "notes and figures.txt");
    assert!(parsed.properties.signing_time.is_some());
    assert_eq!(
        parsed.properties.policy_id.as_deref(),
        Some("urn:policy:test")
    );
    assert!(parsed.properties.check_digest(Some(&resolver)));
}

#[test]
fn tampered_file_flips_exactly_its_reference_flag() {
    let mut store = test_store();
    let sig_xml = {
        let resolver = |uri: &str| store.get(uri).cloned();
        build_signature()
            .create(&signing_key(), Some(&resolver))
            .unwrap()
    };

    store.insert("report.xml", b"<report><total>43</total></report>".to_vec());
    let resolver = |uri: &str| store.get(uri).cloned();
    let report = XadesSignature::from_xml(&sig_xml)
        .unwrap()
        .verify(Some(&resolver))
        .unwrap();

    assert!(report.signature_valid);
    assert!(report.properties_valid);
    assert!(!report.references_valid);
    assert_eq!(
        report.reference_status,
        vec![("ref0".to_owned(), false), ("ref1".to_owned(), true)]
    );
    assert!(!report.is_valid());
}

#[test]
fn tampered_signed_properties_flip_only_the_properties_flag() {
    let store = test_store();
    let resolver = |uri: &str| store.get(uri).cloned();
    let xml = build_signature()
        .create(&signing_key(), Some(&resolver))
        .unwrap();

    // The issuer name lives inside SignedProperties but not SignedInfo.
    let tampered = xml.replace("Sigtuna Test Signer", "Sigtuna Test Forger");
    assert_ne!(tampered, xml);

    let report = XadesSignature::from_xml(&tampered)
        .unwrap()
        .verify(Some(&resolver))
        .unwrap();
    assert!(report.signature_valid);
    assert!(report.references_valid);
    assert!(!report.properties_valid);
    assert!(!report.is_valid());
}

#[test]
fn tampered_signature_value_flips_only_the_signature_flag() {
    let store = test_store();
    let resolver = |uri: &str| store.get(uri).cloned();
    let xml = build_signature()
        .create(&signing_key(), Some(&resolver))
        .unwrap();

    let start = xml.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
    let original = &xml[start..start + 1];
    let flipped = if original == "A" { "B" } else { "A" };
    let mut tampered = xml.clone();
    tampered.replace_range(start..start + 1, flipped);

    let report = XadesSignature::from_xml(&tampered)
        .unwrap()
        .verify(Some(&resolver))
        .unwrap();
    assert!(!report.signature_valid);
    assert!(report.certificate.is_none());
    assert!(report.references_valid);
    assert!(report.properties_valid);
}

#[test]
fn missing_signed_properties_fail_that_flag_but_others_proceed() {
    let store = test_store();
    let resolver = |uri: &str| store.get(uri).cloned();
    let xml = build_signature()
        .create(&signing_key(), Some(&resolver))
        .unwrap();

    // Detach the reference from the properties by renaming the Id the
    // URI points at.
    let tampered = xml.replace(
        "<xades:SignedProperties Id=\"signed-properties\">",
        "<xades:SignedProperties Id=\"detached-properties\">",
    );
    let parsed = XadesSignature::from_xml(&tampered).unwrap();
    let report = parsed.verify(Some(&resolver)).unwrap();
    assert!(!report.properties_valid);
    // File digests are still checked; the dangling reference parses as
    // a file reference and fails to resolve.
    assert!(!report.references_valid);
}

#[test]
fn policy_digest_is_fetched_exactly_once_and_lazily() {
    let store = test_store();
    let policy_fetches = Cell::new(0u32);
    let resolver = |uri: &str| {
        if uri == "urn:policy:test" {
            policy_fetches.set(policy_fetches.get() + 1);
        }
        store.get(uri).cloned()
    };

    let mut sig = build_signature();
    let xml = sig.create(&signing_key(), Some(&resolver)).unwrap();
    assert_eq!(policy_fetches.get(), 1);

    let parsed = XadesSignature::from_xml(&xml).unwrap();
    let expected = Sha256::digest(b"the policy document");
    assert_eq!(
        parsed.properties.policy_digest.as_deref(),
        Some(expected.as_slice())
    );

    // A digest set up front suppresses the fetch entirely.
    let mut presigned = build_signature();
    presigned.properties.policy_digest = Some(expected.to_vec());
    presigned.create(&signing_key(), Some(&resolver)).unwrap();
    assert_eq!(policy_fetches.get(), 1);
}

#[test]
fn filter_algebra_vectors() {
    let doc = b"<A><B><C/></B></A>".to_vec();

    let intersect_b = TransformChain::new(vec![Transform::Filter(vec![FilterStep::new(
        "/A/B",
        FilterOp::Intersect,
        HashMap::new(),
    )])]);
    let out = intersect_b
        .apply(TransformData::Binary(doc.clone()))
        .unwrap()
        .to_binary()
        .unwrap();
    assert_eq!(out, b"<B><C></C></B>");

    let subtract_c = TransformChain::new(vec![Transform::Filter(vec![FilterStep::new(
        "/A/B/C",
        FilterOp::Subtract,
        HashMap::new(),
    )])]);
    let out = subtract_c
        .apply(TransformData::Binary(doc))
        .unwrap()
        .to_binary()
        .unwrap();
    assert_eq!(out, b"<A><B></B></A>");
}

#[test]
fn transform_chain_survives_a_serialization_round_trip() {
    use sigtuna_xades::hash::calculate_hash;
    use sigtuna_xml::writer::XmlWriter;

    let mut namespaces = HashMap::new();
    namespaces.insert("r".to_owned(), "urn:report".to_owned());
    let chain = TransformChain::new(vec![
        Transform::Filter(vec![FilterStep::new(
            "//r:section",
            FilterOp::Intersect,
            namespaces,
        )]),
        Transform::Canonicalize {
            with_comments: false,
        },
    ]);

    let mut w = XmlWriter::new();
    w.start_element("root", &[("xmlns:ds", ns::DSIG)]);
    chain.write_into(&mut w);
    w.end_element();
    let serialized = w.into_string();

    let doc = roxmltree::Document::parse(&serialized).unwrap();
    let transforms = doc
        .descendants()
        .find(|n| n.has_tag_name((ns::DSIG, ns::node::TRANSFORMS)))
        .unwrap();
    let reparsed = TransformChain::from_transforms_node(transforms).unwrap();

    let input = b"<d xmlns:r=\"urn:report\"><r:section>body</r:section><other/></d>";
    let a = calculate_hash(
        TransformData::Binary(input.to_vec()),
        &chain,
        algorithm::SHA256,
    )
    .unwrap();
    let b = calculate_hash(
        TransformData::Binary(input.to_vec()),
        &reparsed,
        algorithm::SHA256,
    )
    .unwrap();
    assert_eq!(a, b);
}

#[derive(Default)]
struct MemorySink {
    entries: Vec<(String, Vec<u8>)>,
    finalized: bool,
    aborted: bool,
}

impl PackagingSink for MemorySink {
    fn add(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        self.entries.push((name.to_owned(), data.to_vec()));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Error> {
        self.finalized = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.entries.clear();
    }
}

#[test]
fn create_into_finalizes_the_sink() {
    let store = test_store();
    let resolver = |uri: &str| store.get(uri).cloned();
    let mut sink = MemorySink::default();
    build_signature()
        .create_into(&mut sink, "signature.xml", &signing_key(), Some(&resolver))
        .unwrap();
    assert!(sink.finalized);
    assert!(!sink.aborted);
    assert_eq!(sink.entries.len(), 1);
    assert_eq!(sink.entries[0].0, "signature.xml");
    XadesSignature::from_xml(std::str::from_utf8(&sink.entries[0].1).unwrap()).unwrap();
}

#[test]
fn create_into_aborts_on_failure() {
    // No resolver and no such files on disk: creation fails before
    // anything reaches the sink.
    let mut sink = MemorySink::default();
    let err = build_signature()
        .create_into(&mut sink, "signature.xml", &signing_key(), None)
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvableReference(_)));
    assert!(sink.aborted);
    assert!(sink.entries.is_empty());
}
