#![forbid(unsafe_code)]

//! KeyInfo XML processing — reads `<ds:KeyInfo>` to extract candidate
//! verification keys.

use crate::key::{Key, KeyData, KeyUsage};
use base64::Engine;
use sigtuna_core::{ns, Error};

fn decode_b64(text: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(e.to_string()))
}

/// Collect all candidate verification keys from a `<KeyInfo>` element,
/// in document order.
///
/// Each `<X509Certificate>` yields one key (its public key, with the
/// certificate attached); a `<KeyValue>` yields one bare key. Entries
/// that fail to parse are skipped so one bad certificate cannot mask a
/// usable key that follows it.
pub fn candidate_keys(key_info_node: roxmltree::Node<'_, '_>) -> Vec<Key> {
    let mut keys = Vec::new();
    for child in key_info_node.children() {
        if !child.is_element() {
            continue;
        }
        let ns_uri = child.tag_name().namespace().unwrap_or("");
        let local = child.tag_name().name();
        if ns_uri != ns::DSIG && !ns_uri.is_empty() {
            continue;
        }
        match local {
            ns::node::KEY_VALUE => {
                if let Ok(key) = parse_rsa_key_value(child) {
                    keys.push(key);
                } else if let Ok(key) = parse_dsa_key_value(child) {
                    keys.push(key);
                }
            }
            ns::node::X509_DATA => {
                for cert_node in child.children() {
                    if cert_node.is_element()
                        && cert_node.tag_name().name() == ns::node::X509_CERTIFICATE
                    {
                        let text = cert_node.text().unwrap_or("");
                        if let Ok(der) = decode_b64(text) {
                            if let Ok(key) = crate::x509::public_key_from_certificate(&der) {
                                keys.push(key);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    keys
}

fn child_text<'a>(
    parent: roxmltree::Node<'a, 'a>,
    name: &str,
) -> Result<&'a str, Error> {
    parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .ok_or_else(|| Error::MissingElement(name.into()))
}

/// Extract an RSA public key from a `<KeyValue><RSAKeyValue>` element.
pub fn parse_rsa_key_value(key_value_node: roxmltree::Node<'_, '_>) -> Result<Key, Error> {
    let rsa_kv = key_value_node
        .children()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::RSA_KEY_VALUE
                && n.tag_name().namespace().unwrap_or("") == ns::DSIG
        })
        .ok_or_else(|| Error::MissingElement("RSAKeyValue".into()))?;

    let modulus = decode_b64(child_text(rsa_kv, ns::node::RSA_MODULUS)?)?;
    let exponent = decode_b64(child_text(rsa_kv, ns::node::RSA_EXPONENT)?)?;

    let n = rsa::BigUint::from_bytes_be(&modulus);
    let e = rsa::BigUint::from_bytes_be(&exponent);
    let public = rsa::RsaPublicKey::new(n, e)
        .map_err(|err| Error::Key(format!("invalid RSA public key: {err}")))?;

    Ok(Key::new(
        KeyData::Rsa {
            private: None,
            public,
        },
        KeyUsage::Verify,
    ))
}

/// Extract a DSA public key from a `<KeyValue><DSAKeyValue>` element.
///
/// DSAKeyValue carries P, Q, G (domain parameters) and Y (public key).
pub fn parse_dsa_key_value(key_value_node: roxmltree::Node<'_, '_>) -> Result<Key, Error> {
    let dsa_kv = key_value_node
        .children()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::DSA_KEY_VALUE
                && n.tag_name().namespace().unwrap_or("") == ns::DSIG
        })
        .ok_or_else(|| Error::MissingElement("DSAKeyValue".into()))?;

    let p = dsa::BigUint::from_bytes_be(&decode_b64(child_text(dsa_kv, ns::node::DSA_P)?)?);
    let q = dsa::BigUint::from_bytes_be(&decode_b64(child_text(dsa_kv, ns::node::DSA_Q)?)?);
    let g = dsa::BigUint::from_bytes_be(&decode_b64(child_text(dsa_kv, ns::node::DSA_G)?)?);
    let y = dsa::BigUint::from_bytes_be(&decode_b64(child_text(dsa_kv, ns::node::DSA_Y)?)?);

    let components = dsa::Components::from_components(p, q, g)
        .map_err(|e| Error::Key(format!("invalid DSA components: {e}")))?;
    let public = dsa::VerifyingKey::from_components(components, y)
        .map_err(|e| Error::Key(format!("invalid DSA public key: {e}")))?;

    Ok(Key::new(
        KeyData::Dsa {
            private: None,
            public,
        },
        KeyUsage::Verify,
    ))
}
