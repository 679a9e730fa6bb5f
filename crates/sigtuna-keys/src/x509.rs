#![forbid(unsafe_code)]

//! X.509 certificate helpers.
//!
//! XAdES binds a signature to its signing certificate through three
//! values: a digest of the raw certificate bytes, the issuer's
//! distinguished name, and the serial number as a decimal string.

use crate::key::{Key, KeyData, KeyUsage};
use der::{Decode, Encode};
use sigtuna_core::Error;
use x509_cert::Certificate;

/// Parse a DER-encoded certificate.
pub fn parse_certificate(der: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))
}

/// The issuer distinguished name in RFC 4514 string form.
pub fn issuer_name(cert: &Certificate) -> String {
    cert.tbs_certificate.issuer.to_string()
}

/// The certificate serial number as an unsigned decimal string.
pub fn serial_decimal(cert: &Certificate) -> String {
    format_serial_decimal(cert.tbs_certificate.serial_number.as_bytes())
}

/// Convert a big-endian ASN.1 INTEGER to an unsigned decimal string.
///
/// Serial numbers may carry a leading 0x00 sign byte; they are always
/// positive, so the bytes are treated as an unsigned integer.
pub fn format_serial_decimal(bytes: &[u8]) -> String {
    // Little-endian decimal digit accumulator.
    let mut digits = vec![0u8];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let val = (*d as u32) * 256 + carry;
            *d = (val % 10) as u8;
            carry = val / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits.iter().rev().map(|d| (b'0' + d) as char).collect()
}

/// Extract the public key from a certificate as a verification `Key`,
/// with the certificate attached.
pub fn public_key_from_certificate(der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    let cert = parse_certificate(der)?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("invalid SubjectPublicKeyInfo: {e}")))?;

    let data = if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(&spki_der) {
        KeyData::Rsa {
            private: None,
            public: pk,
        }
    } else if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der) {
        KeyData::EcP256 {
            private: None,
            public: vk,
        }
    } else if let Ok(vk) = dsa_from_spki_der(&spki_der) {
        KeyData::Dsa {
            private: None,
            public: vk,
        }
    } else {
        return Err(Error::Certificate(
            "unsupported public key type in certificate".into(),
        ));
    };

    Ok(Key::new(data, KeyUsage::Verify).with_certificate(der.to_vec()))
}

fn dsa_from_spki_der(spki_der: &[u8]) -> Result<dsa::VerifyingKey, Error> {
    let spki_ref = spki::SubjectPublicKeyInfoRef::from_der(spki_der)
        .map_err(|e| Error::Certificate(format!("invalid SPKI: {e}")))?;
    dsa::VerifyingKey::try_from(spki_ref)
        .map_err(|e| Error::Certificate(format!("not a DSA public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_formatting() {
        assert_eq!(format_serial_decimal(&[]), "0");
        assert_eq!(format_serial_decimal(&[0x00]), "0");
        assert_eq!(format_serial_decimal(&[0x2a]), "42");
        assert_eq!(format_serial_decimal(&[0x01, 0x00]), "256");
        // Leading sign byte is insignificant.
        assert_eq!(format_serial_decimal(&[0x00, 0xff]), "255");
        assert_eq!(
            format_serial_decimal(&[0x0f, 0xff, 0xff, 0xff, 0xff]),
            "68719476735"
        );
    }
}
