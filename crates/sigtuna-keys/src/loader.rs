#![forbid(unsafe_code)]

//! Loading of signing keys and certificates from PEM and DER files.

use crate::key::{Key, KeyData, KeyUsage};
use pkcs8::DecodePrivateKey;
use sigtuna_core::Error;
use std::path::Path;

/// Load a private key from PKCS#8 PEM text (RSA, EC P-256 or DSA).
pub fn load_private_key_pem(pem: &str) -> Result<Key, Error> {
    if let Ok(sk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
        let public = sk.to_public_key();
        return Ok(Key::new(
            KeyData::Rsa {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    if let Ok(sk) = dsa::SigningKey::from_pkcs8_pem(pem) {
        let public = sk.verifying_key().clone();
        return Ok(Key::new(
            KeyData::Dsa {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    Err(Error::Key(
        "unable to parse PKCS#8 PEM private key (tried RSA, P-256, DSA)".into(),
    ))
}

/// Load a private key from PKCS#8 DER bytes (RSA, EC P-256 or DSA).
pub fn load_private_key_der(der: &[u8]) -> Result<Key, Error> {
    if let Ok(sk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        let public = sk.to_public_key();
        return Ok(Key::new(
            KeyData::Rsa {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    if let Ok(sk) = dsa::SigningKey::from_pkcs8_der(der) {
        let public = sk.verifying_key().clone();
        return Ok(Key::new(
            KeyData::Dsa {
                private: Some(sk),
                public,
            },
            KeyUsage::Sign,
        ));
    }
    Err(Error::Key(
        "unable to parse PKCS#8 DER private key (tried RSA, P-256, DSA)".into(),
    ))
}

/// Load a certificate from a PEM or DER file and return its DER bytes.
pub fn load_certificate_file(path: &Path) -> Result<Vec<u8>, Error> {
    let bytes = std::fs::read(path)?;
    if bytes.starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;
        let (label, der) = pkcs8::der::pem::decode_vec(text.as_bytes())
            .map_err(|e| Error::Certificate(format!("invalid PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected a CERTIFICATE PEM block, found {label}"
            )));
        }
        crate::x509::parse_certificate(&der)?;
        Ok(der)
    } else {
        crate::x509::parse_certificate(&bytes)?;
        Ok(bytes)
    }
}

/// Load a private key file (PEM or DER) and attach the certificate from
/// a second file. The result is ready for signing.
pub fn load_signing_identity(key_path: &Path, cert_path: &Path) -> Result<Key, Error> {
    let key_bytes = std::fs::read(key_path)?;
    let key = if key_bytes.starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(&key_bytes)
            .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
        load_private_key_pem(text)?
    } else {
        load_private_key_der(&key_bytes)?
    };
    let cert_der = load_certificate_file(cert_path)?;
    Ok(key.with_certificate(cert_der))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::EncodePrivateKey;

    #[test]
    fn rsa_pkcs8_roundtrip() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = sk.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        let key = load_private_key_pem(&pem).unwrap();
        assert!(key.can_sign());
        let der = sk.to_pkcs8_der().unwrap();
        let key = load_private_key_der(der.as_bytes()).unwrap();
        assert!(key.can_sign());
    }

    #[test]
    fn p256_pkcs8_roundtrip() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let pem = sk.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        let key = load_private_key_pem(&pem).unwrap();
        assert!(matches!(key.data, KeyData::EcP256 { .. }));
    }

    #[test]
    fn garbage_key_is_rejected() {
        assert!(load_private_key_pem("not a key").is_err());
        assert!(load_private_key_der(b"\x00\x01\x02").is_err());
    }
}
