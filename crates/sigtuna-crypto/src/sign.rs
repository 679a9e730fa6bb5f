#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, DSA, ECDSA).
//!
//! DSA and ECDSA signature values use the XML-DSig wire format: the
//! raw `r || s` concatenation with both halves padded to equal length,
//! not the ASN.1 DER encoding.

use dsa::BigUint;
use sigtuna_core::{algorithm, Error};

/// Key material for signature operations.
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Dsa(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    match uri {
        algorithm::RSA_SHA1 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA1,
            hash: HashType::Sha1,
        })),
        algorithm::RSA_SHA256 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA256,
            hash: HashType::Sha256,
        })),
        algorithm::RSA_SHA384 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA384,
            hash: HashType::Sha384,
        })),
        algorithm::RSA_SHA512 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA512,
            hash: HashType::Sha512,
        })),
        algorithm::DSA_SHA1 => Ok(Box::new(DsaSign {
            uri: algorithm::DSA_SHA1,
            hash: HashType::Sha1,
        })),
        algorithm::DSA_SHA256 => Ok(Box::new(DsaSign {
            uri: algorithm::DSA_SHA256,
            hash: HashType::Sha256,
        })),
        algorithm::ECDSA_SHA256 => Ok(Box::new(EcdsaP256 {
            uri: algorithm::ECDSA_SHA256,
        })),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm: {uri}"
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    fn sign_with_key(
        &self,
        private_key: &rsa::RsaPrivateKey,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use signature::{SignatureEncoding, Signer};
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                Ok(sk.sign(data).to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify_with_key(
        &self,
        public_key: &rsa::RsaPublicKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        use signature::Verifier;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            _ => Err(Error::Key("RSA private key required".into())),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        self.verify_with_key(&pubk, data, sig_bytes)
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

struct DsaSign {
    uri: &'static str,
    hash: HashType,
}

/// Convert XML-DSig `r || s` bytes to a typed DSA signature.
pub fn xmldsig_to_dsa(rs: &[u8]) -> Result<dsa::Signature, Error> {
    if rs.is_empty() || rs.len() % 2 != 0 {
        return Err(Error::Crypto(format!(
            "DSA signature must be an even number of bytes, got {}",
            rs.len()
        )));
    }
    let half = rs.len() / 2;
    let r = BigUint::from_bytes_be(&rs[..half]);
    let s = BigUint::from_bytes_be(&rs[half..]);
    dsa::Signature::from_components(r, s)
        .map_err(|e| Error::Crypto(format!("invalid DSA signature: {e}")))
}

/// Convert a typed DSA signature to XML-DSig `r || s`, with both halves
/// padded to the byte length of the subgroup order q.
pub fn dsa_to_xmldsig(sig: &dsa::Signature, q: &BigUint) -> Vec<u8> {
    let len = (q.bits() + 7) / 8;
    let mut out = int_to_fixed(sig.r(), len);
    out.extend_from_slice(&int_to_fixed(sig.s(), len));
    out
}

fn int_to_fixed(value: &BigUint, len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

impl SignatureAlgorithm for DsaSign {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use digest::Digest;
        use signature::DigestSigner;
        let SigningKey::Dsa(sk) = key else {
            return Err(Error::Key("DSA private key required".into()));
        };
        let sig: dsa::Signature = match self.hash {
            HashType::Sha1 => sk
                .try_sign_digest(sha1::Sha1::new_with_prefix(data))
                .map_err(|e| Error::Crypto(format!("DSA signing failed: {e}")))?,
            HashType::Sha256 => sk
                .try_sign_digest(sha2::Sha256::new_with_prefix(data))
                .map_err(|e| Error::Crypto(format!("DSA signing failed: {e}")))?,
            _ => return Err(Error::UnsupportedAlgorithm("DSA hash".into())),
        };
        let q = sk.verifying_key().components().q().clone();
        Ok(dsa_to_xmldsig(&sig, &q))
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use digest::Digest;
        use signature::DigestVerifier;
        let vk = match key {
            SigningKey::Dsa(sk) => sk.verifying_key().clone(),
            SigningKey::DsaPublic(vk) => vk.clone(),
            _ => return Err(Error::Key("DSA key required".into())),
        };
        let sig = xmldsig_to_dsa(sig_bytes)?;
        Ok(match self.hash {
            HashType::Sha1 => vk
                .verify_digest(sha1::Sha1::new_with_prefix(data), &sig)
                .is_ok(),
            HashType::Sha256 => vk
                .verify_digest(sha2::Sha256::new_with_prefix(data), &sig)
                .is_ok(),
            _ => return Err(Error::UnsupportedAlgorithm("DSA hash".into())),
        })
    }
}

// ── ECDSA P-256 ──────────────────────────────────────────────────────

struct EcdsaP256 {
    uri: &'static str,
}

/// Convert XML-DSig ECDSA `r || s` to a typed signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    let r = *p256::FieldBytes::from_slice(&rs[..32]);
    let s = *p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(r, s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert a P-256 signature to the XML-DSig `r || s` format.
pub fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

impl SignatureAlgorithm for EcdsaP256 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP256(sk) = key else {
            return Err(Error::Key("P-256 signing key required".into()));
        };
        let sig: p256::ecdsa::Signature = sk.sign(data);
        Ok(p256_to_xmldsig(&sig))
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let vk = match key {
            SigningKey::EcP256(sk) => *sk.verifying_key(),
            SigningKey::EcP256Public(vk) => *vk,
            _ => return Err(Error::Key("P-256 key required".into())),
        };
        let sig = xmldsig_to_p256(sig_bytes)?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_sign_verify_roundtrip() {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let key = SigningKey::Rsa(private_key);
        let algo = from_uri(algorithm::RSA_SHA256).unwrap();
        let sig = algo.sign(&key, b"signed bytes").unwrap();
        assert!(algo.verify(&key, b"signed bytes", &sig).unwrap());
        assert!(!algo.verify(&key, b"tampered bytes", &sig).unwrap());
    }

    #[test]
    fn ecdsa_wire_format_is_fixed_width() {
        use signature::Signer;
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let sig: p256::ecdsa::Signature = sk.sign(b"data");
        let rs = p256_to_xmldsig(&sig);
        assert_eq!(rs.len(), 64);
        let back = xmldsig_to_p256(&rs).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn unknown_signature_uri_is_rejected() {
        assert!(from_uri("urn:not-a-signature").is_err());
    }
}
