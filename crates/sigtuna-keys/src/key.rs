#![forbid(unsafe_code)]

//! Key types and data structures.

/// Usage flags for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Sign,
    Verify,
    Any,
}

/// The underlying key data.
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Dsa {
        private: Option<dsa::SigningKey>,
        public: dsa::VerifyingKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, private) = match self {
            Self::Rsa { private, .. } => ("RSA", private.is_some()),
            Self::Dsa { private, .. } => ("DSA", private.is_some()),
            Self::EcP256 { private, .. } => ("EC P-256", private.is_some()),
        };
        if private {
            write!(f, "{kind} private+public key")
        } else {
            write!(f, "{kind} public key")
        }
    }
}

/// A key with associated certificate material.
#[derive(Debug)]
pub struct Key {
    /// The key data.
    pub data: KeyData,
    /// The intended usage.
    pub usage: KeyUsage,
    /// X.509 certificates associated with this key (DER-encoded). The
    /// first entry, when present, is the certificate the key came from.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    /// Create a new key.
    pub fn new(data: KeyData, usage: KeyUsage) -> Self {
        Self {
            data,
            usage,
            x509_chain: Vec::new(),
        }
    }

    /// Attach a certificate to this key.
    pub fn with_certificate(mut self, der: Vec<u8>) -> Self {
        self.x509_chain.insert(0, der);
        self
    }

    /// The DER bytes of this key's certificate, if one is attached.
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.x509_chain.first().map(Vec::as_slice)
    }

    /// Convert to a `SigningKey` for use with the crypto algorithms.
    pub fn to_signing_key(&self) -> sigtuna_crypto::SigningKey {
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => sigtuna_crypto::SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => {
                sigtuna_crypto::SigningKey::RsaPublic(public.clone())
            }
            KeyData::Dsa {
                private: Some(sk), ..
            } => sigtuna_crypto::SigningKey::Dsa(sk.clone()),
            KeyData::Dsa { public, .. } => {
                sigtuna_crypto::SigningKey::DsaPublic(public.clone())
            }
            KeyData::EcP256 {
                private: Some(sk), ..
            } => sigtuna_crypto::SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => {
                sigtuna_crypto::SigningKey::EcP256Public(*public)
            }
        }
    }

    /// Whether this key can produce signatures.
    pub fn can_sign(&self) -> bool {
        matches!(
            &self.data,
            KeyData::Rsa { private: Some(_), .. }
                | KeyData::Dsa { private: Some(_), .. }
                | KeyData::EcP256 { private: Some(_), .. }
        )
    }
}
