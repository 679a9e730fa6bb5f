#![forbid(unsafe_code)]

//! Key material handling for the Sigtuna XAdES library.
//!
//! Covers signing key and certificate loading, extraction of candidate
//! verification keys from `<ds:KeyInfo>`, and the X.509 certificate
//! helpers XAdES needs (certificate digest, issuer name, serial number).

pub mod key;
pub mod keyinfo;
pub mod loader;
pub mod x509;

pub use key::{Key, KeyData, KeyUsage};
