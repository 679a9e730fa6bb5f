#![forbid(unsafe_code)]

//! Cryptographic primitives for the Sigtuna XAdES library: digest
//! algorithms and asymmetric signature algorithms, both selected by
//! their XML-DSig algorithm URI.

pub mod digest;
pub mod sign;

pub use sign::SigningKey;
