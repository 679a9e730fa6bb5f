#![forbid(unsafe_code)]

//! XAdES signatures for the Sigtuna library.
//!
//! Builds on the lower layers (canonicalization, transforms, crypto,
//! keys) to create and verify XAdES-BES/EPES signature documents over
//! sets of files: qualifying properties, signature policy binding,
//! per-file reference digests and the three-part verification verdict.

pub mod file;
pub mod hash;
pub mod policy;
pub mod properties;
pub mod resolver;
pub mod signature;
pub mod sink;

pub use file::FileReference;
pub use policy::{CommitmentType, PolicyInfo};
pub use properties::SignatureProperties;
pub use resolver::UriResolver;
pub use signature::{VerifyReport, XadesSignature};
pub use sink::PackagingSink;
