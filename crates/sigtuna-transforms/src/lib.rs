#![forbid(unsafe_code)]

//! Reference transforms for the Sigtuna XAdES library.
//!
//! A `TransformChain` is an ordered list of transforms applied to a
//! referenced resource before digesting: canonicalization, XPath
//! selection, and the XPath Filter 2.0 node-set algebra. The chain
//! parses from and serializes to its `<ds:Transforms>` representation.

pub mod filter2;
pub mod fixup;
pub mod pipeline;
pub mod xpath_select;

pub use filter2::{FilterOp, FilterStep};
pub use pipeline::{Transform, TransformChain, TransformData};
