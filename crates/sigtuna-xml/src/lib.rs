#![forbid(unsafe_code)]

//! XML document abstraction for the Sigtuna XAdES library.
//!
//! Provides a DOM-like interface over `roxmltree`, plus the `NodeSet`
//! operations needed by canonicalization and the signature transforms,
//! and the XPath 1.0 subset used by the filter transform.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use nodeset::NodeSet;

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond the five predefined XML entities,
/// so it is safe.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse XML text with the library's default options.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, sigtuna_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| sigtuna_core::Error::XmlParse(e.to_string()))
}
