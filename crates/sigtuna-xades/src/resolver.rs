#![forbid(unsafe_code)]

//! Reference URI resolution.
//!
//! The caller supplies a resolver closure mapping a URI to the
//! referenced bytes; a `None` return means "not mine" and falls back to
//! the local filesystem (a plain path or a `file:` URI). The library
//! never fetches over the network; callers that need remote resources
//! supply a resolver that does.

use sigtuna_core::Error;

/// Maps a reference URI to the referenced bytes. Returning `None`
/// delegates to the filesystem fallback.
pub type UriResolver<'a> = dyn Fn(&str) -> Option<Vec<u8>> + 'a;

/// Fetch the bytes a URI refers to.
pub fn fetch(uri: &str, resolver: Option<&UriResolver<'_>>) -> Result<Vec<u8>, Error> {
    if let Some(resolve) = resolver {
        if let Some(bytes) = resolve(uri) {
            return Ok(bytes);
        }
    }
    let path = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:"))
        .unwrap_or(uri);
    std::fs::read(path).map_err(|e| Error::UnresolvableReference(format!("{uri}: {e}")))
}
