#![forbid(unsafe_code)]

//! Algorithm URI constants.
//!
//! Each constant is the canonical URI string that appears in `Algorithm`
//! attributes of a signature document.

// ── Canonicalization ─────────────────────────────────────────────────

pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";

// ── Digest algorithms ────────────────────────────────────────────────

pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

// ── Signature algorithms ─────────────────────────────────────────────

pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
pub const DSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#dsa-sha1";
pub const DSA_SHA256: &str = "http://www.w3.org/2009/xmldsig11#dsa-sha256";
pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

// ── Transform algorithms ─────────────────────────────────────────────

pub const XPATH: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";
pub const XPATH_FILTER2: &str = "http://www.w3.org/2002/06/xmldsig-filter2";

// ── XAdES constants ──────────────────────────────────────────────────

/// The `Type` attribute emitted on the signed-properties reference.
///
/// The XAdES specification this structure follows prescribes
/// `http://uri.etsi.org/01903/v1.1.1#SignedProperties`, but the receiving
/// party only accepts the versionless value. Keep this constant as-is;
/// aligning it to the specification text breaks verification at the
/// deployed counterpart.
pub const XADES_REFERENCE_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Fixed `Id` of the `SignedProperties` element.
pub const XADES_SIGNED_PROPERTIES_ID: &str = "signed-properties";

/// Fixed `Id` of the `Signature` root element.
pub const XADES_SIGNATURE_ROOT_ID: &str = "signature-root";
