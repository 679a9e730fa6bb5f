#![forbid(unsafe_code)]

//! Rendering of namespace declarations and attributes in canonical order.

use crate::escape;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for the default namespace).
    pub prefix: String,
    /// The namespace URI.
    pub uri: String,
}

impl NsDecl {
    /// Append ` xmlns...="uri"` to the output.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(b"xmlns");
        if !self.prefix.is_empty() {
            out.push(b':');
            out.extend_from_slice(self.prefix.as_bytes());
        }
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape::escape_attr(&self.uri).as_bytes());
        out.push(b'"');
    }
}

// The default namespace sorts before all prefixed declarations, then by
// prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let key = |d: &Self| (!d.prefix.is_empty(), d.prefix.clone());
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The attribute's namespace URI ("" for no namespace).
    pub ns_uri: String,
    /// The local name.
    pub local_name: String,
    /// The qualified name (prefix:local or just local).
    pub qualified_name: String,
    /// The attribute value.
    pub value: String,
}

impl Attr {
    /// Append ` qname="value"` to the output.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape::escape_attr(&self.value).as_bytes());
        out.push(b'"');
    }
}

// Attributes without a namespace sort first by local name, then
// namespaced attributes by (namespace URI, local name).
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let key = |a: &Self| (!a.ns_uri.is_empty(), a.ns_uri.clone(), a.local_name.clone());
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ns_decl_ordering() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "urn:b".into() },
            NsDecl { prefix: String::new(), uri: "urn:d".into() },
            NsDecl { prefix: "a".into(), uri: "urn:a".into() },
        ];
        decls.sort();
        let prefixes: Vec<&str> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, ["", "a", "b"]);
    }

    #[test]
    fn attr_ordering() {
        let mut attrs = vec![
            Attr {
                ns_uri: "urn:n".into(),
                local_name: "a".into(),
                qualified_name: "n:a".into(),
                value: String::new(),
            },
            Attr {
                ns_uri: String::new(),
                local_name: "z".into(),
                qualified_name: "z".into(),
                value: String::new(),
            },
        ];
        attrs.sort();
        assert_eq!(attrs[0].qualified_name, "z");
    }
}
