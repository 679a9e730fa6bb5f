#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and signature transforms.
//!
//! A `NodeSet` is a set of nodes from one parsed document, identified by
//! `NodeId`. The filter transform selects attributes individually, so the
//! set optionally carries explicit attribute membership as well. After the
//! namespace-attribute fixup has run, the set also carries the literal
//! `xml:*` attributes to materialize on retained elements.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Index of a node within its document.
pub fn node_index(node: roxmltree::Node<'_, '_>) -> usize {
    node.id().get_usize()
}

/// A set of XML document nodes, with optional per-attribute membership.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    /// Indexes of the nodes in this set (elements, text, comments, PIs).
    nodes: HashSet<usize>,
    /// Explicit attribute membership: (element index, ns URI, local name).
    ///
    /// `None` means attributes follow their owner element (tree subsets).
    /// `Some` means only the listed attributes are rendered, even on
    /// visible elements (filter transform output).
    attrs: Option<HashSet<(usize, String, String)>>,
    /// Literal `xml:*` attributes to add per element, produced by the
    /// namespace-attribute fixup. Maps element index → local name → value.
    xml_attr_extras: HashMap<usize, BTreeMap<String, String>>,
    /// Set once the fixup has run. Canonicalization then renders only the
    /// materialized `xml:*` attributes and performs no inheritance walk of
    /// its own for this set.
    fixup_applied: bool,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node set for the subtree rooted at the given node.
    pub fn tree(root: roxmltree::Node<'_, '_>, with_comments: bool) -> Self {
        let mut nodes = HashSet::new();
        for n in root.descendants() {
            if with_comments || !n.is_comment() {
                nodes.insert(node_index(n));
            }
        }
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node_index(node))
    }

    /// Add a node to this set.
    pub fn insert(&mut self, node: roxmltree::Node<'_, '_>) {
        self.nodes.insert(node_index(node));
    }

    /// Number of nodes in the set (attributes not counted).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Switch to explicit attribute membership (empty attribute set).
    pub fn with_explicit_attrs(mut self) -> Self {
        self.attrs = Some(HashSet::new());
        self
    }

    /// Record an attribute as member of this set.
    pub fn insert_attr(&mut self, elem_idx: usize, ns_uri: &str, local: &str) {
        self.attrs
            .get_or_insert_with(HashSet::new)
            .insert((elem_idx, ns_uri.to_owned(), local.to_owned()));
    }

    /// Check whether an attribute of a visible element should be rendered.
    pub fn attr_visible(&self, elem_idx: usize, ns_uri: &str, local: &str) -> bool {
        match &self.attrs {
            None => true,
            Some(set) => set.contains(&(elem_idx, ns_uri.to_owned(), local.to_owned())),
        }
    }

    /// Record materialized `xml:*` attributes for an element (fixup output).
    pub fn set_xml_attr_extras(&mut self, elem_idx: usize, attrs: BTreeMap<String, String>) {
        if !attrs.is_empty() {
            self.xml_attr_extras.insert(elem_idx, attrs);
        }
    }

    /// Materialized `xml:*` attributes for an element, if any.
    pub fn xml_attr_extras(&self, elem_idx: usize) -> Option<&BTreeMap<String, String>> {
        self.xml_attr_extras.get(&elem_idx)
    }

    /// Mark the set as post-fixup.
    pub fn mark_fixup_applied(&mut self) {
        self.fixup_applied = true;
    }

    /// Whether the namespace-attribute fixup has run on this set.
    pub fn fixup_applied(&self) -> bool {
        self.fixup_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_excludes_comments_by_default() {
        let doc = roxmltree::Document::parse("<a><!--c--><b/></a>").unwrap();
        let root_elem = doc.root_element();
        let set = NodeSet::tree(root_elem, false);
        let comment = root_elem.children().find(|n| n.is_comment()).unwrap();
        let b = root_elem.children().find(|n| n.is_element()).unwrap();
        assert!(set.contains(root_elem));
        assert!(set.contains(b));
        assert!(!set.contains(comment));
    }

    #[test]
    fn explicit_attr_membership() {
        let doc = roxmltree::Document::parse(r#"<a x="1" y="2"/>"#).unwrap();
        let a = doc.root_element();
        let idx = node_index(a);
        let mut set = NodeSet::tree(a, false).with_explicit_attrs();
        set.insert_attr(idx, "", "x");
        assert!(set.attr_visible(idx, "", "x"));
        assert!(!set.attr_visible(idx, "", "y"));
    }
}
