#![forbid(unsafe_code)]

//! Namespace-attribute fixup for pruned node-sets.
//!
//! Document-subset canonicalization re-propagates inherited `xml:*`
//! attributes (`xml:lang`, `xml:base`, ...) from excluded ancestors to
//! every retained descendant, instead of only to the top-most retained
//! element at each exclusion boundary. This walk corrects that: it
//! materializes the inherited attributes once, on the first retained
//! element below an exclusion, and disables the canonicalizer's own
//! inheritance pass for the set.

use sigtuna_xml::nodeset::{node_index, NodeSet};
use sigtuna_core::ns;
use std::collections::BTreeMap;

/// Apply the fixup to `set` over its document.
pub fn apply(doc: &roxmltree::Document<'_>, set: &mut NodeSet) {
    walk(doc.root(), set, &BTreeMap::new());
    set.mark_fixup_applied();
}

fn walk(
    node: roxmltree::Node<'_, '_>,
    set: &mut NodeSet,
    accumulated: &BTreeMap<String, String>,
) {
    if !node.is_element() {
        for child in node.children() {
            walk(child, set, accumulated);
        }
        return;
    }

    if set.contains(node) {
        // Retained: this element takes over the accumulated attributes
        // as its own; nothing propagates further down from above it.
        set.set_xml_attr_extras(node_index(node), accumulated.clone());
        let empty = BTreeMap::new();
        for child in node.children() {
            walk(child, set, &empty);
        }
    } else {
        // Excluded: fold the element's own xml:* attributes into the
        // accumulator, nearest element winning, and keep walking.
        let own: Vec<_> = node
            .attributes()
            .filter(|a| a.namespace() == Some(ns::XML))
            .collect();
        if own.is_empty() {
            for child in node.children() {
                walk(child, set, accumulated);
            }
        } else {
            let mut merged = accumulated.clone();
            for attr in own {
                merged.insert(attr.name().to_owned(), attr.value().to_owned());
            }
            for child in node.children() {
                walk(child, set, &merged);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexes_of<'a>(
        doc: &'a roxmltree::Document<'a>,
        names: &[&str],
    ) -> Vec<roxmltree::Node<'a, 'a>> {
        names
            .iter()
            .map(|name| {
                doc.descendants()
                    .find(|n| n.is_element() && n.tag_name().name() == *name)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn retained_boundary_element_absorbs_inherited_attrs() {
        let xml = r#"<r xml:lang="en"><mid><leaf/></mid></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let nodes = indexes_of(&doc, &["mid", "leaf"]);
        let mut set = NodeSet::new();
        for n in &nodes {
            set.insert(*n);
        }
        apply(&doc, &mut set);
        assert!(set.fixup_applied());
        let extras = set.xml_attr_extras(node_index(nodes[0])).unwrap();
        assert_eq!(extras.get("lang").map(String::as_str), Some("en"));
        // The leaf sits below a retained element and inherits nothing.
        assert!(set.xml_attr_extras(node_index(nodes[1])).is_none());
    }

    #[test]
    fn nearest_excluded_ancestor_wins() {
        let xml = r#"<r xml:lang="en"><mid xml:lang="de"><leaf/></mid></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let leaf = indexes_of(&doc, &["leaf"])[0];
        let mut set = NodeSet::new();
        set.insert(leaf);
        apply(&doc, &mut set);
        let extras = set.xml_attr_extras(node_index(leaf)).unwrap();
        assert_eq!(extras.get("lang").map(String::as_str), Some("de"));
    }

    #[test]
    fn no_extras_without_xml_attrs() {
        let xml = "<r><mid><leaf/></mid></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let leaf = indexes_of(&doc, &["leaf"])[0];
        let mut set = NodeSet::new();
        set.insert(leaf);
        apply(&doc, &mut set);
        assert!(set.xml_attr_extras(node_index(leaf)).is_none());
        assert!(set.fixup_applied());
    }
}
