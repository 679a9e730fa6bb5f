#![forbid(unsafe_code)]

//! The XPath 1.0 select transform
//! (`http://www.w3.org/TR/1999/REC-xpath-19991116`).
//!
//! Evaluates the expression over the whole document and retains the
//! selected nodes together with their subtrees and attributes.

use sigtuna_core::Error;
use sigtuna_xml::nodeset::{node_index, NodeSet};
use sigtuna_xml::xpath::{self, PathItem};
use std::collections::HashMap;

/// Evaluate an XPath select transform, producing the retained node-set.
pub fn evaluate(
    doc: &roxmltree::Document<'_>,
    expr: &str,
    namespaces: &HashMap<String, String>,
) -> Result<NodeSet, Error> {
    let items = xpath::evaluate(doc, expr, namespaces)?;
    let mut set = NodeSet::new().with_explicit_attrs();
    for item in items {
        match item {
            PathItem::Node(n) => {
                for d in n.descendants() {
                    set.insert(d);
                    if d.is_element() {
                        let eid = node_index(d);
                        for attr in d.attributes() {
                            set.insert_attr(eid, attr.namespace().unwrap_or(""), attr.name());
                        }
                    }
                }
            }
            PathItem::Attribute { owner, ns, local } => {
                set.insert_attr(node_index(owner), &ns, &local);
            }
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_subtrees() {
        let doc = roxmltree::Document::parse(r#"<a><b x="1"><c/></b><d/></a>"#).unwrap();
        let set = evaluate(&doc, "/a/b", &HashMap::new()).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let c = doc.descendants().find(|n| n.has_tag_name("c")).unwrap();
        let d = doc.descendants().find(|n| n.has_tag_name("d")).unwrap();
        assert!(set.contains(b));
        assert!(set.contains(c));
        assert!(!set.contains(d));
        assert!(set.attr_visible(node_index(b), "", "x"));
    }

    #[test]
    fn no_match_is_empty() {
        let doc = roxmltree::Document::parse("<a/>").unwrap();
        let set = evaluate(&doc, "/nosuch", &HashMap::new()).unwrap();
        assert!(set.is_empty());
    }
}
