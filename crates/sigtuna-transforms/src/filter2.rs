#![forbid(unsafe_code)]

//! XPath Filter 2.0 (`http://www.w3.org/2002/06/xmldsig-filter2`).
//!
//! A filter transform is an ordered list of (xpath, operator) steps.
//! Each step's expression is evaluated over the whole document; a node
//! is "in" a step's set when it is a selected node or a descendant of
//! one (subtree expansion). Every node then folds an include flag
//! through the steps in order: `intersect` clears it outside the set,
//! `subtract` clears it inside the set, `union` sets it inside the set.
//! Later steps can re-include or re-exclude nodes decided earlier.

use sigtuna_core::{ns, Error};
use sigtuna_xml::nodeset::{node_index, NodeSet};
use sigtuna_xml::xpath::{self, PathItem};
use std::collections::{HashMap, HashSet};

/// Set operation of one filter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Intersect,
    Subtract,
    Union,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intersect => ns::XPATH2_FILTER_INTERSECT,
            Self::Subtract => ns::XPATH2_FILTER_SUBTRACT,
            Self::Union => ns::XPATH2_FILTER_UNION,
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            ns::XPATH2_FILTER_INTERSECT => Ok(Self::Intersect),
            ns::XPATH2_FILTER_SUBTRACT => Ok(Self::Subtract),
            ns::XPATH2_FILTER_UNION => Ok(Self::Union),
            other => Err(Error::Transform(format!("unknown filter operation: {other}"))),
        }
    }
}

/// One step of a filter transform. Steps are ordered; order changes the
/// result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStep {
    /// The XPath expression, evaluated over the whole document.
    pub xpath: String,
    /// Namespace prefixes in scope for this step's expression.
    pub namespaces: HashMap<String, String>,
    /// The set operation applied with this step's node-set.
    pub op: FilterOp,
}

impl FilterStep {
    pub fn new(
        xpath: impl Into<String>,
        op: FilterOp,
        namespaces: HashMap<String, String>,
    ) -> Self {
        Self {
            xpath: xpath.into(),
            namespaces,
            op,
        }
    }
}

struct StepSet {
    op: FilterOp,
    nodes: HashSet<usize>,
    attrs: HashSet<(usize, String, String)>,
}

/// Evaluate a filter transform over a document, producing the retained
/// node-set with explicit attribute membership.
///
/// An empty step list retains the whole document. Namespace declaration
/// nodes are never filtered; they render with their element regardless
/// of the step results.
pub fn evaluate(
    doc: &roxmltree::Document<'_>,
    steps: &[FilterStep],
) -> Result<NodeSet, Error> {
    let mut step_sets = Vec::with_capacity(steps.len());
    for step in steps {
        let items = xpath::evaluate(doc, &step.xpath, &step.namespaces)?;
        let mut nodes = HashSet::new();
        let mut attrs = HashSet::new();
        for item in items {
            match item {
                PathItem::Node(n) => {
                    nodes.insert(node_index(n));
                }
                PathItem::Attribute { owner, ns, local } => {
                    attrs.insert((node_index(owner), ns, local));
                }
            }
        }
        step_sets.push(StepSet {
            op: step.op,
            nodes,
            attrs,
        });
    }

    let mut out = NodeSet::new().with_explicit_attrs();
    for node in doc.root().descendants() {
        if fold_include(&step_sets, |set| in_subtree(node, &set.nodes)) {
            out.insert(node);
        }
        if node.is_element() {
            let eid = node_index(node);
            for attr in node.attributes() {
                let ns_uri = attr.namespace().unwrap_or("").to_owned();
                let local = attr.name().to_owned();
                let key = (eid, ns_uri, local);
                let included = fold_include(&step_sets, |set| {
                    set.attrs.contains(&key) || in_subtree(node, &set.nodes)
                });
                if included {
                    out.insert_attr(key.0, &key.1, &key.2);
                }
            }
        }
    }
    Ok(out)
}

/// Fold the include flag over the steps. The flag starts true, which is
/// the implicit union of the document root.
fn fold_include(step_sets: &[StepSet], in_set: impl Fn(&StepSet) -> bool) -> bool {
    let mut include = true;
    for set in step_sets {
        let hit = in_set(set);
        match set.op {
            FilterOp::Intersect => {
                if !hit {
                    include = false;
                }
            }
            FilterOp::Subtract => {
                if hit {
                    include = false;
                }
            }
            FilterOp::Union => {
                if hit {
                    include = true;
                }
            }
        }
    }
    include
}

/// Subtree-expansion membership: the node itself or any ancestor is in
/// the step's selected set.
fn in_subtree(node: roxmltree::Node<'_, '_>, selected: &HashSet<usize>) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if selected.contains(&node_index(n)) {
            return true;
        }
        current = n.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem<'a>(doc: &'a roxmltree::Document<'a>, name: &str) -> roxmltree::Node<'a, 'a> {
        doc.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .unwrap()
    }

    #[test]
    fn empty_step_list_retains_everything() {
        let doc = roxmltree::Document::parse("<a><b/>text</a>").unwrap();
        let set = evaluate(&doc, &[]).unwrap();
        for n in doc.root().descendants() {
            assert!(set.contains(n));
        }
    }

    #[test]
    fn subtract_removes_a_subtree() {
        let doc = roxmltree::Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let steps = [FilterStep::new("/a/b", FilterOp::Subtract, HashMap::new())];
        let set = evaluate(&doc, &steps).unwrap();
        assert!(set.contains(elem(&doc, "a")));
        assert!(set.contains(elem(&doc, "d")));
        assert!(!set.contains(elem(&doc, "b")));
        assert!(!set.contains(elem(&doc, "c")));
    }

    #[test]
    fn union_reincludes_after_subtract() {
        let doc = roxmltree::Document::parse("<a><b><c/></b></a>").unwrap();
        let steps = [
            FilterStep::new("/a/b", FilterOp::Subtract, HashMap::new()),
            FilterStep::new("/a/b/c", FilterOp::Union, HashMap::new()),
        ];
        let set = evaluate(&doc, &steps).unwrap();
        assert!(!set.contains(elem(&doc, "b")));
        assert!(set.contains(elem(&doc, "c")));
    }

    #[test]
    fn intersect_with_empty_selection_excludes_everything() {
        let doc = roxmltree::Document::parse("<a><b/></a>").unwrap();
        let steps = [FilterStep::new("/nosuch", FilterOp::Intersect, HashMap::new())];
        let set = evaluate(&doc, &steps).unwrap();
        assert!(!set.contains(elem(&doc, "a")));
        assert!(!set.contains(elem(&doc, "b")));
    }

    #[test]
    fn attributes_follow_their_subtree() {
        let doc = roxmltree::Document::parse(r#"<a><b x="1"/><c y="2"/></a>"#).unwrap();
        let steps = [FilterStep::new("/a/b", FilterOp::Intersect, HashMap::new())];
        let set = evaluate(&doc, &steps).unwrap();
        let b = elem(&doc, "b");
        let c = elem(&doc, "c");
        assert!(set.attr_visible(node_index(b), "", "x"));
        assert!(!set.attr_visible(node_index(c), "", "y"));
    }

    #[test]
    fn step_order_matters() {
        let doc = roxmltree::Document::parse("<a><b><c/></b></a>").unwrap();
        let forward = [
            FilterStep::new("/a/b/c", FilterOp::Union, HashMap::new()),
            FilterStep::new("/a/b", FilterOp::Subtract, HashMap::new()),
        ];
        let set = evaluate(&doc, &forward).unwrap();
        // Subtract runs last: c stays excluded.
        assert!(!set.contains(elem(&doc, "c")));
    }
}
