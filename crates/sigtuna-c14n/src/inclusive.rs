#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - outputs namespace declarations sorted by prefix (default first)
//! - outputs attributes sorted by (namespace URI, local name)
//! - escapes text and attribute values per C14N rules
//! - optionally preserves or strips comments
//! - supports document-subset canonicalization via `NodeSet`, including
//!   per-attribute membership and materialized `xml:*` attributes from
//!   the namespace-attribute fixup

use crate::escape;
use crate::render::{Attr, NsDecl};
use sigtuna_core::{ns, Error};
use sigtuna_xml::nodeset::{node_index, NodeSet};
use std::collections::BTreeMap;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, node: roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(set) => set.contains(node),
        }
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, inherited_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(node) {
                    self.render_misc(node, output, |node, out| {
                        out.extend_from_slice(b"<!--");
                        out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                        out.extend_from_slice(b"-->");
                    });
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(node) {
                    if let Some(pi) = node.pi() {
                        self.render_misc(node, output, |_, out| {
                            out.extend_from_slice(b"<?");
                            out.extend_from_slice(pi.target.as_bytes());
                            if let Some(value) = pi.value {
                                if !value.is_empty() {
                                    out.push(b' ');
                                    out.extend_from_slice(escape::escape_pi(value).as_bytes());
                                }
                            }
                            out.extend_from_slice(b"?>");
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Render a comment or PI, adding the newline separators C14N
    /// requires around document-level miscellaneous nodes.
    fn render_misc(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        render: impl Fn(roxmltree::Node<'_, '_>, &mut Vec<u8>),
    ) {
        let at_doc_level = node
            .parent()
            .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
        if at_doc_level && node.prev_siblings().any(|s| s.is_element()) {
            output.push(b'\n');
        }
        render(node, output);
        if at_doc_level && node.next_siblings().any(|s| s.is_element()) {
            output.push(b'\n');
        }
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(node) {
            // Excluded element: its children in the set still render, and
            // they keep seeing the namespace context of the nearest
            // visible ancestor.
            for child in node.children() {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }

        // All namespaces in scope at this element: declarations on the
        // element itself and on ancestors, closer ones winning.
        let current_ns = collect_inscope_namespaces(node);

        // Emit a declaration only when it is new or changed relative to
        // the nearest visible ancestor. The xml prefix is never emitted.
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for (prefix, uri) in &current_ns {
            if prefix == "xml" {
                continue;
            }
            if inherited_ns.get(prefix) != Some(uri) {
                ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                });
            }
        }
        ns_decls.sort();

        let attrs = self.collect_attrs(node);
        let elem_name = qualified_element_name(node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            ns_decl.write_to(output);
        }
        for attr in &attrs {
            attr.write_to(output);
        }
        output.push(b'>');

        let mut child_ns = inherited_ns.clone();
        for (prefix, uri) in &current_ns {
            if prefix != "xml" {
                child_ns.insert(prefix.clone(), uri.clone());
            }
        }
        for child in node.children() {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }

    /// Collect the attributes to render on a visible element, in
    /// canonical order.
    fn collect_attrs(&self, node: roxmltree::Node<'_, '_>) -> Vec<Attr> {
        let eid = node_index(node);
        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            if let Some(set) = self.node_set {
                if !set.attr_visible(eid, ns_uri, attr.name()) {
                    continue;
                }
            }
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: qualified_attr_name(node, &attr),
                value: attr.value().to_owned(),
            });
        }

        if let Some(set) = self.node_set {
            if set.fixup_applied() {
                // The fixup has already decided which inherited xml:*
                // attributes each element carries; materialize them and
                // skip the built-in inheritance walk. A materialized
                // attribute wins over the element's own of the same name.
                if let Some(extras) = set.xml_attr_extras(eid) {
                    for (name, value) in extras {
                        attrs.retain(|a| !(a.ns_uri == ns::XML && a.local_name == *name));
                        attrs.push(Attr {
                            ns_uri: ns::XML.to_owned(),
                            local_name: name.clone(),
                            qualified_name: format!("xml:{name}"),
                            value: value.clone(),
                        });
                    }
                }
            } else {
                // Document-subset C14N 1.0: an element whose immediate
                // parent is excluded inherits the xml:* attributes of all
                // its ancestors, nearest value winning. Elements with a
                // visible parent inherit nothing because the parent
                // renders its own.
                let parent_not_visible = node
                    .parent()
                    .is_none_or(|p| !p.is_element() || !self.is_visible(p));
                if parent_not_visible {
                    attrs.extend(collect_inherited_xml_attrs(node, &attrs));
                }
            }
        }
        attrs.sort();
        attrs
    }
}

/// Collect `xml:*` attributes inherited from ancestors that are not
/// already present on the element's own attribute axis.
fn collect_inherited_xml_attrs(
    node: roxmltree::Node<'_, '_>,
    existing_attrs: &[Attr],
) -> Vec<Attr> {
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element() {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(ns::XML) && !inherited.contains_key(attr.name()) {
                    inherited.insert(attr.name().to_owned(), attr.value().to_owned());
                }
            }
        }
        current = ancestor.parent();
    }

    inherited
        .into_iter()
        .filter(|(name, _)| {
            !existing_attrs
                .iter()
                .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
        })
        .map(|(name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            qualified_name: format!("xml:{name}"),
            local_name: name,
            value,
        })
        .collect()
}

/// All in-scope namespaces for an element, walking the ancestor chain
/// with closer declarations overriding more distant ones.
fn collect_inscope_namespaces(node: roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut levels: Vec<BTreeMap<String, String>> = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for decl in n.namespaces() {
                level.insert(decl.name().unwrap_or("").to_owned(), decl.uri().to_owned());
            }
            levels.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in levels.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                // xmlns="" undeclares the default namespace.
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

/// Element name with its original prefix. roxmltree does not expose the
/// prefix directly; `lookup_prefix` recovers it from the in-scope
/// declarations.
fn qualified_element_name(node: roxmltree::Node<'_, '_>) -> String {
    let local = node.tag_name().name();
    match node.tag_name().namespace().and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_owned(),
    }
}

fn qualified_attr_name(
    elem: roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> String {
    match attr.namespace() {
        Some(uri) if uri == ns::XML => format!("xml:{}", attr.name()),
        Some(uri) => match elem.lookup_prefix(uri) {
            Some(prefix) => format!("{}:{}", prefix, attr.name()),
            None => attr.name().to_owned(),
        },
        None => attr.name().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn sorts_attributes() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn renders_namespace_declarations() {
        let out = c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:c/></root>"#);
        assert_eq!(
            out,
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:c></a:c></root>"#
        );
    }

    #[test]
    fn suppresses_redeclared_namespaces() {
        let out = c14n(r#"<r xmlns:a="http://a"><c xmlns:a="http://a"/></r>"#);
        assert_eq!(out, r#"<r xmlns:a="http://a"><c></c></r>"#);
    }

    #[test]
    fn escapes_text() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c</root>"),
            "<root>a &amp; b &lt; c</root>"
        );
    }

    #[test]
    fn strips_comments_without_comments_mode() {
        let doc = roxmltree::Document::parse("<r><!--gone--><a/></r>").unwrap();
        let out = String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap();
        assert_eq!(out, "<r><a></a></r>");
        let out = String::from_utf8(canonicalize(&doc, true, None).unwrap()).unwrap();
        assert_eq!(out, "<r><!--gone--><a></a></r>");
    }

    #[test]
    fn subset_skips_excluded_elements() {
        let xml = "<r><keep><x/></keep><drop/></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let mut set = NodeSet::new();
        let r = doc.root_element();
        set.insert(doc.root());
        set.insert(r);
        let keep = r.children().find(|n| n.has_tag_name("keep")).unwrap();
        for n in keep.descendants() {
            set.insert(n);
        }
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(out, "<r><keep><x></x></keep></r>");
    }

    #[test]
    fn subset_inherits_xml_attrs_across_excluded_parent() {
        let xml = r#"<r xml:lang="en"><mid><leaf/></mid></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let mid = doc
            .descendants()
            .find(|n| n.has_tag_name("mid"))
            .unwrap();
        let leaf = doc
            .descendants()
            .find(|n| n.has_tag_name("leaf"))
            .unwrap();
        let mut set = NodeSet::new();
        set.insert(mid);
        set.insert(leaf);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(out, r#"<mid xml:lang="en"><leaf></leaf></mid>"#);
    }

    #[test]
    fn fixup_extras_replace_inheritance_walk() {
        let xml = r#"<r xml:lang="en"><mid><leaf/></mid></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let mid = doc
            .descendants()
            .find(|n| n.has_tag_name("mid"))
            .unwrap();
        let leaf = doc
            .descendants()
            .find(|n| n.has_tag_name("leaf"))
            .unwrap();
        let mut set = NodeSet::new();
        set.insert(mid);
        set.insert(leaf);
        let mut extras = BTreeMap::new();
        extras.insert("lang".to_owned(), "en".to_owned());
        set.set_xml_attr_extras(node_index(mid), extras);
        set.mark_fixup_applied();
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        // The leaf does not re-inherit: only mid carries the attribute.
        assert_eq!(out, r#"<mid xml:lang="en"><leaf></leaf></mid>"#);
    }

    #[test]
    fn explicit_attr_membership_filters_attributes() {
        let xml = r#"<r a="1" b="2"/>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let r = doc.root_element();
        let mut set = NodeSet::new();
        set.insert(doc.root());
        set.insert(r);
        let mut set = set.with_explicit_attrs();
        set.insert_attr(node_index(r), "", "b");
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(out, r#"<r b="2"></r>"#);
    }
}
