#![forbid(unsafe_code)]

//! Namespace-aware element lookup helpers over roxmltree.

/// Find the first descendant element with the given local name and namespace.
pub fn find_element<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns
    })
}

/// Find the first child element with the given local name and namespace.
pub fn find_child<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns
    })
}

/// Find all child elements with the given local name and namespace.
pub fn find_children<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    parent
        .children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns
        })
        .collect()
}

/// Follow a path of (namespace, local-name) pairs from `parent` and return
/// the trimmed text of the final element.
pub fn text_at<'a>(
    parent: roxmltree::Node<'a, 'a>,
    path: &[(&str, &str)],
) -> Option<String> {
    let mut current = parent;
    for (ns, name) in path {
        current = find_child(current, ns, name)?;
    }
    current.text().map(|t| t.trim().to_owned())
}
