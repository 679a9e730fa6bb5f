#![forbid(unsafe_code)]

//! The transform chain: parsing, serialization and application.

use crate::filter2::{self, FilterOp, FilterStep};
use crate::fixup;
use crate::xpath_select;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_xml::writer::XmlWriter;
use sigtuna_xml::NodeSet;
use std::collections::HashMap;

/// Data flowing through a transform chain.
pub enum TransformData {
    /// An XML document with an optional retained node-set.
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to bytes. A node-set canonicalizes with inclusive C14N
    /// without comments, which is the DSig default for node-set input.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { xml_text, node_set } => {
                sigtuna_c14n::canonicalize(xml_text, C14nMode::Inclusive, node_set.as_ref())
            }
        }
    }

    /// Coerce to XML text, parsing raw bytes if needed. Any previous
    /// node-set is dropped; node-set transforms evaluate over the whole
    /// document.
    fn into_xml_text(self) -> Result<String, Error> {
        match self {
            TransformData::Xml { xml_text, .. } => Ok(xml_text),
            TransformData::Binary(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                Ok(text.to_owned())
            }
        }
    }
}

/// One transform of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Inclusive canonicalization, with or without comments.
    Canonicalize { with_comments: bool },
    /// XPath 1.0 selection.
    XPathSelect {
        xpath: String,
        namespaces: HashMap<String, String>,
    },
    /// XPath Filter 2.0 step list.
    Filter(Vec<FilterStep>),
}

impl Transform {
    /// The algorithm URI identifying this transform.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Canonicalize {
                with_comments: false,
            } => algorithm::C14N,
            Self::Canonicalize {
                with_comments: true,
            } => algorithm::C14N_WITH_COMMENTS,
            Self::XPathSelect { .. } => algorithm::XPATH,
            Self::Filter(_) => algorithm::XPATH_FILTER2,
        }
    }

    /// Parse one `<ds:Transform>` element. Unknown algorithm URIs are
    /// rejected here, not at application time.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let algo = node
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute(ns::attr::ALGORITHM.into()))?;
        match algo {
            algorithm::C14N => Ok(Self::Canonicalize {
                with_comments: false,
            }),
            algorithm::C14N_WITH_COMMENTS => Ok(Self::Canonicalize {
                with_comments: true,
            }),
            algorithm::XPATH => {
                let xpath_node = node
                    .children()
                    .find(|n| {
                        n.is_element()
                            && n.tag_name().name() == ns::node::XPATH
                            && n.tag_name().namespace().unwrap_or("") == ns::DSIG
                    })
                    .ok_or_else(|| Error::MissingElement(ns::node::XPATH.into()))?;
                Ok(Self::XPathSelect {
                    xpath: xpath_node.text().unwrap_or("").trim().to_owned(),
                    namespaces: inscope_prefixes(xpath_node),
                })
            }
            algorithm::XPATH_FILTER2 => {
                let mut steps = Vec::new();
                for child in node.children() {
                    if child.is_element()
                        && child.tag_name().name() == ns::node::XPATH
                        && child.tag_name().namespace().unwrap_or("") == ns::XPATH2
                    {
                        let op = child
                            .attribute(ns::attr::FILTER)
                            .ok_or_else(|| Error::MissingAttribute(ns::attr::FILTER.into()))?;
                        steps.push(FilterStep {
                            xpath: child.text().unwrap_or("").trim().to_owned(),
                            namespaces: inscope_prefixes(child),
                            op: FilterOp::from_str(op)?,
                        });
                    }
                }
                if steps.is_empty() {
                    return Err(Error::Transform(
                        "filter transform without XPath steps".into(),
                    ));
                }
                Ok(Self::Filter(steps))
            }
            other => Err(Error::UnsupportedTransform(other.to_owned())),
        }
    }

    /// Apply this transform to the data.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match self {
            Self::Canonicalize { with_comments } => {
                let mode = if *with_comments {
                    C14nMode::InclusiveWithComments
                } else {
                    C14nMode::Inclusive
                };
                let bytes = match input {
                    TransformData::Xml { xml_text, node_set } => {
                        sigtuna_c14n::canonicalize(&xml_text, mode, node_set.as_ref())?
                    }
                    TransformData::Binary(data) => {
                        let text = std::str::from_utf8(&data)
                            .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                        sigtuna_c14n::canonicalize(text, mode, None)?
                    }
                };
                Ok(TransformData::Binary(bytes))
            }
            Self::XPathSelect { xpath, namespaces } => {
                let xml_text = input.into_xml_text()?;
                let doc = sigtuna_xml::parse(&xml_text)?;
                let mut set = xpath_select::evaluate(&doc, xpath, namespaces)?;
                fixup::apply(&doc, &mut set);
                drop(doc);
                Ok(TransformData::Xml {
                    xml_text,
                    node_set: Some(set),
                })
            }
            Self::Filter(steps) => {
                let xml_text = input.into_xml_text()?;
                let doc = sigtuna_xml::parse(&xml_text)?;
                let mut set = filter2::evaluate(&doc, steps)?;
                fixup::apply(&doc, &mut set);
                drop(doc);
                Ok(TransformData::Xml {
                    xml_text,
                    node_set: Some(set),
                })
            }
        }
    }

    fn write_into(&self, w: &mut XmlWriter) {
        match self {
            Self::Canonicalize { .. } => {
                w.empty_element("ds:Transform", &[(ns::attr::ALGORITHM, self.uri())]);
            }
            Self::XPathSelect { xpath, namespaces } => {
                w.start_element("ds:Transform", &[(ns::attr::ALGORITHM, self.uri())]);
                let decls = prefix_decls(namespaces);
                let attrs: Vec<(&str, &str)> =
                    decls.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                w.start_element("ds:XPath", &attrs);
                w.write_text(xpath);
                w.end_element();
                w.end_element();
            }
            Self::Filter(steps) => {
                w.start_element("ds:Transform", &[(ns::attr::ALGORITHM, self.uri())]);
                for step in steps {
                    let mut decls = vec![(
                        "xmlns:dsig-xpath".to_owned(),
                        ns::XPATH2.to_owned(),
                    )];
                    decls.extend(prefix_decls(&step.namespaces));
                    let mut attrs: Vec<(&str, &str)> =
                        decls.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                    attrs.push((ns::attr::FILTER, step.op.as_str()));
                    w.start_element("dsig-xpath:XPath", &attrs);
                    w.write_text(&step.xpath);
                    w.end_element();
                }
                w.end_element();
            }
        }
    }
}

/// Collect the prefixed namespace declarations in scope at a node.
fn inscope_prefixes(node: roxmltree::Node<'_, '_>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut current = Some(node);
    while let Some(n) = current {
        if n.is_element() {
            for decl in n.namespaces() {
                if let Some(prefix) = decl.name() {
                    if prefix != "xml" {
                        map.entry(prefix.to_owned())
                            .or_insert_with(|| decl.uri().to_owned());
                    }
                }
            }
        }
        current = n.parent();
    }
    map
}

fn prefix_decls(namespaces: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut decls: Vec<(String, String)> = namespaces
        .iter()
        .map(|(p, u)| (format!("xmlns:{p}"), u.clone()))
        .collect();
    decls.sort();
    decls
}

/// An ordered transform chain. Empty chains are legal and apply as a
/// no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformChain {
    transforms: Vec<Transform>,
}

impl TransformChain {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn push(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    /// Parse a `<ds:Transforms>` element, preserving transform order.
    pub fn from_transforms_node(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let mut transforms = Vec::new();
        for child in node.children() {
            if child.is_element()
                && child.tag_name().name() == ns::node::TRANSFORM
                && child.tag_name().namespace().unwrap_or("") == ns::DSIG
            {
                transforms.push(Transform::from_node(child)?);
            }
        }
        Ok(Self { transforms })
    }

    /// Serialize as `<ds:Transforms>`. Writes nothing for an empty
    /// chain.
    pub fn write_into(&self, w: &mut XmlWriter) {
        if self.transforms.is_empty() {
            return;
        }
        w.start_element("ds:Transforms", &[]);
        for t in &self.transforms {
            t.write_into(w);
        }
        w.end_element();
    }

    /// Apply all transforms in order.
    pub fn apply(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            data = transform.execute(data)?;
        }
        Ok(data)
    }
}
