#![forbid(unsafe_code)]

//! XPath 1.0 subset evaluator for signature transforms.
//!
//! Supports the location-path subset that signature policies use in
//! filter expressions:
//! - absolute and relative paths (`/a/b`, `a/b`, `//c`)
//! - axes: `child`, `descendant`, `descendant-or-self`, `self`, `parent`,
//!   `attribute` (plus the `@`, `.` and `..` abbreviations)
//! - node tests: `name`, `prefix:name`, `prefix:*`, `*`, `node()`, `text()`
//! - predicates: positional `[3]`, attribute presence `[@a]` and
//!   attribute equality `[@a='v']`
//! - union of paths with `|`
//!
//! Prefixes in node tests and predicates are resolved against the
//! namespace map supplied per expression. An unprefixed name test
//! matches elements in no namespace.

use sigtuna_core::Error;
use std::collections::HashMap;

/// One item of an XPath evaluation result.
#[derive(Debug, Clone)]
pub enum PathItem<'a, 'd> {
    Node(roxmltree::Node<'a, 'd>),
    Attribute {
        owner: roxmltree::Node<'a, 'd>,
        ns: String,
        local: String,
    },
}

/// Evaluate an XPath expression over a document.
///
/// The context node for relative paths is the document root node, which
/// matches how filter expressions are evaluated over a whole document.
pub fn evaluate<'a, 'd>(
    doc: &'a roxmltree::Document<'d>,
    expr: &str,
    namespaces: &HashMap<String, String>,
) -> Result<Vec<PathItem<'a, 'd>>, Error> {
    let paths = Parser::new(expr).parse_union()?;
    let mut out = Vec::new();
    for path in &paths {
        eval_path(doc, path, namespaces, &mut out)?;
    }
    Ok(out)
}

// ── AST ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Attribute,
}

#[derive(Debug, Clone)]
enum NodeTest {
    /// Any node of the axis' principal type.
    AnyName,
    /// `prefix:*` with the prefix resolved at evaluation time.
    NsAny(String),
    /// Name test, optionally prefixed.
    Name(Option<String>, String),
    /// `node()`
    AnyNode,
    /// `text()`
    Text,
}

#[derive(Debug, Clone)]
enum Predicate {
    Position(usize),
    AttrPresent(Option<String>, String),
    AttrEquals(Option<String>, String, String),
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone)]
struct LocationPath {
    /// True for `/...` and `//...` paths.
    absolute: bool,
    steps: Vec<Step>,
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'s> {
    input: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(input: &'s str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_union(&mut self) -> Result<Vec<LocationPath>, Error> {
        let mut paths = vec![self.parse_path()?];
        loop {
            self.skip_ws();
            if self.eat('|') {
                paths.push(self.parse_path()?);
            } else {
                break;
            }
        }
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(self.error("trailing input"));
        }
        Ok(paths)
    }

    fn parse_path(&mut self) -> Result<LocationPath, Error> {
        self.skip_ws();
        let mut absolute = false;
        let mut leading_descent = false;
        if self.eat_str("//") {
            absolute = true;
            leading_descent = true;
        } else if self.eat('/') {
            absolute = true;
        }
        let mut steps = Vec::new();
        self.skip_ws();
        if self.at_step_start() {
            steps.push(self.parse_step()?);
            loop {
                self.skip_ws();
                if self.eat_str("//") {
                    steps.push(Step {
                        axis: Axis::DescendantOrSelf,
                        test: NodeTest::AnyNode,
                        predicates: Vec::new(),
                    });
                    steps.push(self.parse_step()?);
                } else if self.eat('/') {
                    steps.push(self.parse_step()?);
                } else {
                    break;
                }
            }
        } else if !absolute {
            return Err(self.error("expected a location step"));
        }
        if leading_descent {
            steps.insert(
                0,
                Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                },
            );
        }
        Ok(LocationPath { absolute, steps })
    }

    fn parse_step(&mut self) -> Result<Step, Error> {
        self.skip_ws();
        if self.eat_str("..") {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.peek() == Some('.') {
            self.pos += 1;
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        let mut axis = Axis::Child;
        if self.eat('@') {
            axis = Axis::Attribute;
        } else if let Some(name) = self.try_axis_name() {
            axis = name;
        }
        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        loop {
            self.skip_ws();
            if self.eat('[') {
                predicates.push(self.parse_predicate()?);
                self.skip_ws();
                if !self.eat(']') {
                    return Err(self.error("expected `]`"));
                }
            } else {
                break;
            }
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn try_axis_name(&mut self) -> Option<Axis> {
        let rest = &self.input[self.pos..];
        for (name, axis) in [
            ("descendant-or-self::", Axis::DescendantOrSelf),
            ("descendant::", Axis::Descendant),
            ("attribute::", Axis::Attribute),
            ("child::", Axis::Child),
            ("parent::", Axis::Parent),
            ("self::", Axis::SelfAxis),
        ] {
            if rest.starts_with(name) {
                self.pos += name.len();
                return Some(axis);
            }
        }
        None
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, Error> {
        self.skip_ws();
        if self.eat('*') {
            return Ok(NodeTest::AnyName);
        }
        let name = self.parse_ncname()?;
        if self.eat_str("()") {
            return match name.as_str() {
                "node" => Ok(NodeTest::AnyNode),
                "text" => Ok(NodeTest::Text),
                other => Err(self.error(&format!("unsupported node type test: {other}"))),
            };
        }
        if self.eat(':') {
            if self.eat('*') {
                return Ok(NodeTest::NsAny(name));
            }
            let local = self.parse_ncname()?;
            return Ok(NodeTest::Name(Some(name), local));
        }
        Ok(NodeTest::Name(None, name))
    }

    fn parse_predicate(&mut self) -> Result<Predicate, Error> {
        self.skip_ws();
        if self
            .peek()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            let start = self.pos;
            while self
                .peek()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
            {
                self.pos += 1;
            }
            let n: usize = self.input[start..self.pos]
                .parse()
                .map_err(|_| self.error("invalid position"))?;
            if n == 0 {
                return Err(self.error("positions are 1-based"));
            }
            return Ok(Predicate::Position(n));
        }
        if !self.eat('@') {
            return Err(self.error("unsupported predicate"));
        }
        let first = self.parse_ncname()?;
        let (prefix, local) = if self.eat(':') {
            (Some(first), self.parse_ncname()?)
        } else {
            (None, first)
        };
        self.skip_ws();
        if self.eat('=') {
            self.skip_ws();
            let value = self.parse_literal()?;
            return Ok(Predicate::AttrEquals(prefix, local, value));
        }
        Ok(Predicate::AttrPresent(prefix, local))
    }

    fn parse_ncname(&mut self) -> Result<String, Error> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                // `..` and `.` steps are consumed before name parsing, so
                // a dot here is part of a name.
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.input[start..self.pos].to_owned())
    }

    fn parse_literal(&mut self) -> Result<String, Error> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a string literal")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value = self.input[start..self.pos].to_owned();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += c.len_utf8();
        }
        Err(self.error("unterminated string literal"))
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(c) if c.is_alphanumeric() || matches!(c, '_' | '*' | '@' | '.')
        )
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::XPath(format!("{msg} at offset {} in `{}`", self.pos, self.input))
    }
}

// ── Evaluation ───────────────────────────────────────────────────────

fn eval_path<'a, 'd>(
    doc: &'a roxmltree::Document<'d>,
    path: &LocationPath,
    namespaces: &HashMap<String, String>,
    out: &mut Vec<PathItem<'a, 'd>>,
) -> Result<(), Error> {
    let context = doc.root();
    if path.steps.is_empty() {
        // A bare `/` selects the root node.
        if path.absolute {
            out.push(PathItem::Node(context));
        }
        return Ok(());
    }
    let mut current: Vec<PathItem<'a, 'd>> = vec![PathItem::Node(context)];
    for step in &path.steps {
        let mut next = Vec::new();
        for item in &current {
            let node = match item {
                PathItem::Node(n) => *n,
                // Attributes have no children; any further step drops them.
                PathItem::Attribute { .. } => continue,
            };
            let mut candidates = Vec::new();
            collect_axis(node, step, namespaces, &mut candidates)?;
            apply_predicates(&step.predicates, namespaces, &mut candidates)?;
            next.extend(candidates);
        }
        dedup_items(&mut next);
        current = next;
    }
    out.extend(current);
    Ok(())
}

fn collect_axis<'a, 'd>(
    node: roxmltree::Node<'a, 'd>,
    step: &Step,
    namespaces: &HashMap<String, String>,
    out: &mut Vec<PathItem<'a, 'd>>,
) -> Result<(), Error> {
    match step.axis {
        Axis::Child => {
            for c in node.children() {
                if node_matches(c, &step.test, namespaces)? {
                    out.push(PathItem::Node(c));
                }
            }
        }
        Axis::Descendant => {
            for c in node.descendants().skip(1) {
                if node_matches(c, &step.test, namespaces)? {
                    out.push(PathItem::Node(c));
                }
            }
        }
        Axis::DescendantOrSelf => {
            for c in node.descendants() {
                if node_matches(c, &step.test, namespaces)? {
                    out.push(PathItem::Node(c));
                }
            }
        }
        Axis::SelfAxis => {
            if node_matches(node, &step.test, namespaces)? {
                out.push(PathItem::Node(node));
            }
        }
        Axis::Parent => {
            if let Some(p) = node.parent() {
                if node_matches(p, &step.test, namespaces)? {
                    out.push(PathItem::Node(p));
                }
            }
        }
        Axis::Attribute => {
            if !node.is_element() {
                return Ok(());
            }
            for a in node.attributes() {
                if attr_matches(&a, &step.test, namespaces)? {
                    out.push(PathItem::Attribute {
                        owner: node,
                        ns: a.namespace().unwrap_or("").to_owned(),
                        local: a.name().to_owned(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn node_matches(
    node: roxmltree::Node<'_, '_>,
    test: &NodeTest,
    namespaces: &HashMap<String, String>,
) -> Result<bool, Error> {
    Ok(match test {
        NodeTest::AnyNode => !node.is_root(),
        NodeTest::Text => node.is_text(),
        NodeTest::AnyName => node.is_element(),
        NodeTest::NsAny(prefix) => {
            node.is_element()
                && node.tag_name().namespace().unwrap_or("") == resolve_prefix(prefix, namespaces)?
        }
        NodeTest::Name(prefix, local) => {
            if !node.is_element() || node.tag_name().name() != local {
                false
            } else {
                let want = match prefix {
                    Some(p) => resolve_prefix(p, namespaces)?,
                    None => "",
                };
                node.tag_name().namespace().unwrap_or("") == want
            }
        }
    })
}

fn attr_matches(
    attr: &roxmltree::Attribute<'_, '_>,
    test: &NodeTest,
    namespaces: &HashMap<String, String>,
) -> Result<bool, Error> {
    Ok(match test {
        NodeTest::AnyNode | NodeTest::AnyName => true,
        NodeTest::Text => false,
        NodeTest::NsAny(prefix) => {
            attr.namespace().unwrap_or("") == resolve_prefix(prefix, namespaces)?
        }
        NodeTest::Name(prefix, local) => {
            if attr.name() != local {
                false
            } else {
                let want = match prefix {
                    Some(p) => resolve_prefix(p, namespaces)?,
                    None => "",
                };
                attr.namespace().unwrap_or("") == want
            }
        }
    })
}

fn apply_predicates<'a, 'd>(
    predicates: &[Predicate],
    namespaces: &HashMap<String, String>,
    items: &mut Vec<PathItem<'a, 'd>>,
) -> Result<(), Error> {
    for pred in predicates {
        match pred {
            Predicate::Position(n) => {
                if *n <= items.len() {
                    let kept = items.swap_remove(*n - 1);
                    items.clear();
                    items.push(kept);
                } else {
                    items.clear();
                }
            }
            Predicate::AttrPresent(prefix, local) => {
                let want_ns = match prefix {
                    Some(p) => resolve_prefix(p, namespaces)?.to_owned(),
                    None => String::new(),
                };
                items.retain(|item| match item {
                    PathItem::Node(n) => has_attr(*n, &want_ns, local),
                    PathItem::Attribute { .. } => false,
                });
            }
            Predicate::AttrEquals(prefix, local, value) => {
                let want_ns = match prefix {
                    Some(p) => resolve_prefix(p, namespaces)?.to_owned(),
                    None => String::new(),
                };
                items.retain(|item| match item {
                    PathItem::Node(n) => {
                        attr_value(*n, &want_ns, local).map(|v| v == value).unwrap_or(false)
                    }
                    PathItem::Attribute { .. } => false,
                });
            }
        }
    }
    Ok(())
}

fn resolve_prefix<'m>(
    prefix: &str,
    namespaces: &'m HashMap<String, String>,
) -> Result<&'m str, Error> {
    namespaces
        .get(prefix)
        .map(String::as_str)
        .ok_or_else(|| Error::XPath(format!("undeclared namespace prefix: {prefix}")))
}

fn has_attr(node: roxmltree::Node<'_, '_>, ns: &str, local: &str) -> bool {
    node.is_element()
        && node
            .attributes()
            .any(|a| a.name() == local && a.namespace().unwrap_or("") == ns)
}

fn attr_value<'a>(node: roxmltree::Node<'a, '_>, ns: &str, local: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == local && a.namespace().unwrap_or("") == ns)
        .map(|a| a.value())
}

fn dedup_items(items: &mut Vec<PathItem<'_, '_>>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| match item {
        PathItem::Node(n) => seen.insert((n.id().get_usize(), String::new(), String::new())),
        PathItem::Attribute { owner, ns, local } => {
            seen.insert((owner.id().get_usize(), ns.clone(), local.clone()))
        }
    });
}
