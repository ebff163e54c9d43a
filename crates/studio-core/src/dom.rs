//! Owned SVG element tree.
//!
//! The normalizer operates on this tree instead of a live document: it can be produced by
//! [`parse_svg`] or built directly with the `with_*` builders, and is written back out with
//! [`Element::to_svg_string`]. Namespace declarations are kept as ordinary `xmlns*`
//! attributes on the element that declared them, so serialization round-trips them.

use crate::error::{Error, Result};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Qualified name as written in the markup (`svg`, `xhtml:div`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without a namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn is(&self, local_name: &str) -> bool {
        self.local_name() == local_name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sets an attribute. An existing attribute keeps its position; new ones are appended.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    /// True when the `class` attribute contains `token` as a whole word. Words are runs of
    /// `[A-Za-z0-9_]`, so `font-mono` holds `mono` and `monospace` does not.
    pub fn has_class_token(&self, token: &str) -> bool {
        self.attr("class").is_some_and(|c| {
            c.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .any(|word| word == token)
        })
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn first_element_child(&self) -> Option<&Element> {
        self.element_children().next()
    }

    pub fn push_child(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    pub fn insert_child(&mut self, index: usize, child: impl Into<Node>) {
        let index = index.min(self.children.len());
        self.children.insert(index, child.into());
    }

    pub fn retain_children(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        self.children.retain(|n| keep(n));
    }

    /// Removes every descendant element with the given local name.
    pub fn remove_descendants(&mut self, local_name: &str) {
        self.children
            .retain(|n| !matches!(n, Node::Element(el) if el.is(local_name)));
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.remove_descendants(local_name);
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Visits this element and every descendant element in document order.
    ///
    /// The second callback argument is `true` for elements nested inside a `foreignObject`
    /// (the `foreignObject` itself is reported as `false`).
    pub fn walk_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Element, bool),
    {
        walk_inner(self, false, f);
    }

    pub fn to_svg_string(&self) -> String {
        let mut out = String::with_capacity(1024);
        write_element(self, &mut out);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            Node::Comment(_) => {}
        }
    }
}

fn walk_inner<F>(el: &mut Element, in_foreign_object: bool, f: &mut F)
where
    F: FnMut(&mut Element, bool),
{
    f(el, in_foreign_object);
    let nested = in_foreign_object || el.is("foreignObject");
    for child in &mut el.children {
        if let Node::Element(child) = child {
            walk_inner(child, nested, f);
        }
    }
}

/// Parses SVG markup into an owned tree rooted at the `<svg>` element.
pub fn parse_svg(markup: &str) -> Result<Element> {
    let opts = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(markup, opts).map_err(|e| {
        Error::InvalidMarkup {
            message: e.to_string(),
        }
    })?;
    let root = doc.root_element();
    if !root.tag_name().name().eq_ignore_ascii_case("svg") {
        return Err(Error::NotSvgRoot {
            found: root.tag_name().name().to_string(),
        });
    }
    Ok(build_element(root, None))
}

fn qualified_name(node: roxmltree::Node<'_, '_>, ns: Option<&str>, local: &str) -> String {
    let Some(uri) = ns else {
        return local.to_string();
    };
    if uri == XML_NS {
        return format!("xml:{local}");
    }
    match node.lookup_prefix(uri) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

fn build_element(
    node: roxmltree::Node<'_, '_>,
    parent: Option<roxmltree::Node<'_, '_>>,
) -> Element {
    let tag = node.tag_name();
    let mut el = Element::new(qualified_name(node, tag.namespace(), tag.name()));

    for ns in node.namespaces() {
        if ns.name() == Some("xml") {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        let key = match ns.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        el.attrs.push((key, ns.uri().to_string()));
    }

    for a in node.attributes() {
        let key = qualified_name(node, a.namespace(), a.name());
        el.attrs.push((key, a.value().to_string()));
    }

    for child in node.children() {
        if child.is_element() {
            el.children.push(Node::Element(build_element(child, Some(node))));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                el.children.push(Node::Text(text.to_string()));
            }
        } else if child.is_comment() {
            if let Some(text) = child.text() {
                el.children.push(Node::Comment(text.to_string()));
            }
        }
    }
    el
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in &el.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        push_escaped(out, v, true);
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(e, out),
            Node::Text(t) => push_escaped(out, t, false),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn push_escaped(out: &mut String, s: &str, attr: bool) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\n' if attr => out.push_str("&#10;"),
            '\t' if attr => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
}
