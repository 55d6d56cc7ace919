use crate::error::{Result, VastError};
use crate::normalize::clean_vast_xml;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

/// Deepest element nesting accepted when building the tree
pub const MAX_NESTING: usize = 256;

/// A node in the loaded element tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

/// An XML element keyed by its local name, so `vast:MediaFile`,
/// `def:MediaFile` and `MediaFile` all answer to `"MediaFile"`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart, lenient: bool) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes().with_checks(!lenient) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(_) if lenient => continue,
                Err(e) => return Err(VastError::XmlParseError(e.into())),
            };
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) if lenient => String::from_utf8_lossy(&attr.value).into_owned(),
                Err(e) => return Err(VastError::XmlParseError(e)),
            };
            attributes.push((key, value));
        }

        Ok(Element {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
        })
    }

    /// Whether this element's local name is `name`
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Attribute value by local name, ignoring case
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content of this element and all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(element) => element.collect_text(out),
                Node::Text(text) | Node::CData(text) => out.push_str(text),
            }
        }
    }

    /// Text held directly by this element, not by its children
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Serialized children, with CDATA sections written back out verbatim
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }

    /// Every descendant element, this one included, in document order,
    /// paired with its ancestors (outermost first).
    pub fn walk(&self) -> Vec<(&Element, Vec<&Element>)> {
        let mut out = Vec::new();
        let mut ancestors = Vec::new();
        self.walk_into(&mut ancestors, &mut out);
        out
    }

    fn walk_into<'a>(
        &'a self,
        ancestors: &mut Vec<&'a Element>,
        out: &mut Vec<(&'a Element, Vec<&'a Element>)>,
    ) {
        out.push((self, ancestors.clone()));
        ancestors.push(self);
        for child in self.child_elements() {
            child.walk_into(ancestors, out);
        }
        ancestors.pop();
    }

    /// Descendant-or-self elements named `name`, in document order
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        self.select(|element, _| element.is(name))
    }

    /// Descendant-or-self elements accepted by `predicate`, which also sees the ancestors
    pub fn select<F>(&self, predicate: F) -> Vec<&Element>
    where
        F: Fn(&Element, &[&Element]) -> bool,
    {
        self.walk()
            .into_iter()
            .filter(|(element, ancestors)| predicate(element, ancestors))
            .map(|(element, _)| element)
            .collect()
    }

    /// First descendant-or-self element named `name`
    pub fn first(&self, name: &str) -> Option<&Element> {
        if self.is(name) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.first(name))
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in &element.attributes {
                out.push_str(&format!(" {}=\"{}\"", key, value));
            }
            out.push('>');
            out.push_str(&element.inner_xml());
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

/// A loaded VAST document: the element tree plus the text it was loaded from
#[derive(Debug, Clone)]
pub struct VastDocument {
    pub root: Element,
    pub source: String,
}

impl VastDocument {
    /// Load `xml`, retrying with the cleaned text and then with a lenient reader
    pub fn load(xml: &str) -> Result<Self> {
        if xml.trim().is_empty() {
            return Err(VastError::EmptyDocument);
        }

        let first_error = match build_tree(xml, false) {
            Ok(root) => {
                return Ok(VastDocument {
                    root,
                    source: xml.to_string(),
                })
            }
            Err(e) => e,
        };
        debug!("Strict load failed ({}), retrying with cleaned XML", first_error);

        let cleaned = clean_vast_xml(xml);
        let root = build_tree(&cleaned, false).or_else(|e| {
            debug!("Cleaned load failed ({}), retrying with lenient reader", e);
            build_tree(&cleaned, true)
        });

        match root {
            Ok(root) => Ok(VastDocument {
                root,
                source: cleaned,
            }),
            Err(e) => Err(VastError::MalformedXml(e.to_string())),
        }
    }
}

/// Build the element tree. The lenient pass tolerates mismatched or missing
/// end tags, bad entities and malformed attributes, and ignores anything
/// after the root element closes. Both passes reject documents nested deeper
/// than [`MAX_NESTING`].
fn build_tree(xml: &str, lenient: bool) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    reader.check_end_names(!lenient);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(_) if lenient && root.is_some() => break,
            Err(e) => return Err(VastError::XmlParseError(e)),
        };

        match event {
            Event::Start(ref e) => {
                if root.is_some() {
                    if lenient {
                        break;
                    }
                    return Err(VastError::MalformedXml("content after root element".into()));
                }
                if stack.len() >= MAX_NESTING {
                    return Err(VastError::MalformedXml(format!(
                        "elements nested deeper than {}",
                        MAX_NESTING
                    )));
                }
                stack.push(Element::from_start(e, lenient)?);
            }
            Event::Empty(ref e) => {
                let element = Element::from_start(e, lenient)?;
                attach(&mut stack, &mut root, Node::Element(element), lenient)?;
            }
            Event::End(_) => match stack.pop() {
                Some(element) => attach(&mut stack, &mut root, Node::Element(element), lenient)?,
                None if lenient => continue,
                None => return Err(VastError::MalformedXml("unexpected end tag".into())),
            },
            Event::Text(ref e) => {
                let text = match e.unescape() {
                    Ok(text) => text,
                    Err(_) if lenient => Cow::Owned(String::from_utf8_lossy(e).into_owned()),
                    Err(e) => return Err(VastError::XmlParseError(e)),
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Event::CData(ref e) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::CData(String::from_utf8_lossy(e).into_owned()));
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if !stack.is_empty() {
        if !lenient {
            return Err(VastError::MalformedXml("unclosed elements at end of input".into()));
        }
        while let Some(element) = stack.pop() {
            attach(&mut stack, &mut root, Node::Element(element), lenient)?;
        }
    }

    root.ok_or_else(|| VastError::MalformedXml("no root element".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    node: Node,
    lenient: bool,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        Node::Element(element) if root.is_none() => *root = Some(element),
        Node::Element(_) if lenient => (),
        Node::Element(_) => {
            return Err(VastError::MalformedXml("multiple root elements".into()));
        }
        _ => (),
    }
    Ok(())
}
