//! Minimal element tree over quick-xml, keeping the source span of every element.

use std::ops::Range;

use indexmap::IndexMap;
use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DeployError, Result};

/// A node inside an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<XmlNode>,
    /// Byte range of the element (start tag through end tag) in the parsed text.
    pub span: Range<usize>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>, position: usize) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| DeployError::ParseXml {
                message: format!("invalid attribute on <{}>: {}", name, e),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DeployError::ParseXml {
                    message: format!("invalid value for attribute '{}' on <{}>: {}", key, name, e),
                })?
                .into_owned();
            attributes.insert(key, value);
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            span: position..position,
        })
    }

    /// Returns the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    /// Direct child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.name == name)
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        fn walk<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
            for child in el.elements() {
                out.push(child);
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Descendant elements with the given name, in document order.
    pub fn descendants_named(&self, name: &str) -> Vec<&XmlElement> {
        self.descendants()
            .into_iter()
            .filter(|el| el.name == name)
            .collect()
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Serializes the element (and its subtree) back to XML text.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_into(out),
                XmlNode::Text(t) => out.push_str(&escape(t.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }
}

/// Parses `text` into its root element.
pub fn parse_document(text: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| DeployError::ParseXml {
            message: format!("{} (near byte {})", e, reader.buffer_position()),
        })?;

        match event {
            Event::Start(start) => {
                if stack.is_empty() && root.is_some() {
                    return Err(junk_after_root(position));
                }
                stack.push(XmlElement::from_start(&start, position)?);
            }
            Event::Empty(start) => {
                let mut element = XmlElement::from_start(&start, position)?;
                element.span.end = reader.buffer_position() as usize;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                let Some(mut element) = stack.pop() else {
                    return Err(DeployError::ParseXml {
                        message: format!("unexpected closing tag (near byte {})", position),
                    });
                };
                element.span.end = reader.buffer_position() as usize;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::Text(t) => {
                let decoded = t.decode().map_err(|e| DeployError::ParseXml {
                    message: format!("{} (near byte {})", e, position),
                })?;
                push_text(&mut stack, &decoded, position)?;
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw), position)?;
            }
            Event::GeneralRef(r) => {
                let resolved = match r.resolve_char_ref() {
                    Ok(Some(ch)) => ch.to_string(),
                    _ => {
                        let name = String::from_utf8_lossy(&r).into_owned();
                        match resolve_predefined_entity(&name) {
                            Some(value) => value.to_string(),
                            None => {
                                return Err(DeployError::ParseXml {
                                    message: format!(
                                        "undefined entity '&{};' (near byte {})",
                                        name, position
                                    ),
                                })
                            }
                        }
                    }
                };
                push_text(&mut stack, &resolved, position)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(DeployError::ParseXml {
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.ok_or_else(|| DeployError::ParseXml {
        message: "no root element found".to_string(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    position: usize,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(junk_after_root(position)),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str, position: usize) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push_text(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(DeployError::ParseXml {
                message: format!("text outside of the root element (near byte {})", position),
            })
        }
    }
    Ok(())
}

fn junk_after_root(position: usize) -> DeployError {
    DeployError::ParseXml {
        message: format!("junk after document element (near byte {})", position),
    }
}
