//! A small owned element tree over `quick-xml` events.
//!
//! Distribution envelopes and fiscal documents are small and deeply nested
//! under SOAP and signature wrappers, so queries go through a tree keyed by
//! local (namespace-free) names instead of a streaming state machine.

use crate::error::{ProtocolError, ProtocolResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One XML element with its attributes, text and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name, without namespace prefix.
    pub name: String,
    /// Attributes by local name.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content (trimmed).
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parses a complete document and returns its root element.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Self::open(&start)?),
                Ok(Event::Empty(start)) => {
                    let node = Self::open(&start)?;
                    Self::attach(&mut stack, &mut root, node);
                }
                Ok(Event::End(_)) => {
                    if let Some(node) = stack.pop() {
                        Self::attach(&mut stack, &mut root, node);
                    }
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| ProtocolError::Xml(e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ProtocolError::Xml(format!(
                        "at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(ProtocolError::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| ProtocolError::Xml("document has no root element".into()))
    }

    fn open(start: &BytesStart<'_>) -> ProtocolResult<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ProtocolError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ProtocolError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => {
                if root.is_none() {
                    *root = Some(node);
                }
            }
        }
    }

    /// Returns the first direct child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns every direct child named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follows a chain of direct children.
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Depth-first search for the first element named `name`, self included.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Returns the non-empty text of the direct child `name`.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Returns the non-empty text at `names` below this node.
    #[must_use]
    pub fn path_text(&self, names: &[&str]) -> Option<&str> {
        self.path(names)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Returns an attribute value by local name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_tree() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
              <soap:Body>
                <ret xmlns="urn:x" versao="1.01"><cStat>138</cStat><empty/></ret>
              </soap:Body>
            </soap:Envelope>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.name, "Envelope");

        let ret = root.find("ret").unwrap();
        assert_eq!(ret.attr("versao"), Some("1.01"));
        assert_eq!(ret.child_text("cStat"), Some("138"));
        assert!(ret.child("empty").is_some());
        assert_eq!(ret.child_text("empty"), None);
        assert_eq!(root.path_text(&["Body", "ret", "cStat"]), Some("138"));
    }

    #[test]
    fn unescapes_text() {
        let root = XmlNode::parse("<a><b>M &amp; M</b></a>").unwrap();
        assert_eq!(root.child_text("b"), Some("M & M"));
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(XmlNode::parse("<a><b></a>").is_err());
        assert!(XmlNode::parse("<a>").is_err());
        assert!(XmlNode::parse("   ").is_err());
    }
}
