//! Minimal generic tree over STIX 1.x markup
//!
//! The converter only needs local element names, attributes and text, so
//! namespaces are deliberately discarded here.

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// All descendant nodes (including self) with the given local name.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            child.find_all(name, out);
        }
    }

    /// First descendant with the given local name, depth-first.
    pub fn find_first(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(name))
    }

    /// Trimmed text of the first descendant with the given name, if non-empty.
    pub fn text_of(&self, name: &str) -> Option<String> {
        self.find_first(name).and_then(|node| {
            let text = node.text.trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        })
    }
}

fn local_name(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Parse markup into a generic tree rooted at a synthetic document node.
pub fn parse(payload: &str) -> Result<XmlNode, String> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = vec![XmlNode {
        name: "#document".to_string(),
        ..Default::default()
    }];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let mut node = XmlNode {
                    name: local_name(start.name().as_ref()),
                    ..Default::default()
                };
                for attr in start.attributes().flatten() {
                    let key = local_name(attr.key.as_ref());
                    if let Ok(value) = attr.unescape_value() {
                        node.attrs.push((key, value.into_owned()));
                    }
                }
                stack.push(node);
            }
            Ok(Event::Empty(empty)) => {
                let mut node = XmlNode {
                    name: local_name(empty.name().as_ref()),
                    ..Default::default()
                };
                for attr in empty.attributes().flatten() {
                    let key = local_name(attr.key.as_ref());
                    if let Ok(value) = attr.unescape_value() {
                        node.attrs.push((key, value.into_owned()));
                    }
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(text)) => {
                if let Ok(unescaped) = text.unescape() {
                    if let Some(node) = stack.last_mut() {
                        if !node.text.is_empty() {
                            node.text.push(' ');
                        }
                        node.text.push_str(unescaped.trim());
                    }
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("markup parse error: {e}")),
        }
    }

    // Fold any unclosed elements back into their parents.
    while stack.len() > 1 {
        if let Some(node) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            }
        }
    }
    stack.pop().ok_or_else(|| "empty markup".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_elements_by_local_name() {
        let root = parse(
            r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1">
                 <indicator:Indicator id="example:1"><indicator:Title>t</indicator:Title></indicator:Indicator>
               </stix:STIX_Package>"#,
        )
        .unwrap();

        let mut indicators = Vec::new();
        root.find_all("Indicator", &mut indicators);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].text_of("Title").as_deref(), Some("t"));
        assert_eq!(indicators[0].attrs[0], ("id".to_string(), "example:1".to_string()));
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        assert!(parse("<a></b>").is_err());
    }
}
