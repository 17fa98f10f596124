// Declarative object-to-XML binding
//
// Every entity lists its fields together with the rule that projects
// them. Fields are emitted sorted by field name inside each group:
// elements first, then nested entities, then sequences. Attributes are
// sorted the same way.

use std::borrow::Cow;

use super::XmlNode;

/// Types that project themselves onto an XML element.
pub trait ToXml {
    fn to_xml(&self) -> XmlNode;
}

/// Projection rule of a single field, already carrying the field value.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Child tag with text content. `None` means the `if_` predicate failed.
    Element(Option<String>),
    /// Attribute on the enclosing tag.
    Attribute(String),
    /// Entity inlined as a child. `None` means the `if_` predicate failed.
    Nested(Option<XmlNode>),
    /// Entities wrapped in one synthetic tag named after the field.
    WrappedMany(Vec<XmlNode>),
    /// Entities emitted directly as children, no wrapper.
    Many(Vec<XmlNode>),
    /// Bookkeeping field, never emitted.
    Ignored,
}

#[derive(Debug, Clone)]
struct Field {
    name: &'static str,
    tag: Option<&'static str>,
    rule: Rule,
}

impl Field {
    fn tag(&self) -> &'static str {
        self.tag.unwrap_or(self.name)
    }
}

/// Builder collecting field rules for one element.
#[derive(Debug, Clone)]
pub struct Xmlfied {
    tag: &'static str,
    namespace: Option<&'static str>,
    fields: Vec<Field>,
}

impl Xmlfied {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            namespace: None,
            fields: Vec::new(),
        }
    }

    /// Qualifies the element with the given namespace URI.
    pub fn namespace(mut self, uri: &'static str) -> Self {
        self.namespace = Some(uri);
        self
    }

    fn push(mut self, name: &'static str, tag: Option<&'static str>, rule: Rule) -> Self {
        self.fields.push(Field { name, tag, rule });
        self
    }

    pub fn element(self, name: &'static str, value: impl ToString) -> Self {
        self.push(name, None, Rule::Element(Some(value.to_string())))
    }

    /// Element kept only when the value is present and non-empty.
    pub fn element_if(self, name: &'static str, value: Option<&str>) -> Self {
        let value = value.filter(|v| !v.is_empty()).map(str::to_string);
        self.push(name, None, Rule::Element(value))
    }

    pub fn element_named_if(
        self,
        name: &'static str,
        tag: &'static str,
        value: Option<&str>,
    ) -> Self {
        let value = value.filter(|v| !v.is_empty()).map(str::to_string);
        self.push(name, Some(tag), Rule::Element(value))
    }

    pub fn attribute(self, name: &'static str, value: impl ToString) -> Self {
        self.push(name, None, Rule::Attribute(value.to_string()))
    }

    pub fn nested_if<T: ToXml>(self, name: &'static str, value: Option<&T>) -> Self {
        self.push(name, None, Rule::Nested(value.map(ToXml::to_xml)))
    }

    pub fn wrapped_many<'a, T: ToXml + 'a>(
        self,
        name: &'static str,
        items: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        let nodes = items.into_iter().map(ToXml::to_xml).collect();
        self.push(name, None, Rule::WrappedMany(nodes))
    }

    pub fn wrapped_many_named<'a, T: ToXml + 'a>(
        self,
        name: &'static str,
        tag: &'static str,
        items: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        let nodes = items.into_iter().map(ToXml::to_xml).collect();
        self.push(name, Some(tag), Rule::WrappedMany(nodes))
    }

    pub fn many<'a, T: ToXml + 'a>(
        self,
        name: &'static str,
        items: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        let nodes = items.into_iter().map(ToXml::to_xml).collect();
        self.push(name, None, Rule::Many(nodes))
    }

    pub fn ignored(self, name: &'static str) -> Self {
        self.push(name, None, Rule::Ignored)
    }

    /// Assembles the element.
    pub fn build(mut self) -> XmlNode {
        self.fields.sort_by_key(|f| f.name);

        let mut node = XmlNode::new(self.tag);
        if let Some(uri) = self.namespace {
            node = node.with_namespace(uri);
        }

        let mut elements = Vec::new();
        let mut nested = Vec::new();
        let mut sequences = Vec::new();

        for field in self.fields {
            let tag = field.tag();
            match field.rule {
                Rule::Element(Some(text)) => {
                    elements.push(XmlNode::new(tag).with_text(legalize_xml(&text)));
                }
                Rule::Attribute(value) => {
                    node.attributes
                        .push((tag.to_string(), legalize_xml(&value).into_owned()));
                }
                Rule::Nested(Some(child)) => nested.push(child),
                Rule::WrappedMany(children) => {
                    let mut wrapper = XmlNode::new(tag);
                    wrapper.children = children;
                    sequences.push(wrapper);
                }
                Rule::Many(children) => sequences.extend(children),
                Rule::Element(None) | Rule::Nested(None) | Rule::Ignored => {}
            }
        }

        node.children.extend(elements);
        node.children.extend(nested);
        node.children.extend(sequences);
        node
    }
}

fn is_legal_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

/// Replaces code points that XML 1.0 forbids with `#xHH` / `#xHHHH`.
pub fn legalize_xml(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_legal_xml_char) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if is_legal_xml_char(c) {
            out.push(c);
        } else if (c as u32) <= 0xFF {
            out.push_str(&format!("#x{:02X}", c as u32));
        } else {
            out.push_str(&format!("#x{:04X}", c as u32));
        }
    }
    Cow::Owned(out)
}
