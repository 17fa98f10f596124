// XML projection of report entities

pub mod rules;

pub use rules::{Rule, ToXml, Xmlfied, legalize_xml};

use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Prefix bound to the namespace of a qualified root element.
pub const NAMESPACE_PREFIX: &str = "ns0";

/// In-memory element tree produced by [`Xmlfied::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    pub tag: String,
    pub namespace: Option<&'static str>,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            namespace: None,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, uri: &'static str) -> Self {
        self.namespace = Some(uri);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn qualified_tag(&self) -> String {
        match self.namespace {
            Some(_) => format!("{}:{}", NAMESPACE_PREFIX, self.tag),
            None => self.tag.clone(),
        }
    }
}

/// Renders a complete, indented UTF-8 document rooted at `root`.
pub fn render_document(root: &XmlNode) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .context("Failed to write XML declaration")?;
    write_node(&mut writer, root)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).context("Rendered XML is not valid UTF-8")
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let name = node.qualified_tag();
    let mut start = BytesStart::new(name.as_str());

    let xmlns;
    if let Some(uri) = node.namespace {
        xmlns = format!("xmlns:{}", NAMESPACE_PREFIX);
        start.push_attribute((xmlns.as_str(), uri));
    }
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let has_text = node.text.as_deref().is_some_and(|t| !t.is_empty());
    if !has_text && node.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .with_context(|| format!("Failed to write <{}/>", name))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .with_context(|| format!("Failed to open <{}>", name))?;

    if let Some(text) = node.text.as_deref().filter(|t| !t.is_empty()) {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .with_context(|| format!("Failed to write text of <{}>", name))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(name.as_str())))
        .with_context(|| format!("Failed to close <{}>", name))?;
    Ok(())
}
