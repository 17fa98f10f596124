// Shared helpers for integration tests

#![allow(dead_code)]

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One element of a parsed document, flattened in document order.
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub path: Vec<String>,
    pub attributes: HashMap<String, String>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

fn element(start: &BytesStart<'_>, path: &[String]) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .map(|a| {
            let a = a.expect("well-formed attribute");
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                a.unescape_value().expect("valid attribute value").into_owned(),
            )
        })
        .collect();
    Element {
        name,
        path: path.to_vec(),
        attributes,
        text: String::new(),
    }
}

/// Parses `xml` with a strict reader, panicking on malformed input.
pub fn parse(xml: &str) -> Vec<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut elements: Vec<Element> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().expect("well-formed document") {
            Event::Start(start) => {
                let el = element(&start, &path);
                path.push(el.name.clone());
                open.push(elements.len());
                elements.push(el);
            }
            Event::Empty(start) => {
                elements.push(element(&start, &path));
            }
            Event::Text(text) => {
                if let Some(&index) = open.last() {
                    elements[index]
                        .text
                        .push_str(&text.unescape().expect("valid text"));
                }
            }
            Event::End(_) => {
                open.pop();
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    elements
}

pub fn named<'a>(elements: &'a [Element], name: &str) -> Vec<&'a Element> {
    elements.iter().filter(|e| e.name == name).collect()
}

/// Files in `dir` whose names end with `suffix`, sorted.
pub fn files_ending_with(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("readable dir")
        .map(|e| e.expect("dir entry").path())
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(suffix))
        })
        .collect();
    files.sort();
    files
}

/// Parsed suite documents of `dir`.
pub fn suites(dir: &Path) -> Vec<Vec<Element>> {
    files_ending_with(dir, "-testsuite.xml")
        .iter()
        .map(|p| parse(&std::fs::read_to_string(p).expect("readable suite")))
        .collect()
}

/// Text of the `name` child of every `test-case`, in document order.
pub fn case_names(suite: &[Element]) -> Vec<String> {
    suite
        .iter()
        .filter(|e| e.name == "name" && e.path.last().map(String::as_str) == Some("test-case"))
        .map(|e| e.text.clone())
        .collect()
}
