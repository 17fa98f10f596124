// Suite-level report entities

use std::collections::BTreeMap;
use uuid::Uuid;

use super::case::{Label, TestCase};
use super::constants::ALLURE_NAMESPACE;
use crate::xml::{ToXml, XmlNode, Xmlfied};

/// Cases of one source module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuite {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cases: Vec<TestCase>,
    pub labels: Vec<Label>,
    pub start: u64,
    pub stop: Option<u64>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, start: u64) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            cases: Vec::new(),
            labels: Vec::new(),
            start,
            stop: None,
        }
    }

    /// Latest stop timestamp among the cases.
    pub fn last_stop(&self) -> Option<u64> {
        self.cases.iter().filter_map(|c| c.stop).max()
    }
}

impl ToXml for TestSuite {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("test-suite")
            .namespace(ALLURE_NAMESPACE)
            .element("name", &self.name)
            .element_if("title", self.title.as_deref())
            .element_if("description", self.description.as_deref())
            .wrapped_many_named("tests", "test-cases", &self.cases)
            .wrapped_many("labels", &self.labels)
            .attribute("start", self.start)
            .attribute("stop", self.stop.unwrap_or(self.start))
            .build()
    }
}

struct EnvParameter<'a> {
    key: &'a str,
    value: &'a str,
}

impl ToXml for EnvParameter<'_> {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("parameter")
            .element("name", self.key)
            .element("key", self.key)
            .element("value", self.value)
            .build()
    }
}

/// Session-wide key/value parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    parameters: BTreeMap<String, String>,
}

impl Environment {
    pub const NAME: &'static str = "Allure environment parameters";

    pub fn new() -> Self {
        Self::default()
    }

    /// Later values for the same key replace earlier ones.
    pub fn merge<K, V>(&mut self, delta: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in delta {
            self.parameters.insert(key.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl ToXml for Environment {
    fn to_xml(&self) -> XmlNode {
        let parameters: Vec<EnvParameter<'_>> = self
            .iter()
            .map(|(key, value)| EnvParameter { key, value })
            .collect();

        Xmlfied::new("environment")
            .namespace(ALLURE_NAMESPACE)
            .element("id", Uuid::new_v4())
            .element("name", Self::NAME)
            .many("parameters", &parameters)
            .build()
    }
}
