use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the dataset holding the DN of an object.
pub const DN: &str = "dn";

/// Change-set of a modification: attribute name to the complete list of values it should hold.
/// An empty list asks for the attribute to be cleared.
pub type ModificationItems = IndexMap<String, Vec<Value>>;

/// Objects found by a listing, keyed by pivot value, in the order FusionDirectory returned them.
pub type PivotList = IndexMap<String, Datasets>;

/// Named values describing an object. Names are looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Datasets(IndexMap<String, Value>);

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first value of a dataset as a string. Numbers and booleans are stringified.
    pub fn string_value(&self, name: &str) -> Option<String> {
        let value = match self.get(name)? {
            Value::Array(values) => values.first()?,
            value => value,
        };
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The first value of a dataset, ready to be placed in an LDAP filter.
    pub fn value_for_filter(&self, name: &str) -> Option<String> {
        self.string_value(name).map(|value| ldap3::ldap_escape(value).into_owned())
    }
}

impl FromIterator<(String, Value)> for Datasets {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Datasets(iter.into_iter().collect())
    }
}

/// An object as handed to the synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bean {
    pub main_identifier: String,
    pub datasets: Datasets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ChangeId,
    Create,
    Update,
    Delete,
}

/// A change the synchronization engine wants applied to a destination.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Modifications {
    pub operation: Operation,
    #[serde(default)]
    pub main_identifier: String,
    #[serde(default)]
    pub items: ModificationItems,
}
