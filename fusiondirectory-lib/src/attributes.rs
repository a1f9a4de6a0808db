use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    config::{AttributeSettings, AttributesSettings, TabSettings},
    datasets::ModificationItems,
    error::{ErrorKind, ServiceError},
};

/// Attributes written as `name;option`, e.g. `description;lang-fr`.
static OPTION_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+);(.*)$").expect("option attribute pattern is valid"));

/// What FusionDirectory expects when writing an object: attribute values grouped by the tab they live in.
pub type TabPayload = IndexMap<String, Map<String, Value>>;

/// Split an option attribute into its short name and its option.
pub fn split_option(attribute: &str) -> Option<(&str, &str)> {
    let captures = OPTION_ATTRIBUTE.captures(attribute)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

pub fn is_option_attribute(attribute: &str) -> bool {
    OPTION_ATTRIBUTE.is_match(attribute)
}

/// `description;lang-fr` becomes `description`, other names are returned as is.
pub fn strip_option(attribute: &str) -> &str {
    split_option(attribute).map(|(short_name, _)| short_name).unwrap_or(attribute)
}

/// The array FusionDirectory needs to actually set a password: the hash method, the password twice
/// (as if confirmed in the web form) and two empty fields. A plain value is ignored by FusionDirectory
/// if the object had no password before.
pub fn password_array(password: &Value, hash: &str) -> Value {
    let password = match password {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::Array(vec![
        Value::String(hash.to_string()),
        Value::String(password.clone()),
        Value::String(password),
        Value::String(String::new()),
        Value::String(String::new()),
    ])
}

/// Keep only the values tagged with the given option (case-insensitive), with the tag removed.
pub fn filter_option_values(option: &str, raw: &Value) -> Result<Vec<Value>, ServiceError> {
    let tag = Regex::new(&format!("(?i){};", regex::escape(option)))
        .map_err(|e| ServiceError(ErrorKind::Configuration, format!("Unusable attribute option '{option}': {e}")))?;
    let prefix = format!("{};", option.to_lowercase());

    let candidates: Vec<&str> = match raw {
        Value::String(s) => vec![s.as_str()],
        Value::Array(values) => values.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    Ok(candidates
        .into_iter()
        .filter(|value| value.to_lowercase().starts_with(&prefix))
        .map(|value| Value::String(tag.replace_all(value, "").into_owned()))
        .collect())
}

/// An attribute of a change-set, resolved to the tab it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct TabAttribute<'a> {
    pub tab: &'a str,
    pub attribute: &'a AttributeSettings,
}

impl TabAttribute<'_> {
    pub fn name(&self) -> &str {
        &self.attribute.name
    }

    pub fn option(&self) -> Option<&str> {
        split_option(self.name()).map(|(_, option)| option)
    }

    pub fn is_option(&self) -> bool {
        is_option_attribute(self.name())
    }

    pub fn short_name(&self) -> &str {
        strip_option(self.name())
    }

    /// Path of the attribute below an object, as used to clear it.
    pub fn path(&self) -> String {
        format!("{}/{}", self.tab, self.name())
    }

    /// Merge new values of an option attribute into what the payload already holds for its short name.
    /// Each new value is tagged with the lowercased option.
    fn option_values(&self, current: Option<&Value>, values: &[Value]) -> Result<Value, ServiceError> {
        let option = self.option().unwrap_or_default().to_lowercase();
        let mut merged = match current {
            Some(Value::String(s)) => vec![Value::String(s.clone())],
            Some(Value::Array(values)) => values.clone(),
            _ => Vec::new(),
        };
        for value in values.iter() {
            let Some(value) = value.as_str() else {
                return Err(ServiceError(
                    ErrorKind::UnsupportedValue,
                    format!("{} is not a supported type for attribute {}", json_type(value), self.name()),
                ));
            };
            merged.push(Value::String(format!("{option};{value}")));
        }
        Ok(Value::Array(merged))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Translates between flat attribute names and FusionDirectory tabs, following the configured layout.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMapper<'a> {
    settings: &'a AttributesSettings,
}

impl<'a> AttributeMapper<'a> {
    pub fn new(settings: &'a AttributesSettings) -> Self {
        Self { settings }
    }

    /// Every configured attribute name, in configuration order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.settings
            .tab
            .iter()
            .flat_map(|tab| tab.attribute.iter().map(|attribute| attribute.name.clone()))
            .collect()
    }

    /// Find the tab an attribute is configured in. Attribute names are case-insensitive.
    pub fn resolve(&self, attribute: &str) -> Result<TabAttribute<'a>, ServiceError> {
        self.settings
            .tab
            .iter()
            .flat_map(|tab| {
                tab.attribute.iter().map(move |settings| TabAttribute {
                    tab: tab.name.as_str(),
                    attribute: settings,
                })
            })
            .find(|tab_attribute| tab_attribute.name().eq_ignore_ascii_case(attribute))
            .ok_or_else(|| ServiceError(ErrorKind::UnknownAttribute, format!("Cannot find tab for attribute {attribute}")))
    }

    /// Build the tab-scoped payload to write a change-set.
    ///
    /// Empty value lists of single-valued attributes are left out here, they have to be cleared with
    /// a separate request (see [Self::prepare_attributes_to_delete]).
    pub fn prepare_attributes(&self, items: &ModificationItems) -> Result<TabPayload, ServiceError> {
        let mut payload = TabPayload::new();
        for (name, values) in items.iter() {
            let tab_attribute = self.resolve(name)?;
            if values.is_empty() && !tab_attribute.attribute.multiple && !tab_attribute.is_option() {
                continue;
            }

            let tab = payload.entry(tab_attribute.tab.to_string()).or_default();
            if tab_attribute.is_option() {
                let short_name = tab_attribute.short_name();
                let merged = tab_attribute.option_values(tab.get(short_name), values)?;
                tab.insert(short_name.to_string(), merged);
            } else if tab_attribute.attribute.multiple {
                tab.insert(tab_attribute.name().to_string(), Value::Array(values.clone()));
            } else if let Some(hash) = &tab_attribute.attribute.password_hash {
                tab.insert(tab_attribute.name().to_string(), password_array(&values[0], hash));
            } else {
                tab.insert(tab_attribute.name().to_string(), values[0].clone());
            }
        }
        Ok(payload)
    }

    /// The `tab/attribute` paths of single-valued attributes a change-set wants cleared.
    pub fn prepare_attributes_to_delete(&self, items: &ModificationItems) -> Result<Vec<String>, ServiceError> {
        let mut to_delete = Vec::new();
        for (name, values) in items.iter() {
            let tab_attribute = self.resolve(name)?;
            if values.is_empty() && !tab_attribute.attribute.multiple && !tab_attribute.is_option() {
                to_delete.push(tab_attribute.path());
            }
        }
        Ok(to_delete)
    }

    /// Flatten the values FusionDirectory returned for one tab into `(configured name, value)` pairs.
    ///
    /// Empty strings mean the attribute is unset and are left out. Numbers are turned into strings.
    pub fn extract_tab_values(&self, tab: &TabSettings, raw: &Map<String, Value>) -> Result<Vec<(String, Value)>, ServiceError> {
        let mut results = Vec::new();
        for attribute in tab.attribute.iter() {
            let tab_attribute = TabAttribute {
                tab: tab.name.as_str(),
                attribute,
            };
            let short_name = tab_attribute.short_name();
            let value = raw.get(short_name).filter(|v| !v.is_null()).ok_or_else(|| {
                ServiceError(
                    ErrorKind::Configuration,
                    format!("Attribute {short_name} could not be found in tab {}", tab.name),
                )
            })?;

            match (tab_attribute.option(), value) {
                (Some(option), _) => {
                    results.push((attribute.name.clone(), Value::Array(filter_option_values(option, value)?)));
                }
                (None, Value::String(s)) if s.is_empty() => (),
                (None, Value::Number(n)) => results.push((attribute.name.clone(), Value::String(n.to_string()))),
                (None, other) => results.push((attribute.name.clone(), other.clone())),
            }
        }
        Ok(results)
    }
}
