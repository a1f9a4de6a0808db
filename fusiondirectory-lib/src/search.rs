use ldap3::ldap_escape;
use regex::{NoExpand, RegexBuilder};

use crate::{
    config::ServiceSettings,
    datasets::Datasets,
    error::{ErrorKind, ServiceError},
};

/// Builds the LDAP filters FusionDirectory searches are made with.
#[derive(Debug, Clone, Copy)]
pub struct FilterBuilder<'a> {
    settings: &'a ServiceSettings,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(settings: &'a ServiceSettings) -> Self {
        Self { settings }
    }

    /// Filter used to list every object of the service.
    pub fn list_filter(&self) -> Option<&'a str> {
        self.settings.all_filter().or(self.settings.filter())
    }

    /// Filter finding the object matching the given pivots.
    ///
    /// With a filter template (`clean_filter` when cleaning, `one_filter` otherwise), every `{name}`
    /// placeholder is replaced by the value of the pivot of that name. Without one, objects whose pivot
    /// attribute equals any of the pivot values are looked for, within the configured filter.
    pub fn pivots_filter(&self, pivots: &Datasets, clean: bool) -> Result<String, ServiceError> {
        let template = if clean {
            self.settings.clean_filter()
        } else {
            self.settings.one_filter()
        };

        match template {
            Some(template) => {
                let mut filter = template.to_string();
                for name in pivots.names() {
                    let placeholder = RegexBuilder::new(&format!(r"\{{{}\}}", regex::escape(name)))
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| ServiceError(ErrorKind::Configuration, format!("Unusable pivot name '{name}': {e}")))?;
                    let value = pivots.value_for_filter(name).unwrap_or_default();
                    filter = placeholder.replace_all(&filter, NoExpand(&value)).into_owned();
                }
                Ok(filter)
            }
            None => {
                let pivot_name = self.settings.pivot_name();
                let alternatives: String = pivots
                    .names()
                    .map(|name| format!("({pivot_name}={})", pivots.value_for_filter(name).unwrap_or_default()))
                    .collect();
                let any_pivot = format!("(|{alternatives})");
                Ok(match self.settings.filter() {
                    Some(filter) => format!("(&{filter}{any_pivot})"),
                    None => any_pivot,
                })
            }
        }
    }

    /// Filter finding the object with the given pivot value.
    pub fn pivot_filter(&self, pivot_value: &str) -> String {
        format!("({}={})", self.settings.pivot_name(), ldap_escape(pivot_value))
    }
}
