use std::time;

use serde_json::{Map, Value};

use crate::{
    api::FusionDirectoryApi,
    attributes::AttributeMapper,
    config::{ConnectionConfig, ServiceSettings},
    datasets::{DN, Datasets, ModificationItems, PivotList},
    error::{ErrorKind, ServiceError},
    search::FilterBuilder,
    session::{Credentials, Session},
    transport::HttpTransport,
};

/// Reads and writes the objects of one FusionDirectory entity, as laid out by the service settings.
#[derive(Debug)]
pub struct FusionDirectoryDao {
    api: FusionDirectoryApi,
    settings: ServiceSettings,
}

impl FusionDirectoryDao {
    pub fn new(connection: &ConnectionConfig, settings: ServiceSettings) -> Result<Self, ServiceError> {
        let transport = HttpTransport::new(
            &connection.url,
            connection.insecure_disable_tls_verification,
            time::Duration::from_secs(connection.request_timeout_secs),
        )?;
        let credentials = Credentials {
            user: connection.username.clone(),
            password: connection.password.clone(),
            directory: settings.directory().to_string(),
        };
        let session = Session::new(
            transport,
            credentials,
            connection.token_validity_secs.map(time::Duration::from_secs),
        );
        tracing::debug!(entity = %settings.entity, pivot = settings.pivot_name(), "Set up FusionDirectory DAO");

        Ok(Self {
            api: FusionDirectoryApi::new(session),
            settings,
        })
    }

    #[cfg(test)]
    pub(crate) fn api(&self) -> &FusionDirectoryApi {
        &self.api
    }

    pub fn pivot_name(&self) -> &str {
        self.settings.pivot_name()
    }

    fn entity(&self) -> &str {
        &self.settings.entity
    }

    fn mapper(&self) -> AttributeMapper<'_> {
        AttributeMapper::new(&self.settings.attributes)
    }

    fn filters(&self) -> FilterBuilder<'_> {
        FilterBuilder::new(&self.settings)
    }

    /// Every configured attribute name.
    pub fn attribute_names(&self) -> Vec<String> {
        self.mapper().attribute_names()
    }

    /// Keep the session of the current worker alive.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.api.ping().await
    }

    /// All objects of the service, keyed by pivot value.
    pub async fn get_list(&self) -> Result<PivotList, ServiceError> {
        self.get_list_with_filter(self.filters().list_filter()).await
    }

    pub async fn get_list_with_filter(&self, filter: Option<&str>) -> Result<PivotList, ServiceError> {
        let pivot_name = self.pivot_name();
        let result = self.api.search(self.entity(), self.settings.base(), filter, &[pivot_name]).await?;

        let mut resources = PivotList::new();
        for (dn, attributes) in result.into_iter() {
            let Value::Object(attributes) = attributes else {
                tracing::warn!(%dn, "Ignoring search result without attributes");
                continue;
            };
            let pivot = attributes.iter().find_map(|(name, values)| first_string(values).map(|value| (name, value)));
            let Some((name, value)) = pivot else {
                tracing::warn!(%dn, pivot = pivot_name, "Ignoring object without pivot value");
                continue;
            };

            let mut datasets = Datasets::new();
            datasets.insert(DN, dn.as_str());
            datasets.insert(name.as_str(), value.as_str());
            resources.insert(value, datasets);
        }
        tracing::debug!(entity = self.entity(), filter, count = resources.len(), "Listed FusionDirectory objects");
        Ok(resources)
    }

    /// The first object matching the given pivots, see [FilterBuilder::pivots_filter].
    pub async fn find_first_by_pivots(&self, pivots: &Datasets, clean: bool) -> Result<Option<(String, Datasets)>, ServiceError> {
        let filter = self.filters().pivots_filter(pivots, clean)?;
        Ok(self.get_list_with_filter(Some(&filter)).await?.into_iter().next())
    }

    pub async fn find_first_by_pivot(&self, pivot_value: &str) -> Result<Option<(String, Datasets)>, ServiceError> {
        let filter = self.filters().pivot_filter(pivot_value);
        Ok(self.get_list_with_filter(Some(&filter)).await?.into_iter().next())
    }

    /// The DN and every configured attribute of an object.
    ///
    /// Inactive tabs are skipped, FusionDirectory refuses to read them. A configured tab the object does
    /// not have at all is an error.
    pub async fn get_details(&self, dn: &str) -> Result<Datasets, ServiceError> {
        let tabs = self.api.object_tabs(self.entity(), dn).await?;
        let mapper = self.mapper();

        let mut details = Datasets::new();
        details.insert(DN, dn);
        for tab_settings in self.settings.attributes.tab.iter() {
            let Some(tab) = tabs.iter().find(|tab| tab.class == tab_settings.name) else {
                let message = format!("Tab {} does not exist for object {}", tab_settings.name, self.entity());
                tracing::error!(dn, "{}", message);
                return Err(ServiceError(ErrorKind::Configuration, message));
            };
            if !tab.active {
                tracing::debug!(dn, tab = %tab.class, "Skipping inactive tab");
                continue;
            }

            let raw = self.api.tab_values(self.entity(), dn, &tab_settings.name).await?;
            for (name, value) in mapper.extract_tab_values(tab_settings, &raw)? {
                details.insert(name, value);
            }
        }
        Ok(details)
    }

    /// Create an object from a change-set, returning its DN.
    pub async fn create(&self, items: &ModificationItems) -> Result<String, ServiceError> {
        let attributes = self.mapper().prepare_attributes(items)?;
        let mut payload = Map::new();
        payload.insert("attrs".to_string(), serde_json::to_value(&attributes)?);
        if let Some(template) = self.settings.template() {
            payload.insert("template".to_string(), Value::String(template.to_string()));
        }

        let dn = self.api.create_object(self.entity(), Value::Object(payload)).await?;
        tracing::info!(entity = self.entity(), %dn, "Created FusionDirectory object");
        Ok(dn)
    }

    /// Apply a change-set to the object with the given pivot value.
    /// Values are patched first, then the attributes emptied by the change-set are cleared one by one.
    pub async fn modify(&self, main_identifier: &str, items: &ModificationItems) -> Result<(), ServiceError> {
        let dn = self.resolve_dn(main_identifier).await?;
        let mapper = self.mapper();
        let attributes = mapper.prepare_attributes(items)?;
        let to_delete = mapper.prepare_attributes_to_delete(items)?;

        if !attributes.is_empty() {
            self.api
                .patch_object(self.entity(), &dn, serde_json::to_value(&attributes)?)
                .await?;
        }
        for tab_attribute in to_delete.iter() {
            self.api.delete_attribute(self.entity(), &dn, tab_attribute).await?;
        }
        tracing::info!(entity = self.entity(), %dn, cleared = to_delete.len(), "Modified FusionDirectory object");
        Ok(())
    }

    /// Delete the object with the given pivot value.
    pub async fn delete(&self, main_identifier: &str) -> Result<(), ServiceError> {
        let dn = self.resolve_dn(main_identifier).await?;
        tracing::debug!(entity = self.entity(), %dn, "Deleting FusionDirectory object");
        self.api.delete_object(self.entity(), &dn).await
    }

    async fn resolve_dn(&self, main_identifier: &str) -> Result<String, ServiceError> {
        self.find_first_by_pivot(main_identifier)
            .await?
            .and_then(|(_, datasets)| datasets.string_value(DN))
            .ok_or_else(|| ServiceError(ErrorKind::NotFound, format!("Cannot find entity {main_identifier}")))
    }
}

fn first_string(values: &Value) -> Option<String> {
    let value = match values {
        Value::Array(values) => values.first()?,
        value => value,
    };
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
