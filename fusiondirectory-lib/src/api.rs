use serde_json::{Map, Value};

use crate::{
    error::{ErrorKind, ServiceError},
    session::Session,
    transport::ApiRequest,
};

const OBJECTS: &str = "objects";

/// A tab of a FusionDirectory object. Inactive tabs hold no data and cannot be read.
#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct Tab {
    /// Identifies the tab in requests, e.g. `mailAccount`.
    pub class: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// New content of a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeUpdate {
    Single(String),
    Multiple(Vec<String>),
}

impl AttributeUpdate {
    fn into_body(self) -> Value {
        match self {
            AttributeUpdate::Single(value) => Value::String(value),
            AttributeUpdate::Multiple(values) => Value::Array(values.into_iter().map(Value::String).collect()),
        }
    }
}

/// Search results: DN to the requested attributes and their values, in the order FusionDirectory sent them.
pub type SearchResult = Map<String, Value>;

/// The FusionDirectory REST endpoints, called within the session of the current worker.
#[derive(Debug)]
pub struct FusionDirectoryApi {
    session: Session,
}

impl FusionDirectoryApi {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check the session of the current worker is still alive, logging in again if needed.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.session.ping().await
    }

    pub async fn search(&self, entity: &str, base: Option<&str>, filter: Option<&str>, attributes: &[&str]) -> Result<SearchResult, ServiceError> {
        let mut request = ApiRequest::get(&[OBJECTS, entity]);
        if let Some(base) = base {
            request = request.with_query("base", base);
        }
        if let Some(filter) = filter {
            request = request.with_query("filter", filter);
        }
        for attribute in attributes.iter() {
            request = request.with_query(&format!("attrs[{attribute}]"), "*");
        }
        tracing::debug!(entity, base, filter, "Search FusionDirectory objects");

        match self.session.execute(request).await?.json::<Value>()? {
            Value::Object(result) => Ok(result),
            other => Err(ServiceError(
                ErrorKind::InvalidPayload,
                format!("Expected search results to be an object, got: {other}"),
            )),
        }
    }

    /// DNs of the objects matching the search.
    pub async fn search_dns(&self, entity: &str, base: Option<&str>, filter: Option<&str>) -> Result<Vec<String>, ServiceError> {
        Ok(self.search(entity, base, filter, &[]).await?.into_iter().map(|(dn, _)| dn).collect())
    }

    /// Values of one attribute of the first object found below `dn`, as strings.
    pub async fn attribute_values(&self, entity: &str, dn: &str, attribute: &str) -> Result<Vec<String>, ServiceError> {
        let result = self.search(entity, Some(dn), None, &[attribute]).await?;
        let Some((_, attributes)) = result.into_iter().next() else {
            return Ok(Vec::new());
        };

        let values = attributes
            .as_object()
            .into_iter()
            .flat_map(|attributes| attributes.values())
            .flat_map(|values| match values {
                Value::Array(values) => values.clone(),
                value => vec![value.clone()],
            })
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        Ok(values)
    }

    pub async fn object_tabs(&self, entity: &str, dn: &str) -> Result<Vec<Tab>, ServiceError> {
        self.session.execute(ApiRequest::get(&[OBJECTS, entity, dn])).await?.json()
    }

    pub async fn tab_values(&self, entity: &str, dn: &str, tab: &str) -> Result<Map<String, Value>, ServiceError> {
        self.session.execute(ApiRequest::get(&[OBJECTS, entity, dn, tab])).await?.json()
    }

    /// Create an object, returning its DN.
    pub async fn create_object(&self, entity: &str, payload: Value) -> Result<String, ServiceError> {
        let response = self.session.execute(ApiRequest::post(&[OBJECTS, entity]).with_body(payload)).await?;
        let dn = response.json::<Value>().ok().and_then(|dn| dn.as_str().map(str::to_string));
        Ok(dn.unwrap_or_else(|| response.body.trim().trim_matches('"').to_string()))
    }

    pub async fn patch_object(&self, entity: &str, dn: &str, attributes: Value) -> Result<(), ServiceError> {
        self.session
            .execute(ApiRequest::patch(&[OBJECTS, entity, dn]).with_body(attributes))
            .await?;
        Ok(())
    }

    pub async fn set_attribute(&self, entity: &str, dn: &str, tab: &str, attribute: &str, update: AttributeUpdate) -> Result<(), ServiceError> {
        self.session
            .execute(ApiRequest::put(&[OBJECTS, entity, dn, tab, attribute]).with_body(update.into_body()))
            .await?;
        Ok(())
    }

    /// Clear an attribute, given as `tab/attribute`.
    pub async fn delete_attribute(&self, entity: &str, dn: &str, tab_attribute: &str) -> Result<(), ServiceError> {
        let mut path = vec![OBJECTS, entity, dn];
        path.extend(tab_attribute.split('/'));
        self.session.execute(ApiRequest::delete(&path)).await?;
        Ok(())
    }

    pub async fn delete_object(&self, entity: &str, dn: &str) -> Result<(), ServiceError> {
        self.session.execute(ApiRequest::delete(&[OBJECTS, entity, dn])).await?;
        Ok(())
    }
}
