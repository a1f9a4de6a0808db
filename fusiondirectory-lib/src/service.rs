use crate::{
    config::{Config, ConnectionConfig, ServiceSettings},
    dao::FusionDirectoryDao,
    datasets::{Bean, DN, Datasets, Modifications, Operation, PivotList},
    error::{ErrorKind, ServiceError},
};

/// What the synchronization engine needs from a place objects are read from.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// All objects, keyed by pivot value.
    async fn get_list_pivots(&self) -> Result<PivotList, ServiceError>;

    /// The object identified by a pivot value and the datasets it was listed with, if it exists.
    async fn get_bean(&self, pivot_value: &str, datasets: &Datasets, from_same_service: bool) -> Result<Option<Bean>, ServiceError>;
}

/// A [Service] objects can also be written to.
#[async_trait::async_trait]
pub trait WritableService: Service {
    /// Apply a change. `Ok(false)` means FusionDirectory could not be reached and the change was not applied.
    async fn apply(&self, modifications: &Modifications) -> Result<bool, ServiceError>;

    /// Names of the attributes this service writes.
    fn write_dataset_ids(&self) -> Vec<String>;
}

async fn list_pivots(dao: &FusionDirectoryDao) -> Result<PivotList, ServiceError> {
    dao.get_list().await.map_err(|e| {
        tracing::error!(error = %e, "Error while getting pivot list");
        ServiceError(ErrorKind::Communication, e.1)
    })
}

fn settings_for(settings: &Option<ServiceSettings>, side: &str) -> Result<ServiceSettings, ServiceError> {
    settings.clone().ok_or_else(|| {
        ServiceError(
            ErrorKind::Configuration,
            format!("No FusionDirectory {side} service configured"),
        )
    })
}

/// FusionDirectory as the origin of a synchronization.
#[derive(Debug)]
pub struct SourceService {
    dao: FusionDirectoryDao,
}

impl SourceService {
    pub fn new(connection: &ConnectionConfig, settings: ServiceSettings) -> Result<Self, ServiceError> {
        Ok(Self {
            dao: FusionDirectoryDao::new(connection, settings)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        Self::new(&config.connection, settings_for(&config.source, "source")?)
    }

    pub fn dao(&self) -> &FusionDirectoryDao {
        &self.dao
    }

    async fn bean_from_same_service(&self, pivot_value: &str, dn: &str) -> Result<Option<Bean>, ServiceError> {
        match self.dao.get_details(dn).await {
            Ok(datasets) => Ok(Some(Bean {
                main_identifier: pivot_value.to_string(),
                datasets,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(dn, "Object not found");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(dn, error = %e, "Error while getting bean");
                Err(e)
            }
        }
    }

    async fn bean_for_clean(&self, pivots: &Datasets) -> Result<Option<Bean>, ServiceError> {
        match self.dao.find_first_by_pivots(pivots, true).await {
            Ok(found) => Ok(found.map(|(main_identifier, datasets)| Bean { main_identifier, datasets })),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(pivot = self.dao.pivot_name(), ?pivots, "Object not found");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(pivot = self.dao.pivot_name(), ?pivots, error = %e, "Error while getting bean");
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for SourceService {
    async fn get_list_pivots(&self) -> Result<PivotList, ServiceError> {
        list_pivots(&self.dao).await
    }

    async fn get_bean(&self, pivot_value: &str, datasets: &Datasets, from_same_service: bool) -> Result<Option<Bean>, ServiceError> {
        tracing::debug!(pivot_value, ?datasets, from_same_service, "Get bean");
        if datasets.is_empty() {
            return Ok(None);
        }
        if from_same_service {
            match datasets.string_value(DN) {
                Some(dn) => self.bean_from_same_service(pivot_value, &dn).await,
                None => Ok(None),
            }
        } else {
            self.bean_for_clean(datasets).await
        }
    }
}

/// FusionDirectory as the target of a synchronization.
#[derive(Debug)]
pub struct DestinationService {
    dao: FusionDirectoryDao,
}

impl DestinationService {
    pub fn new(connection: &ConnectionConfig, settings: ServiceSettings) -> Result<Self, ServiceError> {
        Ok(Self {
            dao: FusionDirectoryDao::new(connection, settings)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        Self::new(&config.connection, settings_for(&config.destination, "destination")?)
    }

    pub fn dao(&self) -> &FusionDirectoryDao {
        &self.dao
    }

    async fn find_bean(&self, lookup_value: &str) -> Result<Option<Bean>, ServiceError> {
        let Some((found_pivot, found)) = self.dao.find_first_by_pivot(lookup_value).await? else {
            return Ok(None);
        };
        let dn = found.string_value(DN).unwrap_or_default();
        let details = self.dao.get_details(&dn).await?;
        Ok(Some(Bean {
            main_identifier: found.string_value(self.dao.pivot_name()).unwrap_or(found_pivot),
            datasets: details,
        }))
    }

    async fn write(&self, modifications: &Modifications) -> Result<(), ServiceError> {
        match modifications.operation {
            Operation::ChangeId => {
                tracing::warn!(
                    main_identifier = %modifications.main_identifier,
                    "Trying to change ID of a FusionDirectory object, impossible operation, ignored."
                );
            }
            Operation::Create => {
                tracing::debug!(items = ?modifications.items, "Creating FusionDirectory object");
                self.dao.create(&modifications.items).await?;
            }
            Operation::Update => {
                tracing::debug!(
                    main_identifier = %modifications.main_identifier,
                    items = ?modifications.items,
                    "Modifying FusionDirectory object"
                );
                self.dao.modify(&modifications.main_identifier, &modifications.items).await?;
            }
            Operation::Delete => {
                tracing::debug!(main_identifier = %modifications.main_identifier, "Deleting FusionDirectory object");
                self.dao.delete(&modifications.main_identifier).await?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for DestinationService {
    async fn get_list_pivots(&self) -> Result<PivotList, ServiceError> {
        list_pivots(&self.dao).await
    }

    async fn get_bean(&self, pivot_value: &str, datasets: &Datasets, from_same_service: bool) -> Result<Option<Bean>, ServiceError> {
        tracing::debug!(pivot_value, ?datasets, from_same_service, "Get bean");
        let Some(lookup_value) = datasets.names().next().and_then(|name| datasets.string_value(name)) else {
            return Ok(None);
        };

        self.find_bean(&lookup_value).await.inspect_err(|e| {
            tracing::error!(pivot = self.dao.pivot_name(), pivot_value, error = %e, "Error while getting bean");
        })
    }
}

#[async_trait::async_trait]
impl WritableService for DestinationService {
    async fn apply(&self, modifications: &Modifications) -> Result<bool, ServiceError> {
        match self.write(modifications).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::Communication => {
                tracing::error!(error = %e, operation = ?modifications.operation, "Could not write to FusionDirectory");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn write_dataset_ids(&self) -> Vec<String> {
        self.dao.attribute_names()
    }
}
