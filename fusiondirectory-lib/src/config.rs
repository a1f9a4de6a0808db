use anyhow::Context;

pub const DEFAULT_DIRECTORY: &str = "default";
pub const DEFAULT_PIVOT: &str = "uid";

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How to reach and authenticate against FusionDirectory.
    pub connection: ConnectionConfig,

    /// Settings used when FusionDirectory is read from.
    pub source: Option<ServiceSettings>,

    /// Settings used when FusionDirectory is written to.
    pub destination: Option<ServiceSettings>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Base address of the REST API, e.g. https://fd.example.org/fusiondirectory/rest.php/v1
    pub url: String,
    pub username: String,
    pub password: String,
    /// Whether to validate the server certificate of the REST API.
    /// Only disable for local development purposes!
    #[serde(default)]
    pub insecure_disable_tls_verification: bool,
    /// Timeout applied to every single HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Log in again once a session token is older than this, without waiting for a 401.
    #[serde(default)]
    pub token_validity_secs: Option<u64>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure_disable_tls_verification", &self.insecure_disable_tls_verification)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token_validity_secs", &self.token_validity_secs)
            .finish()
    }
}

/// Which FusionDirectory objects a service works on and how their attributes are laid out in tabs.
#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    /// FusionDirectory object type, e.g. `user` or `ogroup`.
    pub entity: String,
    /// Login directory, `default` when unset.
    #[serde(default)]
    pub directory: Option<String>,
    /// Attribute identifying objects across both sides of a synchronization, `uid` when unset.
    #[serde(default)]
    pub pivot: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    /// Filter used when listing all objects, falls back to `filter`.
    #[serde(default)]
    pub all_filter: Option<String>,
    /// Filter template used to find one object by its pivots, e.g. `(uid={uid})`.
    #[serde(default)]
    pub one_filter: Option<String>,
    /// Filter template used to check whether a destination object still exists in the source.
    #[serde(default)]
    pub clean_filter: Option<String>,
    /// FusionDirectory template applied on object creation.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub attributes: AttributesSettings,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct AttributesSettings {
    #[serde(default)]
    pub tab: Vec<TabSettings>,
}

#[derive(serde::Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TabSettings {
    /// The class of the tab as reported by FusionDirectory, e.g. `user` or `mailAccount`.
    pub name: String,
    #[serde(default)]
    pub attribute: Vec<AttributeSettings>,
}

#[derive(serde::Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AttributeSettings {
    /// Attribute name, optionally with an option suffix like `description;lang-fr`.
    pub name: String,
    #[serde(default)]
    pub multiple: bool,
    /// Hash method FusionDirectory should apply, marks the attribute as a password.
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Treat blank values the same as missing ones.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl ServiceSettings {
    pub fn directory(&self) -> &str {
        non_blank(&self.directory).unwrap_or(DEFAULT_DIRECTORY)
    }

    pub fn pivot_name(&self) -> &str {
        non_blank(&self.pivot).unwrap_or(DEFAULT_PIVOT)
    }

    pub fn base(&self) -> Option<&str> {
        non_blank(&self.base)
    }

    pub fn filter(&self) -> Option<&str> {
        non_blank(&self.filter)
    }

    pub fn all_filter(&self) -> Option<&str> {
        non_blank(&self.all_filter)
    }

    pub fn one_filter(&self) -> Option<&str> {
        non_blank(&self.one_filter)
    }

    pub fn clean_filter(&self) -> Option<&str> {
        non_blank(&self.clean_filter)
    }

    pub fn template(&self) -> Option<&str> {
        non_blank(&self.template)
    }

    /// Check the settings for mistakes that would only surface in the middle of a synchronization.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.entity.trim().is_empty() {
            anyhow::bail!("No FusionDirectory entity configured");
        }
        let mut seen: std::collections::HashMap<String, &str> = std::collections::HashMap::new();
        for tab in self.attributes.tab.iter() {
            for attribute in tab.attribute.iter() {
                if let Some(other_tab) = seen.insert(attribute.name.to_lowercase(), tab.name.as_str()) {
                    anyhow::bail!(
                        "Attribute {} is configured in both tab {} and tab {}",
                        attribute.name,
                        other_tab,
                        tab.name
                    );
                }
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn try_from_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config content")?;
        for settings in [&config.source, &config.destination].into_iter().flatten() {
            settings
                .validate()
                .with_context(|| format!("Invalid service settings for entity '{}'", settings.entity))?;
        }
        Ok(config)
    }
}

impl TryFrom<&std::path::Path> for Config {
    type Error = anyhow::Error;

    fn try_from(path: &std::path::Path) -> Result<Self, Self::Error> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::try_from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl TryFrom<std::path::PathBuf> for Config {
    type Error = anyhow::Error;

    fn try_from(path: std::path::PathBuf) -> Result<Self, Self::Error> {
        Self::try_from(path.as_path())
    }
}
