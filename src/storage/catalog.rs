//! Catalogs, resources and the JSON file source configuration

use crate::core::source::{FileSourceConfig, FileSourceGroup};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Property naming the file source group that serves a resource
pub const FILE_SOURCE_ID_KEY: &str = "file-source-id";

/// File source groups of one catalog, by file source id
pub type FileSourceGroups = BTreeMap<String, FileSourceGroup>;

/// Resolves a catalog id to its file source groups
pub type GroupProvider = Arc<dyn Fn(&str) -> Result<FileSourceGroups> + Send + Sync>;

/// One readable quantity of a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Resource {
    /// Create a resource served by `file_source_id`
    pub fn new(id: impl Into<String>, file_source_id: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(FILE_SOURCE_ID_KEY.to_string(), file_source_id.into());
        Self {
            id: id.into(),
            properties,
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Id of the serving file source group, if set
    pub fn file_source_id(&self) -> Option<&str> {
        self.properties.get(FILE_SOURCE_ID_KEY).map(String::as_str)
    }
}

/// A catalog and its resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Catalog {
    /// Empty catalog
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resources: Vec::new(),
        }
    }

    /// Find a resource by id
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Every resource must name a file source group that exists
    pub fn validate(&self, groups: &FileSourceGroups) -> Result<()> {
        for resource in &self.resources {
            let Some(file_source_id) = resource.file_source_id() else {
                return Err(Error::Configuration(format!(
                    "resource '{}' of catalog '{}' has no '{FILE_SOURCE_ID_KEY}' property",
                    resource.id, self.id
                )));
            };
            if !groups.contains_key(file_source_id) {
                return Err(Error::Configuration(format!(
                    "resource '{}' of catalog '{}' refers to unknown file source '{file_source_id}'",
                    resource.id, self.id
                )));
            }
        }
        Ok(())
    }
}

/// File source configuration of all catalogs.
///
/// JSON layout: `{ "<catalog id>": { "<file source id>": [config, ...] } }`.
/// Groups are validated when loaded.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    catalogs: BTreeMap<String, FileSourceGroups>,
}

impl CatalogConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<FileSourceConfig>>> =
            serde_json::from_str(json)?;

        let mut catalogs = BTreeMap::new();
        for (catalog_id, sources) in raw {
            let mut groups = FileSourceGroups::new();
            for (file_source_id, configs) in sources {
                let group = FileSourceGroup::new(file_source_id.clone(), configs).map_err(|e| {
                    Error::Configuration(format!("catalog '{catalog_id}': {e}"))
                })?;
                groups.insert(file_source_id, group);
            }
            catalogs.insert(catalog_id, groups);
        }
        Ok(Self { catalogs })
    }

    /// Load from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!(path = %path.display(), catalogs = config.catalogs.len(), "loaded file source configuration");
        Ok(config)
    }

    /// Add or replace the groups of a catalog
    pub fn insert(&mut self, catalog_id: impl Into<String>, groups: FileSourceGroups) {
        self.catalogs.insert(catalog_id.into(), groups);
    }

    /// All configured catalog ids, sorted
    pub fn catalog_ids(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }

    /// Groups of one catalog
    pub fn groups(&self, catalog_id: &str) -> Result<&FileSourceGroups> {
        self.catalogs.get(catalog_id).ok_or_else(|| {
            Error::InvalidInput(format!("unknown catalog '{catalog_id}'"))
        })
    }

    /// Serialize back to the JSON layout
    pub fn to_json(&self) -> Result<String> {
        let raw: BTreeMap<&str, BTreeMap<&str, &[FileSourceConfig]>> = self
            .catalogs
            .iter()
            .map(|(catalog_id, groups)| {
                let sources = groups
                    .iter()
                    .map(|(id, group)| (id.as_str(), group.configs()))
                    .collect();
                (catalog_id.as_str(), sources)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Turn into a provider closure
    pub fn into_provider(self) -> GroupProvider {
        let config = Arc::new(self);
        Arc::new(move |catalog_id: &str| config.groups(catalog_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CONFIG: &str = r#"{
        "/WEATHER/STATION_A": {
            "main": [
                {
                    "begin": "2020-01-01T00:00:00Z",
                    "path_segment_templates": ["yyyy-MM", "dd"],
                    "file_name_template": "HHmmss.dat",
                    "file_period": "00:10:00"
                },
                {
                    "begin": "2021-01-01T00:00:00Z",
                    "path_segment_templates": ["yyyy", "MM-dd"],
                    "file_name_template": "'station_'HHmm'.dat'",
                    "file_period": "01:00:00"
                }
            ]
        }
    }"#;

    #[test]
    fn test_load_config() {
        let config = CatalogConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.catalog_ids().collect::<Vec<_>>(), vec!["/WEATHER/STATION_A"]);

        let groups = config.groups("/WEATHER/STATION_A").unwrap();
        let main = &groups["main"];
        assert_eq!(main.configs().len(), 2);
        assert_eq!(main.configs()[1].file_period, Duration::hours(1));

        assert!(matches!(config.groups("/OTHER"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_config_fails_at_load() {
        let descending = CONFIG.replace("2021-01-01", "2019-01-01");
        assert!(matches!(
            CatalogConfig::from_json(&descending),
            Err(Error::Configuration(_))
        ));

        let bad_template = CONFIG.replace("HHmmss.dat", "yyyHHmmss.dat");
        assert!(CatalogConfig::from_json(&bad_template).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = CatalogConfig::from_json(CONFIG).unwrap();
        let again = CatalogConfig::from_json(&config.to_json().unwrap()).unwrap();
        let groups = again.groups("/WEATHER/STATION_A").unwrap();
        assert_eq!(groups["main"].configs()[0].file_name_template.source(), "HHmmss.dat");
    }

    #[test]
    fn test_catalog_validation() {
        let config = CatalogConfig::from_json(CONFIG).unwrap();
        let groups = config.groups("/WEATHER/STATION_A").unwrap();

        let mut catalog = Catalog::new("/WEATHER/STATION_A");
        catalog.resources.push(Resource::new("temperature", "main"));
        assert!(catalog.validate(groups).is_ok());

        catalog.resources.push(Resource::new("pressure", "backup"));
        assert!(matches!(catalog.validate(groups), Err(Error::Configuration(_))));

        let orphan = Catalog {
            id: "c".to_string(),
            resources: vec![Resource {
                id: "x".to_string(),
                properties: BTreeMap::new(),
            }],
        };
        assert!(orphan.validate(groups).is_err());
    }

    #[test]
    fn test_provider() {
        let provider = CatalogConfig::from_json(CONFIG).unwrap().into_provider();
        assert!(provider("/WEATHER/STATION_A").unwrap().contains_key("main"));
        assert!(provider("/NOPE").is_err());
    }
}
