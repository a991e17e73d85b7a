use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::value_objects::StorageKey;

/// Environment variables override file values, e.g.
/// `STOREFRONT__REMOTE__MASTER_KEY`.
pub const ENV_PREFIX: &str = "STOREFRONT";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendChoice,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
    /// Descriptor for the realtime document store. Absent or placeholder
    /// values keep the catalog on local storage.
    pub realtime: Option<RealtimeConfig>,
    pub remote: Option<RemoteConfig>,
    pub git: Option<GitConfig>,
}

/// Which backend the repository should use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Realtime when its descriptor is usable, local otherwise.
    #[default]
    Auto,
    Local,
    Remote,
    Git,
    Realtime,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the local snapshot.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub key: StorageKey,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            key: StorageKey::default(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storefront")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

/// JSONBin-style remote document.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub api_url: String,
    pub bin_id: String,
    pub master_key: String,
}

fn default_remote_url() -> String {
    "https://api.jsonbin.io/v3/b".to_string()
}

/// A JSON file in a GitHub repository.
#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_git_url")]
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_git_path")]
    pub path: String,
    /// Public repositories can be read without a token.
    pub token: Option<String>,
    pub branch: Option<String>,
}

fn default_git_url() -> String {
    "https://api.github.com".to_string()
}

fn default_git_path() -> String {
    "products.json".to_string()
}

/// Firestore project holding the product collection.
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    #[serde(default = "default_firestore_url")]
    pub api_url: String,
    /// Missing values read as empty, which counts as a placeholder.
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_firestore_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_collection() -> String {
    "products".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

/// Template values that mean "not configured yet".
const PLACEHOLDER_PREFIXES: [&str; 2] = ["your-", "your_"];
const PLACEHOLDER_WORDS: [&str; 2] = ["changeme", "placeholder"];

/// True when `value` is empty or still holds a template sentinel.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.is_empty()
        || PLACEHOLDER_PREFIXES.iter().any(|p| v.starts_with(p))
        || PLACEHOLDER_WORDS.iter().any(|w| v.contains(w))
        || (v.starts_with('<') && v.ends_with('>'))
}

impl RealtimeConfig {
    /// The descriptor names a real project with a real key.
    pub fn is_usable(&self) -> bool {
        !is_placeholder(&self.project_id) && !is_placeholder(&self.api_key)
    }
}

impl AppConfig {
    /// Load `path` (optional, TOML) and layer `STOREFRONT__*` variables on top.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let cfg: AppConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to parse configuration")?;
        Ok(cfg)
    }

    /// File the local snapshot is written to.
    pub fn snapshot_path(&self) -> PathBuf {
        self.storage
            .dir
            .join(format!("{}.json", self.storage.key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn realtime(project_id: &str, api_key: &str) -> RealtimeConfig {
        RealtimeConfig {
            api_url: default_firestore_url(),
            project_id: project_id.into(),
            api_key: api_key.into(),
            collection: default_collection(),
            poll_interval_secs: 5,
        }
    }

    #[test]
    fn placeholder_values_are_detected() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("your-project-id"));
        assert!(is_placeholder("YOUR_API_KEY"));
        assert!(is_placeholder("<project>"));
        assert!(is_placeholder("changeme"));
        assert!(!is_placeholder("shop-prod-4821"));
    }

    #[test]
    fn realtime_descriptor_usability() {
        assert!(realtime("shop-prod", "AIzaSyD-real").is_usable());
        assert!(!realtime("your-project-id", "AIzaSyD-real").is_usable());
        assert!(!realtime("shop-prod", "").is_usable());
    }

    #[test]
    fn loads_toml_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
backend = "git"

[storage]
dir = "/tmp/shelf"

[git]
owner = "acme"
repo = "catalog"
"#
        )
        .unwrap();

        let cfg = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.backend, BackendChoice::Git);
        assert_eq!(cfg.snapshot_path(), PathBuf::from("/tmp/shelf/catalog-products.json"));
        let git = cfg.git.unwrap();
        assert_eq!(git.path, "products.json");
        assert_eq!(git.api_url, "https://api.github.com");
        assert!(git.token.is_none());
        assert!(cfg.realtime.is_none());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = AppConfig::load("/nonexistent/storefront-test-config").unwrap();
        assert_eq!(cfg.backend, BackendChoice::Auto);
        assert_eq!(cfg.storage.key, StorageKey::default());
    }
}
