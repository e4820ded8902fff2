pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

const CREDENTIALS_FILE: &str = "credentials.yaml";
const PROJECT_DIR: &str = ".cirrus";
const APP_DIR: &str = "cirrus";

/// Service principal used to talk to Azure Resource Manager
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl AzureCredentials {
    /// Read credentials from the standard AZURE_* variables.
    /// Returns `None` unless all four are set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self {
            tenant_id: var("AZURE_TENANT_ID")?,
            client_id: var("AZURE_CLIENT_ID")?,
            client_secret: var("AZURE_CLIENT_SECRET")?,
            subscription_id: var("AZURE_SUBSCRIPTION_ID")?,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let invalid = |message: String| ConfigError::InvalidCredentials {
            path: path.display().to_string(),
            message,
        };

        let credentials: Self =
            serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        for (key, value) in [
            ("tenant-id", &credentials.tenant_id),
            ("client-id", &credentials.client_id),
            ("client-secret", &credentials.client_secret),
            ("subscription-id", &credentials.subscription_id),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("'{}' is empty", key)));
            }
        }

        Ok(credentials)
    }
}

/// Cirrus の設定ディレクトリ (~/.config/cirrus) を取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(APP_DIR);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// credentials.yaml を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 CIRRUS_CREDENTIALS_PATH (直接パス指定)
/// 2. ./.cirrus/credentials.yaml
/// 3. ~/.config/cirrus/credentials.yaml
pub fn find_credentials_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CIRRUS_CREDENTIALS_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_file = std::env::current_dir()?
        .join(PROJECT_DIR)
        .join(CREDENTIALS_FILE);
    if project_file.exists() {
        return Ok(project_file);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join(APP_DIR).join(CREDENTIALS_FILE);
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::CredentialsNotFound)
}

/// Resolve credentials: environment first, then the first credentials file found
pub fn load_credentials() -> Result<AzureCredentials> {
    if let Some(credentials) = AzureCredentials::from_env() {
        tracing::debug!("Using Azure credentials from environment");
        return Ok(credentials);
    }

    let path = find_credentials_file()?;
    tracing::debug!("Using Azure credentials from {}", path.display());
    AzureCredentials::from_file(&path)
}
