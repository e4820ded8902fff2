use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Azure credentials not found. Checked, in order:\n\
        - environment: AZURE_TENANT_ID, AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_SUBSCRIPTION_ID\n\
        - CIRRUS_CREDENTIALS_PATH\n\
        - ./.cirrus/credentials.yaml\n\
        - ~/.config/cirrus/credentials.yaml"
    )]
    CredentialsNotFound,

    #[error("Invalid credentials in {path}: {message}")]
    InvalidCredentials { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
