//! API credential resolution.
//!
//! The credential comes from the secret store file first and the environment
//! second. A broken secret store never stops start-up: it is logged and the
//! environment is consulted instead.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants;

/// User-facing guide shown while no credential is configured.
pub const SETUP_INSTRUCTIONS: &str = r#"⚠️ API Key 未配置！

配置方法（选择其一）：

方法 1：使用 Secrets 文件（推荐）
  1. 创建 `.joy/secrets.toml` 文件
  2. 添加以下内容：
     [deepseek]
     api_key = "sk-你的API密钥"

方法 2：使用环境变量
  Linux/Mac:           export DEEPSEEK_API_KEY="sk-你的API密钥"
  Windows PowerShell:  $env:DEEPSEEK_API_KEY="sk-你的API密钥"
  Windows CMD:         set DEEPSEEK_API_KEY=sk-你的API密钥

配置完成后重新运行 `joy start`。

获取 API Key: https://platform.deepseek.com/api_keys"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    SecretStore(PathBuf),
    Environment(String),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::SecretStore(path) => write!(f, "secret store {}", path.display()),
            CredentialSource::Environment(var) => write!(f, "environment variable {}", var),
        }
    }
}

/// An API key together with where it was found. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(secret: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            secret: secret.into(),
            source,
        }
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret store {0} does not exist")]
    NotFound(PathBuf),
    #[error("failed to read secret store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("secret store {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("secret store has no `{0}` entry")]
    MissingKey(String),
    #[error("secret store entry `{0}` is not a non-empty string")]
    InvalidValue(String),
}

impl SecretStoreError {
    /// Absent configuration, as opposed to configuration that is present but broken.
    pub fn is_absent(&self) -> bool {
        matches!(self, SecretStoreError::NotFound(_) | SecretStoreError::MissingKey(_))
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    secrets_file: PathBuf,
    env_var: String,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(constants::DEFAULT_SECRETS_FILE)
    }
}

impl CredentialResolver {
    pub fn new(secrets_file: impl Into<PathBuf>) -> Self {
        Self {
            secrets_file: secrets_file.into(),
            env_var: constants::API_KEY_ENV.to_string(),
        }
    }

    /// Use a different environment variable than `DEEPSEEK_API_KEY`.
    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }

    pub fn resolve(&self) -> Option<Credential> {
        match read_secret_store(&self.secrets_file) {
            Ok(secret) => {
                info!("API credential loaded from {}", self.secrets_file.display());
                return Some(Credential::new(
                    secret,
                    CredentialSource::SecretStore(self.secrets_file.clone()),
                ));
            }
            Err(e) if e.is_absent() => debug!("Secret store lookup skipped: {}", e),
            Err(e) => warn!("Ignoring unusable secret store, falling back to environment: {}", e),
        }

        match std::env::var(&self.env_var) {
            Ok(value) if !value.trim().is_empty() => {
                info!("API credential loaded from environment variable {}", self.env_var);
                Some(Credential::new(
                    value.trim(),
                    CredentialSource::Environment(self.env_var.clone()),
                ))
            }
            _ => {
                warn!("No API credential found in secret store or environment");
                None
            }
        }
    }
}

/// Reads `deepseek.api_key` from a TOML secret store.
pub fn read_secret_store(path: &Path) -> Result<String, SecretStoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SecretStoreError::NotFound(path.to_path_buf())
        } else {
            SecretStoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let table: toml::Table = raw.parse().map_err(|source| SecretStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let key_path = format!("{}.{}", constants::SECRET_GROUP, constants::SECRET_FIELD);
    let group = table
        .get(constants::SECRET_GROUP)
        .ok_or_else(|| SecretStoreError::MissingKey(constants::SECRET_GROUP.to_string()))?
        .as_table()
        .ok_or_else(|| SecretStoreError::InvalidValue(constants::SECRET_GROUP.to_string()))?;
    let value = group
        .get(constants::SECRET_FIELD)
        .ok_or_else(|| SecretStoreError::MissingKey(key_path.clone()))?;

    match value.as_str().map(str::trim) {
        Some(secret) if !secret.is_empty() => Ok(secret.to_string()),
        _ => Err(SecretStoreError::InvalidValue(key_path)),
    }
}
