//! Server configuration: static structure in TOML, with secrets substituted
//! from environment variables named by a `env:VAR_NAME` convention, never
//! written to disk.

use serde::Deserialize;
use url::Url;

use crate::remote::{AppTokenProvider, AuthMethod, CredentialResolver, SecretString};

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub owner: String,
    pub name: String,
    pub remote_url: String,
    #[serde(default)]
    pub shallow: bool,
    #[serde(default)]
    pub subtree_root: String,
    #[serde(default)]
    pub extra_filters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialConfig {
    Basic { username: String, password: SecretValue },
    Ssh { private_key_pem: SecretValue },
    Token { token: SecretValue },
    AppToken { app_id: String, installation_id: u64, rsa_private_key_pem: SecretValue, installations_url: String },
}

/// A config-file value that is either inlined (for tests/fixtures) or
/// pulled from an environment variable at load time, so that secrets never
/// need to be committed alongside `ModuleConfig`/`CredentialConfig`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SecretValue {
    Inline(String),
    Env { env: String },
}

impl SecretValue {
    pub fn resolve(&self) -> Result<SecretString, crate::error::RegistryError> {
        match self {
            SecretValue::Inline(value) => Ok(SecretString::new(value.clone())),
            SecretValue::Env { env } => std::env::var(env)
                .map(SecretString::new)
                .map_err(|_| crate::error::RegistryError::internal(format!("missing env var '{env}' for secret"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntryConfig {
    pub url_glob: String,
    #[serde(flatten)]
    pub credential: CredentialConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub listen_addr: String,
    pub own_host: String,
    pub data_dir: String,
    #[serde(default)]
    pub fetch_debounce_secs: Option<u64>,
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<CredentialEntryConfig>,
    pub modules: Vec<ModuleConfig>,
}

impl RegistryConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, crate::error::RegistryError> {
        toml::from_str(contents).map_err(|e| crate::error::RegistryError::internal(format!("invalid config: {e}")))
    }

    /// Builds the [`CredentialResolver`] described by `self.credentials`,
    /// resolving every secret (inline or `env:`) up front so a later
    /// mid-request failure can't surface as a confusing git error.
    pub fn credential_resolver(&self) -> Result<CredentialResolver, crate::error::RegistryError> {
        let mut resolver = CredentialResolver::new();
        for entry in &self.credentials {
            let method = match &entry.credential {
                CredentialConfig::Basic { username, password } => {
                    AuthMethod::Basic { username: username.clone(), password: password.resolve()? }
                }
                CredentialConfig::Ssh { private_key_pem } => {
                    AuthMethod::Ssh { private_key_pem: private_key_pem.resolve()? }
                }
                CredentialConfig::Token { token } => AuthMethod::Token { token: token.resolve()? },
                CredentialConfig::AppToken { app_id, installation_id, rsa_private_key_pem, installations_url } => {
                    let url = Url::parse(installations_url).map_err(|e| {
                        crate::error::RegistryError::internal(format!("invalid installations_url: {e}"))
                    })?;
                    AuthMethod::AppToken(std::sync::Arc::new(AppTokenProvider::new(
                        app_id.clone(),
                        *installation_id,
                        rsa_private_key_pem.resolve()?,
                        url,
                    )))
                }
            };
            resolver = resolver
                .with_entry(&entry.url_glob, method)
                .map_err(|e| crate::error::RegistryError::internal(format!("invalid credential entry: {e:#}")))?;
        }
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
listen_addr = "0.0.0.0:8080"
own_host = "buf.example.com"
data_dir = "/tmp/buf-registry"
bearer_tokens = ["abc123"]

[[modules]]
owner = "e2e"
name = "basic"
remote_url = "https://example.com/e2e/basic.git"
subtree_root = "basic"
"#;
        let config = RegistryConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.modules.len(), 1);
        assert_eq!(config.modules[0].owner, "e2e");
        assert_eq!(config.own_host, "buf.example.com");
    }

    #[test]
    fn inline_secret_resolves_directly() {
        let value = SecretValue::Inline("s3cr3t".to_owned());
        assert_eq!(value.resolve().unwrap().expose(), "s3cr3t");
    }

    #[test]
    fn env_secret_resolves_from_environment() {
        std::env::set_var("BUF_REGISTRY_TEST_SECRET", "from-env");
        let value = SecretValue::Env { env: "BUF_REGISTRY_TEST_SECRET".to_owned() };
        assert_eq!(value.resolve().unwrap().expose(), "from-env");
        std::env::remove_var("BUF_REGISTRY_TEST_SECRET");
    }
}
