//! Remote location parsing and credential resolution.
//!
//! The credential callback cascade (SSH-agent, then the git credential
//! helper, then "default") dispatches on a closed [`AuthMethod`] enum instead
//! of always probing every mechanism libgit2 offers.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Error};
use globset::{Glob, GlobMatcher};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// A value that must never show up verbatim in logs or `{:?}` output.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

/// One `Remote` — an opaque URL plus a resolved authentication handle.
/// Immutable after construction.
#[derive(Clone)]
pub struct Remote {
    pub url: Url,
    pub auth: Option<AuthMethod>,
}

/// Closed set of credential providers (design note §9: prefer a tagged
/// variant over runtime interface dispatch — auth providers are few and
/// closed).
#[derive(Clone)]
pub enum AuthMethod {
    Basic { username: String, password: SecretString },
    Ssh { private_key_pem: SecretString },
    Token { token: SecretString },
    AppToken(Arc<AppTokenProvider>),
}

struct CredentialEntry {
    matcher: GlobMatcher,
    method: AuthMethod,
}

/// `resolve(remote_url) -> AuthMethod | none`. The first glob that matches
/// wins; absence of a match yields `None`.
#[derive(Default)]
pub struct CredentialResolver {
    entries: Vec<CredentialEntry>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, glob: &str, method: AuthMethod) -> Result<Self, Error> {
        let matcher = Glob::new(glob)
            .with_context(|| format!("invalid credential glob '{glob}'"))?
            .compile_matcher();
        self.entries.push(CredentialEntry { matcher, method });
        Ok(self)
    }

    pub fn resolve(&self, remote_url: &str) -> Option<AuthMethod> {
        self.entries
            .iter()
            .find(|e| e.matcher.is_match(remote_url))
            .map(|e| e.method.clone())
    }
}

/// GitHub App-style short-lived access token provider.
///
/// Produces an access token by signing a 10-minute JWT (backdated one minute
/// against clock skew, `iss = app_id`) and exchanging it at the hosting
/// service's installations endpoint; caches the result for 55 minutes;
/// refreshes with a write lock while other readers use the read lock
/// (double-checking after acquiring the write lock).
pub struct AppTokenProvider {
    app_id: String,
    installation_id: u64,
    rsa_private_key_pem: SecretString,
    installations_url: Url,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    token: SecretString,
    fetched_at: Instant,
}

const TOKEN_CACHE_TTL: Duration = Duration::from_secs(55 * 60);
const JWT_LIFETIME: Duration = Duration::from_secs(10 * 60);
const JWT_BACKDATE: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

impl AppTokenProvider {
    pub fn new(
        app_id: impl Into<String>,
        installation_id: u64,
        rsa_private_key_pem: SecretString,
        installations_url: Url,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            installation_id,
            rsa_private_key_pem,
            installations_url,
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Returns a valid access token, refreshing it if the cached one is
    /// stale or absent.
    pub async fn token(&self) -> Result<SecretString, Error> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < TOKEN_CACHE_TTL {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut guard = self.cached.write().await;
        // Double-check: another writer may have refreshed while we waited.
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < TOKEN_CACHE_TTL {
                return Ok(cached.token.clone());
            }
        }

        let token = self.fetch_token().await?;
        *guard = Some(CachedToken { token: token.clone(), fetched_at: Instant::now() });
        Ok(token)
    }

    fn sign_jwt(&self) -> Result<String, Error> {
        let now = chrono_now_unix()?;
        let claims = AppClaims {
            iat: now - JWT_BACKDATE.as_secs() as i64,
            exp: now + JWT_LIFETIME.as_secs() as i64,
            iss: self.app_id.clone(),
        };
        let key = EncodingKey::from_rsa_pem(self.rsa_private_key_pem.expose().as_bytes())
            .context("invalid RSA private key PEM")?;
        encode(&Header::new(Algorithm::RS256), &claims, &key).context("failed to sign app JWT")
    }

    async fn fetch_token(&self) -> Result<SecretString, Error> {
        let jwt = self.sign_jwt()?;
        let url = self
            .installations_url
            .join(&format!("installations/{}/access_tokens", self.installation_id))
            .context("failed to build installation token url")?;

        let response = self
            .client
            .post(url)
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("failed to request installation access token")?
            .error_for_status()
            .context("installation token endpoint returned an error status")?;

        let body: InstallationTokenResponse =
            response.json().await.context("failed to parse installation token response")?;

        Ok(SecretString::new(body.token))
    }
}

fn chrono_now_unix() -> Result<i64, Error> {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system clock is before the unix epoch")?;
    Ok(dur.as_secs() as i64)
}

/// Resolves an [`AuthMethod`] into the `git2` credential callback cascade:
/// try the method-specific credential first, then fall back through
/// ssh-agent and the git credential helper exactly as libgit2 itself would
/// request them.
pub async fn git2_credentials(auth: Option<&AuthMethod>) -> Result<ResolvedCredential, Error> {
    match auth {
        None => Ok(ResolvedCredential::None),
        Some(AuthMethod::Basic { username, password }) => {
            Ok(ResolvedCredential::UserPass { username: username.clone(), password: password.expose().to_owned() })
        }
        Some(AuthMethod::Ssh { private_key_pem }) => {
            Ok(ResolvedCredential::SshKey { private_key_pem: private_key_pem.expose().to_owned() })
        }
        Some(AuthMethod::Token { token }) => Ok(ResolvedCredential::UserPass {
            username: "git".to_owned(),
            password: token.expose().to_owned(),
        }),
        Some(AuthMethod::AppToken(provider)) => {
            let token = provider.token().await?;
            Ok(ResolvedCredential::UserPass { username: "git".to_owned(), password: token.expose().to_owned() })
        }
    }
}

/// A credential resolved to the concrete shape `git2::RemoteCallbacks`
/// needs; kept separate from `AuthMethod` so resolving an `AppToken`'s
/// network round-trip happens once per fetch, not once per libgit2 retry.
pub enum ResolvedCredential {
    None,
    UserPass { username: String, password: String },
    SshKey { private_key_pem: String },
}

/// Builds the `git2::RemoteCallbacks` credentials callback for a resolved
/// credential: tries ssh-agent / in-memory key first if ssh is requested,
/// then the resolved user/pass, then
/// `git2::Cred::default()`, bailing out after a single attempt per type so
/// we never loop forever against a libgit2 retry storm.
pub fn remote_callbacks(credential: &ResolvedCredential) -> git2::RemoteCallbacks<'_> {
    let mut callbacks = git2::RemoteCallbacks::new();
    let mut ssh_tried = false;
    let mut userpass_tried = false;

    callbacks.credentials(move |_url, username_from_url, allowed| {
        if allowed.contains(git2::CredentialType::USERNAME) {
            let username = username_from_url.unwrap_or("git");
            return git2::Cred::username(username);
        }

        if allowed.contains(git2::CredentialType::SSH_KEY) && !ssh_tried {
            ssh_tried = true;
            let username = username_from_url.unwrap_or("git");
            if let ResolvedCredential::SshKey { private_key_pem } = credential {
                return git2::Cred::ssh_key_from_memory(username, None, private_key_pem, None);
            }
            return git2::Cred::ssh_key_from_agent(username);
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) && !userpass_tried {
            userpass_tried = true;
            if let ResolvedCredential::UserPass { username, password } = credential {
                return git2::Cred::userpass_plaintext(username, password);
            }
        }

        if allowed.contains(git2::CredentialType::DEFAULT) {
            return git2::Cred::default();
        }

        Err(git2::Error::from_str("no authentication available"))
    });

    callbacks
}

/// Convenience wrapper bundling [`remote_callbacks`] into a `FetchOptions`.
pub fn fetch_options(credential: &ResolvedCredential) -> Result<git2::FetchOptions<'_>, Error> {
    let mut opts = git2::FetchOptions::new();
    opts.remote_callbacks(remote_callbacks(credential));
    Ok(opts)
}

pub fn validate_remote_url(url: &Url) -> Result<(), Error> {
    if url.cannot_be_a_base() {
        bail!("invalid remote url '{url}': cannot-be-a-base URLs are not supported");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_glob_wins() {
        let resolver = CredentialResolver::new()
            .with_entry("https://github.com/acme/*", AuthMethod::Token { token: SecretString::new("acme-token") })
            .unwrap()
            .with_entry("https://github.com/*", AuthMethod::Token { token: SecretString::new("generic-token") })
            .unwrap();

        let resolved = resolver.resolve("https://github.com/acme/widgets").unwrap();
        match resolved {
            AuthMethod::Token { token } => assert_eq!(token.expose(), "acme-token"),
            _ => panic!("expected token auth"),
        }

        let resolved = resolver.resolve("https://github.com/other/widgets").unwrap();
        match resolved {
            AuthMethod::Token { token } => assert_eq!(token.expose(), "generic-token"),
            _ => panic!("expected token auth"),
        }
    }

    #[test]
    fn unmatched_url_yields_none() {
        let resolver = CredentialResolver::new();
        assert!(resolver.resolve("https://example.com/foo").is_none());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = SecretString::new("super-secret-token");
        let debug = format!("{secret:?}");
        assert!(!debug.contains("super-secret-token"));
    }
}
