use serde::{Deserialize, Serialize};

use crate::credential::{BasicAuth, Credential, CredentialEncoding};
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authentication
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Basic,
    Jwt,
    Superuser,
}

/// Authentication settings.
///
/// Secrets may be given inline (`password`, `token`) or by naming an
/// environment variable (`password_env`, `token_env`). Inline values win.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub encoding: CredentialEncoding,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_env", &self.password_env)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_env", &self.token_env)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl AuthConfig {
    pub fn has_token_source(&self) -> bool {
        self.token.is_some() || self.token_env.is_some()
    }

    /// Build the connection credential, resolving env vars eagerly.
    pub fn to_credential(&self) -> Result<Credential> {
        match self.method {
            AuthMethod::Basic => {
                let basic = self.basic()?.ok_or_else(|| {
                    Error::Config("basic auth requires auth.username".into())
                })?;
                Ok(Credential::Basic(basic))
            }
            AuthMethod::Jwt => {
                let token = self.resolve_token()?;
                let refresher = self.basic()?;
                if token.is_none() && refresher.is_none() {
                    return Err(Error::Config(
                        "jwt auth requires auth.token/token_env or auth.username".into(),
                    ));
                }
                Ok(Credential::Jwt { token, refresher })
            }
            AuthMethod::Superuser => {
                let token = self.resolve_token()?.ok_or_else(|| {
                    Error::Config("superuser auth requires auth.token or auth.token_env".into())
                })?;
                Ok(Credential::Superuser(token))
            }
        }
    }

    fn basic(&self) -> Result<Option<BasicAuth>> {
        let Some(username) = &self.username else {
            return Ok(None);
        };
        let password = match (&self.password, &self.password_env) {
            (Some(p), _) => p.clone(),
            (None, Some(env)) => read_env(env)?,
            (None, None) => String::new(),
        };
        Ok(Some(
            BasicAuth::new(username.clone(), password).with_encoding(self.encoding),
        ))
    }

    fn resolve_token(&self) -> Result<Option<String>> {
        match (&self.token, &self.token_env) {
            (Some(t), _) => Ok(Some(t.clone())),
            (None, Some(env)) => read_env(env).map(Some),
            (None, None) => Ok(None),
        }
    }
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(Error::Config(format!(
            "environment variable '{name}' not set or empty"
        ))),
    }
}
