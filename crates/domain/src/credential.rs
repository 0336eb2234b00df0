//! Credential data: what a connection authenticates with.
//!
//! Only the data lives here. Deriving headers per request and refreshing
//! tokens is the job of `adb_client::auth::AuthManager`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Character encoding applied to `username:password` before base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

/// Username/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
    pub encoding: CredentialEncoding,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            encoding: CredentialEncoding::Utf8,
        }
    }

    pub fn with_encoding(mut self, encoding: CredentialEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The full `Authorization` header value (`Basic <base64>`).
    pub fn header_value(&self) -> Result<String> {
        let raw = format!("{}:{}", self.username, self.password);
        let bytes = match self.encoding {
            CredentialEncoding::Utf8 => raw.into_bytes(),
            CredentialEncoding::Latin1 => raw
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        Error::InvalidArgument(format!(
                            "credential character {c:?} cannot be encoded as latin-1"
                        ))
                    })
                })
                .collect::<Result<Vec<u8>>>()?,
        };
        Ok(format!("Basic {}", STANDARD.encode(bytes)))
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// The credential a connection is built with. Exactly one kind is active.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Static `Authorization: Basic …` on every request.
    Basic(BasicAuth),
    /// Bearer token, refreshed through `/_open/auth` when `refresher` is set.
    /// Starting without a token makes the first request fetch one.
    Jwt {
        token: Option<String>,
        refresher: Option<BasicAuth>,
    },
    /// Pre-generated superuser token; never refreshed.
    Superuser(String),
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Basic(_) => "basic",
            Credential::Jwt { .. } => "jwt",
            Credential::Superuser(_) => "superuser",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic(auth) => f.debug_tuple("Basic").field(auth).finish(),
            Credential::Jwt { token, refresher } => f
                .debug_struct("Jwt")
                .field("token", &token.as_ref().map(|_| "[REDACTED]"))
                .field("refresher", refresher)
                .finish(),
            Credential::Superuser(_) => f.write_str("Superuser([REDACTED])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_is_base64_of_user_colon_password() {
        let auth = BasicAuth::new("root", "passwd");
        assert_eq!(auth.header_value().unwrap(), "Basic cm9vdDpwYXNzd2Q=");
    }

    #[test]
    fn latin1_encodes_high_codepoints_as_single_bytes() {
        let auth = BasicAuth::new("j\u{f6}rg", "x").with_encoding(CredentialEncoding::Latin1);
        // "j\xf6rg:x"
        assert_eq!(auth.header_value().unwrap(), "Basic avZyZzp4");
    }

    #[test]
    fn latin1_rejects_unencodable_characters() {
        let auth = BasicAuth::new("\u{4e2d}", "x").with_encoding(CredentialEncoding::Latin1);
        assert!(matches!(auth.header_value(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let cred = Credential::Jwt {
            token: Some("tok-123".into()),
            refresher: Some(BasicAuth::new("root", "hunter2")),
        };
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("tok-123"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("root"));
    }
}
