use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

/// Role claim value treated as authorized for any workspace.
const SUPERADMIN_ROLE: &str = "superadmin";

/// Claims carried in the signed token's payload segment.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "aud")]
    pub audience: String,
    #[serde(default)]
    pub workspaces: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl TokenClaims {
    pub fn is_superadmin(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case(SUPERADMIN_ROLE))
            .unwrap_or(false)
    }
}

/// An opaque signed token plus its decoded claims.
///
/// Immutable once minted; the authority replaces it wholesale on refresh.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    claims: TokenClaims,
}

impl Token {
    /// Decode a JWT-shaped token: three dot-separated base64url segments,
    /// claims in the middle one. The signature is not verified here; the
    /// service is the verifier, we only read routing claims out of it.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let mut segments = raw.split('.');
        let (_header, payload) = match (segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(p), Some(_sig)) => (h, p),
            _ => return Err(TokenError::Malformed),
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&decoded).map_err(|_| TokenError::Malformed)?;

        Ok(Self {
            raw: raw.to_string(),
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Pick the workspace a request should run in.
    ///
    /// A preferred workspace is honored when the token's role is superadmin
    /// or the workspace appears in the claims; otherwise `None` is returned
    /// so the caller can surface a configuration error instead of silently
    /// substituting a default. Without a preference the first listed
    /// workspace wins, falling back to the audience claim.
    pub fn resolve_workspace(&self, preferred: Option<&str>) -> Option<String> {
        match preferred {
            Some(id) => {
                if self.claims.is_superadmin() || self.claims.workspaces.iter().any(|w| w == id) {
                    Some(id.to_string())
                } else {
                    None
                }
            }
            None => self
                .claims
                .workspaces
                .first()
                .cloned()
                .or_else(|| Some(self.claims.audience.clone())),
        }
    }
}

/// Fetches and caches the signed token.
///
/// The cell is guarded by an async mutex so concurrent callers await the
/// same in-flight refresh; at most one token request is ever outstanding.
pub struct TokenAuthority {
    http: Client,
    token_url: Url,
    cell: Mutex<Option<Arc<Token>>>,
}

impl TokenAuthority {
    pub fn new(token_url: Url) -> Result<Self, TokenError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(TokenError::Fetch)?;

        Ok(Self {
            http,
            token_url,
            cell: Mutex::new(None),
        })
    }

    /// Get the current token, fetching one if none is cached.
    pub async fn token(&self) -> Result<Arc<Token>, TokenError> {
        let mut cell = self.cell.lock().await;
        if let Some(token) = cell.as_ref() {
            return Ok(token.clone());
        }

        let token = self.fetch().await?;
        *cell = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token and mint a fresh one.
    pub async fn refresh(&self) -> Result<Arc<Token>, TokenError> {
        let mut cell = self.cell.lock().await;
        let token = self.fetch().await?;
        *cell = Some(token.clone());
        Ok(token)
    }

    async fn fetch(&self) -> Result<Arc<Token>, TokenError> {
        tracing::debug!(url = %self.token_url, "fetching signed token");
        let response = self
            .http
            .get(self.token_url.clone())
            .send()
            .await
            .map_err(TokenError::Fetch)?
            .error_for_status()
            .map_err(TokenError::Fetch)?;

        let raw = response.text().await.map_err(TokenError::Fetch)?;
        let token = Token::parse(raw.trim())?;
        Ok(Arc::new(token))
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("token is not a decodable signed token")]
    Malformed,
}
