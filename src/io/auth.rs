use crate::config::Credentials;
use crate::types::{FetchError, FetchResult};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Default number of completed downloads after which the token is replaced
pub const DEFAULT_REFRESH_INTERVAL: usize = 5;

/// Tokens this close to their reported expiry are treated as expired
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// Credential returned by the identity provider
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, when the provider reports one
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of access tokens
pub trait TokenProvider {
    fn request_token(&self) -> FetchResult<TokenGrant>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Decode an OpenID token endpoint reply
pub fn parse_token_response(body: &str) -> FetchResult<TokenGrant> {
    let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
        FetchError::AuthenticationFailed(format!("could not decode auth data as JSON: {}", e))
    })?;

    match response.access_token {
        Some(access_token) if !access_token.is_empty() => Ok(TokenGrant {
            access_token,
            expires_in: response.expires_in,
        }),
        _ => Err(FetchError::AuthenticationFailed(
            "auth response does not contain an access token".to_string(),
        )),
    }
}

/// Password-grant token exchange against an OpenID Connect endpoint
pub struct PasswordGrantAuth {
    client: reqwest::blocking::Client,
    token_url: String,
    client_id: String,
    credentials: Credentials,
}

impl PasswordGrantAuth {
    pub fn new(token_url: &str, client_id: &str, credentials: Credentials) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            credentials,
        })
    }
}

impl TokenProvider for PasswordGrantAuth {
    fn request_token(&self) -> FetchResult<TokenGrant> {
        log::debug!("Requesting access token from {}", self.token_url);

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .map_err(|e| FetchError::AuthenticationFailed(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            FetchError::AuthenticationFailed(format!("failed to read token response: {}", e))
        })?;

        parse_token_response(&body).map_err(|e| {
            if status.is_success() {
                e
            } else {
                FetchError::AuthenticationFailed(format!("token endpoint returned {}: {}", status, e))
            }
        })
    }
}

/// Convert a reported `expires_in` into a lifetime. Negative or
/// unrepresentable values are ignored and the counter alone drives refresh.
fn token_lifetime(seconds: i64) -> Option<Duration> {
    let lifetime = if seconds >= 0 { Duration::try_seconds(seconds) } else { None };
    if lifetime.is_none() {
        log::warn!("Ignoring unusable token lifetime of {} seconds", seconds);
    }
    lifetime
}

/// The current credential. Only `SessionManager` creates or replaces it.
#[derive(Clone)]
pub struct AuthSession {
    token: String,
    issued_at_counter: usize,
    issued_at: DateTime<Utc>,
    expires_in: Option<Duration>,
}

impl AuthSession {
    pub fn issued_at_counter(&self) -> usize {
        self.issued_at_counter
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// True once the reported lifetime, minus a safety margin, has passed.
    /// Tokens without a reported lifetime never expire here.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let usable = self
            .expires_in
            .and_then(|lifetime| lifetime.checked_sub(&Duration::seconds(EXPIRY_MARGIN_SECS)))
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime));

        match usable {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("issued_at_counter", &self.issued_at_counter)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Owns the authentication session and its refresh cadence.
///
/// The token is replaced whenever the completed-download count reaches a
/// multiple of the refresh interval, and also when the provider-reported
/// lifetime has run out.
pub struct SessionManager<P: TokenProvider> {
    provider: P,
    refresh_interval: usize,
    session: Option<AuthSession>,
    issued_count: usize,
}

impl<P: TokenProvider> SessionManager<P> {
    pub fn new(provider: P, refresh_interval: usize) -> Self {
        Self {
            provider,
            refresh_interval: refresh_interval.max(1),
            session: None,
            issued_count: 0,
        }
    }

    /// Obtain a session if none exists yet and return its token
    pub fn acquire(&mut self) -> FetchResult<&str> {
        if self.session.is_none() {
            self.issue(0)?;
        }
        self.token()
            .ok_or_else(|| FetchError::AuthenticationFailed("no active session".to_string()))
    }

    /// Replace the token if `completed` sits on a refresh boundary or the
    /// current token has expired. Returns whether a new token was issued.
    pub fn refresh_if_due(&mut self, completed: usize) -> FetchResult<bool> {
        if !self.is_due(completed, Utc::now()) {
            return Ok(false);
        }

        log::info!("Refreshing access token after {} completed downloads", completed);
        self.issue(completed)?;
        Ok(true)
    }

    pub fn is_due(&self, completed: usize, now: DateTime<Utc>) -> bool {
        match &self.session {
            None => true,
            Some(session) => {
                let on_boundary = completed > 0
                    && completed % self.refresh_interval == 0
                    && session.issued_at_counter < completed;
                on_boundary || session.is_expired_at(now)
            }
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    /// Number of tokens obtained so far
    pub fn issued_count(&self) -> usize {
        self.issued_count
    }

    pub fn refresh_interval(&self) -> usize {
        self.refresh_interval
    }

    fn issue(&mut self, completed: usize) -> FetchResult<()> {
        let grant = self.provider.request_token()?;
        let expires_in = grant.expires_in.and_then(token_lifetime);

        self.session = Some(AuthSession {
            token: grant.access_token,
            issued_at_counter: completed,
            issued_at: Utc::now(),
            expires_in,
        });
        self.issued_count += 1;

        log::debug!("Issued access token #{} at count {}", self.issued_count, completed);
        Ok(())
    }
}
