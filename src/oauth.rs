//! Google OAuth: authorization URL, code exchange, token refresh, and the
//! short-lived registry of pending authorization attempts.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;
use uuid::Uuid;

const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// How long an issued authorization link stays redeemable.
const PENDING_TTL_MINUTES: i64 = 10;

/// Refresh this long before the reported expiry to avoid using a token that
/// dies mid-request.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Stored Google credentials for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GoogleTokens {
    /// Whether the access token should be refreshed before use. Tokens with
    /// an unknown expiry are treated as stale.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECONDS) <= now,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_tokens(self, previous_refresh: Option<&str>, now: DateTime<Utc>) -> GoogleTokens {
        GoogleTokens {
            access_token: self.access_token,
            // Google omits the refresh token on renewals; keep the one we have.
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// The OAuth web flow against Google's endpoints.
pub struct OAuthFlow {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthFlow {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self { http, client_id, client_secret, redirect_uri }
    }

    /// The consent-screen URL the user must visit.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTH_URI,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", CALENDAR_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .context("failed to build authorization URL")?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokens> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = self.request_token(&params).await.context("code exchange failed")?;
        Ok(response.into_tokens(None, Utc::now()))
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(&self, tokens: &GoogleTokens) -> Result<GoogleTokens> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| anyhow!("no refresh token stored"))?;
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.request_token(&params).await.context("token refresh failed")?;
        debug!("refreshed Google access token");
        Ok(response.into_tokens(Some(refresh_token), Utc::now()))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(TOKEN_URI).form(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("token endpoint returned {status}: {body}"));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone)]
struct PendingAuth {
    chat_id: String,
    issued_at: DateTime<Utc>,
}

/// In-flight authorization attempts, keyed by the opaque `state` parameter.
/// Entries expire after ten minutes and are evicted on every access, so an
/// abandoned /connect can not pile up state forever.
#[derive(Default)]
pub struct PendingAuthStore {
    inner: Mutex<HashMap<String, PendingAuth>>,
}

impl PendingAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new attempt for `chat_id` and return its state token.
    pub fn issue(&self, chat_id: &str) -> String {
        self.issue_at(chat_id, Utc::now())
    }

    /// Redeem a state token, returning the chat it belongs to. Expired or
    /// unknown tokens yield `None`.
    pub fn redeem(&self, state: &str) -> Option<String> {
        self.redeem_at(state, Utc::now())
    }

    fn issue_at(&self, chat_id: &str, now: DateTime<Utc>) -> String {
        let state = Uuid::new_v4().to_string();
        let mut pending = self.inner.lock().expect("pending auth lock poisoned");
        Self::evict_expired(&mut pending, now);
        pending.insert(
            state.clone(),
            PendingAuth { chat_id: chat_id.to_string(), issued_at: now },
        );
        state
    }

    fn redeem_at(&self, state: &str, now: DateTime<Utc>) -> Option<String> {
        let mut pending = self.inner.lock().expect("pending auth lock poisoned");
        Self::evict_expired(&mut pending, now);
        pending.remove(state).map(|p| p.chat_id)
    }

    fn evict_expired(pending: &mut HashMap<String, PendingAuth>, now: DateTime<Utc>) {
        let ttl = Duration::minutes(PENDING_TTL_MINUTES);
        pending.retain(|_, p| now - p.issued_at < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn pending_state_round_trips() {
        let store = PendingAuthStore::new();
        let state = store.issue_at("42", at(12, 0));
        assert_eq!(store.redeem_at(&state, at(12, 5)), Some("42".to_string()));
        // One-time use.
        assert_eq!(store.redeem_at(&state, at(12, 5)), None);
    }

    #[test]
    fn pending_state_expires() {
        let store = PendingAuthStore::new();
        let state = store.issue_at("42", at(12, 0));
        assert_eq!(store.redeem_at(&state, at(12, 11)), None);
    }

    #[test]
    fn fresh_tokens_are_not_refreshed() {
        let tokens = GoogleTokens {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(at(13, 0)),
        };
        assert!(!tokens.needs_refresh(at(12, 0)));
        assert!(tokens.needs_refresh(at(12, 59)));
    }

    #[test]
    fn unknown_expiry_counts_as_stale() {
        let tokens =
            GoogleTokens { access_token: "a".into(), refresh_token: None, expires_at: None };
        assert!(tokens.needs_refresh(at(12, 0)));
    }

    #[test]
    fn renewal_keeps_previous_refresh_token() {
        let response =
            TokenResponse { access_token: "new".into(), refresh_token: None, expires_in: Some(3600) };
        let tokens = response.into_tokens(Some("kept"), at(12, 0));
        assert_eq!(tokens.refresh_token.as_deref(), Some("kept"));
        assert_eq!(tokens.expires_at, Some(at(13, 0)));
    }
}
