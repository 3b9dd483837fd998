//! Application wiring: shared state, webhook registration, the background
//! poller, and the HTTP server.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api_server;
use crate::calendar::{CalendarApi, GoogleCalendar};
use crate::config::Config;
use crate::oauth::{GoogleTokens, OAuthFlow, PendingAuthStore};
use crate::reminder::poller;
use crate::state::UserStore;
use crate::telegram::TelegramClient;

// Every outbound call (Telegram, Google) is bounded so one stuck collaborator
// can not stall a poll cycle indefinitely.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles used by the request path and the poller alike.
pub struct AppState {
    pub config: Config,
    pub store: UserStore,
    pub telegram: TelegramClient,
    pub calendar: Box<dyn CalendarApi>,
    pub oauth: Option<OAuthFlow>,
    pub pending: PendingAuthStore,
}

impl AppState {
    /// Return tokens that are safe to use right now, refreshing and
    /// persisting them when the stored ones are about to expire.
    pub async fn fresh_tokens(&self, chat_id: &str, tokens: GoogleTokens) -> Result<GoogleTokens> {
        if !tokens.needs_refresh(Utc::now()) {
            return Ok(tokens);
        }
        let Some(oauth) = &self.oauth else {
            return Ok(tokens);
        };
        if tokens.refresh_token.is_none() {
            return Ok(tokens);
        }
        let refreshed = oauth.refresh(&tokens).await?;
        self.store
            .with_user(chat_id, |user| user.creds = Some(refreshed.clone()))
            .await?;
        Ok(refreshed)
    }
}

pub struct Application {
    state: Arc<AppState>,
}

impl Application {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let oauth = match (
            &config.google_client_id,
            &config.google_client_secret,
            config.redirect_uri(),
        ) {
            (Some(id), Some(secret), Some(redirect)) => Some(OAuthFlow::new(
                http.clone(),
                id.clone(),
                secret.clone(),
                redirect,
            )),
            _ => {
                info!("Google OAuth is not configured; /connect will be unavailable");
                None
            }
        };

        let state = AppState {
            store: UserStore::open(&config.store_path, &config.default_tz),
            telegram: TelegramClient::new(http.clone(), config.telegram_token.clone()),
            calendar: Box::new(GoogleCalendar::new(http)),
            oauth,
            pending: PendingAuthStore::new(),
            config,
        };
        Ok(Self { state: Arc::new(state) })
    }

    pub async fn run(self) -> Result<()> {
        if let Some(base_url) = self.state.config.base_url.clone() {
            if let Err(e) = self.state.telegram.set_webhook(&base_url).await {
                // Not fatal: the webhook may already be registered.
                error!("webhook registration failed: {e:#}");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller_handle = tokio::spawn(poller::run(self.state.clone(), shutdown_rx));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("webhook server listening on http://{addr}");

        axum::serve(listener, api_server::router(self.state.clone()))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
            })
            .await
            .context("server error")?;

        // Let the poller finish its current cycle before exiting.
        let _ = shutdown_tx.send(true);
        let _ = poller_handle.await;
        Ok(())
    }
}
