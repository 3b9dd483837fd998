pub mod api_server;
pub mod app;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod oauth;
pub mod parser;
pub mod reminder;
pub mod state;
pub mod telegram;

use anyhow::Result;

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let app = app::Application::new(config)?;
    app.run().await
}

// Re-export commonly used types
pub use config::Config;
pub use parser::{ParseError, ParsedEvent};
pub use reminder::{ReminderRecord, Threshold};
