//! Background polling loop.
//!
//! Every cycle queries each connected user's calendar for the next ~70
//! minutes and routes the events through the reminder tracker. One user's
//! failure never affects another's; the next cycle re-evaluates everything,
//! which is the only retry mechanism there is.

use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::tracker;
use crate::app::AppState;
use crate::calendar::EventStart;
use crate::state::UserProfile;

/// Grace period before the first cycle, so startup (webhook registration,
/// server bind) settles first.
const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Events starting up to this far ahead are inspected each cycle; slightly
/// past the largest threshold so its tolerance window is always covered.
const WINDOW_AHEAD_MINUTES: i64 = 70;
/// Look slightly back as well so an event caught mid-minute is not dropped.
const WINDOW_BEHIND_MINUTES: i64 = 1;

/// Run the poller until `shutdown` fires. Cancellation only happens between
/// cycles; a cycle in flight always completes.
pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.config.poll_interval_secs.max(1));
    let mut ticker = interval_at(Instant::now() + STARTUP_DELAY, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("reminder poller started, checking every {}s", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("reminder poller stopped");
                return;
            }
        }
        let started = StdInstant::now();
        poll_cycle(&state).await;
        log::debug!("reminder cycle took {:?}", started.elapsed());
    }
}

async fn poll_cycle(state: &AppState) {
    let users = state.store.snapshot().await.users;
    for (chat_id, profile) in users {
        if profile.creds.is_none() {
            continue;
        }
        if let Err(e) = poll_user(state, &chat_id, &profile).await {
            warn!("reminder check for chat {chat_id} skipped this cycle: {e:#}");
        }
    }
}

async fn poll_user(state: &AppState, chat_id: &str, profile: &UserProfile) -> Result<()> {
    profile
        .tz
        .parse::<Tz>()
        .map_err(|_| anyhow!("unknown timezone {:?}", profile.tz))?;
    let Some(tokens) = profile.creds.clone() else {
        return Ok(());
    };
    let tokens = state.fresh_tokens(chat_id, tokens).await?;

    let now = Utc::now();
    let from = now - ChronoDuration::minutes(WINDOW_BEHIND_MINUTES);
    let to = now + ChronoDuration::minutes(WINDOW_AHEAD_MINUTES);
    let events = state.calendar.list_events(&tokens, from, to).await?;

    // Tracking is pure and runs under the store lock, so the observe/persist
    // pair can never interleave with a foreground update for the same user.
    let notifications = state
        .store
        .with_user_if_changed(chat_id, |user| {
            let mut changed = false;
            let mut notifications = Vec::new();
            let mut visible = BTreeSet::new();

            for event in &events {
                let EventStart::Timed(start) = &event.start else {
                    continue;
                };
                visible.insert(event.id.clone());
                let title = event.summary.clone().unwrap_or_else(|| "Событие".to_string());
                let observation = tracker::observe(
                    &mut user.reminders,
                    &event.id,
                    &title,
                    start.with_timezone(&Utc),
                    now,
                );
                changed |= observation.changed;
                for threshold in observation.due {
                    notifications.push(format!("⏰ Напоминание: {title} {}", threshold.label()));
                }
            }
            changed |= tracker::prune_departed(&mut user.reminders, &visible);

            (notifications, changed)
        })
        .await?;

    for text in notifications {
        state.telegram.send_message(chat_id, &text).await;
    }
    Ok(())
}
