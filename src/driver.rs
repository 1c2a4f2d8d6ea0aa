//! # Resync Driver
//!
//! Keeps a consumer in sync across store hiccups by running
//! [`Engine::bootstrap`] and [`Engine::watch`] in a loop:
//!
//! - after a transport failure the watch resumes from the revision of the
//!   last event handed to the consumer
//! - after compaction a fresh snapshot is assembled and handed over before
//!   watching again
//! - failed attempts back off exponentially; a successful bootstrap or a
//!   watch session that delivered events resets the backoff
//!
//! The consumer receives [`SyncUpdate`]s on one channel: a snapshot replaces
//! everything it knew, an event applies on top of the latest snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::domain::{Snapshot, WatchEvent};
use crate::engine::Engine;
use crate::errors::{Error, Result};
use crate::store::Revision;

/// Retry and buffering settings for [`Driver`]
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Cap for exponential growth
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Buffer between the watch loop and the forwarder
    pub channel_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: None,
            channel_capacity: 1024,
        }
    }
}

impl DriverConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self { channel_capacity: config.watch.channel_capacity, ..Default::default() }
    }

    /// Backoff before retry number `attempt`; zero for the first try.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let backoff_ms = self.initial_backoff.as_millis() as f64 * multiplier;
        let capped_ms = backoff_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }
}

/// Update handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Full state; replaces whatever the consumer held
    Snapshot(Snapshot),
    /// Incremental change on top of the latest snapshot
    Event(WatchEvent),
}

/// Outcome of one watch session
struct Session {
    result: Result<()>,
    last_revision: Revision,
    delivered: usize,
    consumer_gone: bool,
}

/// Bootstrap-and-watch loop with backoff
#[derive(Debug, Clone)]
pub struct Driver {
    engine: Arc<Engine>,
    config: DriverConfig,
}

impl Driver {
    pub fn new(engine: Arc<Engine>, config: DriverConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run until `cancel` fires or `sink` is closed.
    ///
    /// Errors other than store failures (which are retried) end the loop, as
    /// does exhausting `max_attempts`.
    pub async fn run(
        &self,
        sink: mpsc::Sender<SyncUpdate>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let severity = self.engine.severity();
        let mut attempt: u32 = 0;
        let mut resume: Option<Revision> = None;

        loop {
            if attempt > 0 {
                if let Some(max_attempts) = self.config.max_attempts {
                    if attempt >= max_attempts {
                        return Err(Error::transport(format!(
                            "giving up after {} consecutive failures",
                            attempt
                        )));
                    }
                }
                let backoff = self.config.backoff_for_attempt(attempt);
                crate::engine_log!(
                    severity,
                    WARN,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    resume_revision = resume,
                    "Retrying synchronization after backoff"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let after = match resume {
                Some(revision) => revision,
                None => {
                    let bootstrapped = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        bootstrapped = self.engine.bootstrap() => bootstrapped,
                    };
                    let snapshot = match bootstrapped {
                        Ok(snapshot) => snapshot,
                        Err(error) => {
                            crate::engine_log!(severity, WARN, error = %error, "Bootstrap failed");
                            attempt += 1;
                            continue;
                        }
                    };
                    attempt = 0;
                    let revision = snapshot.revision;
                    if !deliver(&sink, SyncUpdate::Snapshot(snapshot), &cancel).await {
                        return Ok(());
                    }
                    revision
                }
            };

            let session = self.watch_session(after, &sink, &cancel).await;
            if session.consumer_gone || cancel.is_cancelled() {
                return Ok(());
            }
            if session.delivered > 0 {
                attempt = 0;
            }

            match session.result {
                Ok(()) => return Ok(()),
                Err(Error::Compacted { requested, compact_revision }) => {
                    crate::engine_log!(
                        severity,
                        WARN,
                        requested,
                        compact_revision,
                        "Watch revision compacted, re-bootstrapping"
                    );
                    resume = None;
                }
                Err(error @ Error::Transport { .. }) => {
                    crate::engine_log!(
                        severity,
                        WARN,
                        error = %error,
                        resume_revision = session.last_revision,
                        "Watch interrupted, resuming"
                    );
                    resume = Some(session.last_revision);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn watch_session(
        &self,
        after: Revision,
        sink: &mpsc::Sender<SyncUpdate>,
        cancel: &CancellationToken,
    ) -> Session {
        let (tx, mut rx) = mpsc::channel::<WatchEvent>(self.config.channel_capacity.max(1));
        let watch_cancel = cancel.child_token();

        let forward = async {
            let mut last_revision = after;
            let mut delivered = 0;
            while let Some(event) = rx.recv().await {
                let revision = event.revision;
                if !deliver(sink, SyncUpdate::Event(event), cancel).await {
                    watch_cancel.cancel();
                    return (last_revision, delivered, !cancel.is_cancelled());
                }
                last_revision = revision;
                delivered += 1;
            }
            (last_revision, delivered, false)
        };

        let (result, (last_revision, delivered, consumer_gone)) =
            tokio::join!(self.engine.watch(after, tx, watch_cancel.clone()), forward);
        Session { result, last_revision, delivered, consumer_gone }
    }
}

/// Send `update`, giving up when cancelled or when the consumer is gone.
async fn deliver(
    sink: &mpsc::Sender<SyncUpdate>,
    update: SyncUpdate,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sink.send(update) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = DriverConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(config.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(250));
    }

    #[test]
    fn channel_capacity_follows_engine_config() {
        let mut engine_config = EngineConfig::default();
        engine_config.watch.channel_capacity = 16;
        let config = DriverConfig::from_engine_config(&engine_config);
        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
    }
}
