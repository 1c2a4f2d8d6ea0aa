//! Watch loop
//!
//! A watch streams [`WatchEvent`]s for every mutation committed after a
//! given revision until the consumer cancels, the consumer goes away, or the
//! store ends the subscription. There is no reconnect in here: the caller
//! re-bootstraps (after compaction) or resumes from the last revision it
//! applied (after a transport failure).

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::Engine;
use crate::config::VanishedPolicy;
use crate::domain::{ChangeEvent, WatchEvent};
use crate::errors::{Error, Result};
use crate::store::{Mutation, Revision, WatchCancel, WatchResponse};

/// What the loop does after one mutation
enum Step {
    Next,
    Stop(&'static str),
}

/// Deletions already delivered for the revision being processed. A tree
/// delete removing both a bare marker and the entity record yields the same
/// event twice; only the first is delivered.
#[derive(Default)]
struct RevisionDeletes {
    revision: Revision,
    events: Vec<ChangeEvent>,
}

impl RevisionDeletes {
    /// Remember `event` at `revision`; false when it was already seen there.
    fn first_seen(&mut self, revision: Revision, event: &ChangeEvent) -> bool {
        if self.revision != revision {
            self.revision = revision;
            self.events.clear();
        }
        if self.events.contains(event) {
            return false;
        }
        self.events.push(event.clone());
        true
    }
}

impl Engine {
    /// Stream change events for mutations committed after `after_revision`.
    ///
    /// Pass the revision of a [`Snapshot`](crate::domain::Snapshot) (or of
    /// the last applied event) to continue from it without gaps or
    /// duplicates. Returns `Ok(())` when `cancel` fires or `sink` is closed;
    /// compaction and transport failures are returned as errors.
    pub async fn watch(
        &self,
        after_revision: Revision,
        sink: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let prefix = self.layout.root_prefix();
        let span = crate::watch_span!(prefix, after_revision + 1);
        let result = self.run_watch(&prefix, after_revision, &sink, &cancel).instrument(span).await;
        if let Err(error) = &result {
            let reason = match error {
                Error::Compacted { .. } => "compacted",
                _ => "error",
            };
            self.metrics.record_watch_stop(reason);
            crate::engine_log!(self.severity, WARN, error = %error, "Watch stopped");
        }
        result
    }

    async fn run_watch(
        &self,
        prefix: &str,
        after_revision: Revision,
        sink: &mpsc::Sender<WatchEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.stopped("cancelled"),
            stream = self.store.subscribe(prefix, after_revision + 1) => stream?,
        };
        crate::engine_log!(self.severity, INFO, "Watch started");

        // Highest revision whose mutations were all handled
        let mut floor = after_revision;
        let mut deletes = RevisionDeletes::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.stopped("cancelled"),
                next = stream.next() => next,
            };
            let WatchResponse { mutations, canceled } = match next {
                Some(response) => response?,
                None => return Err(Error::transport("watch stream ended by the store")),
            };

            let mut high = floor;
            for mutation in &mutations {
                if cancel.is_cancelled() {
                    return self.stopped("cancelled");
                }
                if mutation.revision <= floor {
                    crate::engine_log!(
                        self.severity,
                        DEBUG,
                        mutation = %mutation,
                        floor,
                        "Dropping replayed mutation"
                    );
                    continue;
                }
                high = high.max(mutation.revision);
                if let Step::Stop(reason) = self.handle_mutation(mutation, &mut deletes, sink, cancel).await? {
                    return self.stopped(reason);
                }
            }
            floor = high;

            match canceled {
                None => {}
                Some(WatchCancel::Compacted { compact_revision }) => {
                    return Err(Error::Compacted { requested: floor + 1, compact_revision });
                }
                Some(WatchCancel::Server { reason }) => {
                    return Err(Error::transport(format!(
                        "watch canceled by the store: {}",
                        reason
                    )));
                }
            }
        }
    }

    async fn handle_mutation(
        &self,
        mutation: &Mutation,
        deletes: &mut RevisionDeletes,
        sink: &mpsc::Sender<WatchEvent>,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        let classified = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Stop("cancelled")),
            classified = self.classify(mutation) => classified,
        };

        let event = match classified {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(Step::Next),
            Err(error) if error.is_not_found() => match self.vanished(mutation, &error)? {
                Some(event) => event,
                None => return Ok(Step::Next),
            },
            // a failed re-read ends the session; resuming from the last
            // delivered revision replays this mutation
            Err(error) if error.is_fatal_for_watch() => return Err(error),
            Err(error) => {
                self.skip_mutation(mutation, &error);
                return Ok(Step::Next);
            }
        };

        let family = event.family();
        let deletion = event.is_deletion();
        if deletion && !deletes.first_seen(mutation.revision, &event) {
            crate::engine_log!(
                self.severity,
                DEBUG,
                mutation = %mutation,
                "Dropping repeated deletion within one revision"
            );
            return Ok(Step::Next);
        }
        crate::engine_log!(
            self.severity,
            DEBUG,
            revision = mutation.revision,
            event = %event,
            "Delivering change event"
        );
        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Stop("cancelled")),
            sent = sink.send(WatchEvent { revision: mutation.revision, event }) => sent,
        };
        if delivered.is_err() {
            return Ok(Step::Stop("consumer_gone"));
        }
        self.metrics.record_watch_event(family, deletion);
        Ok(Step::Next)
    }

    /// A put whose entity was gone when re-read.
    fn vanished(&self, mutation: &Mutation, error: &Error) -> Result<Option<ChangeEvent>> {
        let Some(matched) = self.layout.match_key(&mutation.key) else {
            return Ok(None);
        };
        match self.vanished_policy {
            VanishedPolicy::Skip => {
                crate::engine_log!(
                    self.severity,
                    WARN,
                    mutation = %mutation,
                    error = %error,
                    "Entity vanished before it could be read, dropping event"
                );
                self.metrics.record_skipped(matched.family, "watch");
                Ok(None)
            }
            VanishedPolicy::TreatAsDelete => {
                crate::engine_log!(
                    self.severity,
                    DEBUG,
                    mutation = %mutation,
                    "Entity vanished before it could be read, reporting deletion"
                );
                self.deleted_event(&matched).map(Some)
            }
        }
    }

    fn skip_mutation(&self, mutation: &Mutation, error: &Error) {
        crate::engine_log!(
            self.severity,
            WARN,
            mutation = %mutation,
            error = %error,
            "Skipping mutation that failed to classify"
        );
        if let Some(matched) = self.layout.match_key(&mutation.key) {
            self.metrics.record_skipped(matched.family, "watch");
        }
    }

    fn stopped(&self, reason: &'static str) -> Result<()> {
        self.metrics.record_watch_stop(reason);
        crate::engine_log!(self.severity, INFO, reason, "Watch stopped");
        Ok(())
    }
}
