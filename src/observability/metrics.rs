//! # Metrics Collection
//!
//! Engine counters and gauges recorded through the `metrics` facade. The
//! embedding process chooses and installs the exporter; without one every
//! call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::domain::Snapshot;
use crate::keys::Family;

/// Metrics recorder that tracks engine activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe(&self) {
        describe_counter!("routeplane_bootstraps_total", "Snapshots assembled from a bulk read");
        describe_histogram!(
            "routeplane_bootstrap_duration_seconds",
            "Time spent reading and assembling a snapshot"
        );
        describe_gauge!("routeplane_snapshot_entities", "Entities in the latest snapshot");
        describe_counter!("routeplane_watch_events_total", "Change events delivered");
        describe_counter!("routeplane_records_skipped_total", "Records skipped as unusable");
        describe_counter!("routeplane_watch_stops_total", "Watch sessions ended");
    }

    pub fn record_bootstrap(&self, snapshot: &Snapshot, duration: f64) {
        counter!("routeplane_bootstraps_total").increment(1);
        histogram!("routeplane_bootstrap_duration_seconds").record(duration);

        let sizes = [
            ("host", snapshot.hosts.len()),
            ("listener", snapshot.listeners.len()),
            ("frontend", snapshot.frontends.len()),
            ("backend", snapshot.backends.len()),
        ];
        for (family, size) in sizes {
            let labels = [("family", family.to_string())];
            gauge!("routeplane_snapshot_entities", &labels).set(size as f64);
        }
    }

    pub fn record_watch_event(&self, family: Family, deletion: bool) {
        let action = if deletion { "deleted" } else { "upserted" };
        let labels =
            [("family", family.resource_type().to_string()), ("action", action.to_string())];
        counter!("routeplane_watch_events_total", &labels).increment(1);
    }

    /// `stage` is `snapshot`, `read` or `watch`
    pub fn record_skipped(&self, family: Family, stage: &'static str) {
        let labels = [("family", family.resource_type().to_string()), ("stage", stage.to_string())];
        counter!("routeplane_records_skipped_total", &labels).increment(1);
    }

    pub fn record_watch_stop(&self, reason: &'static str) {
        let labels = [("reason", reason.to_string())];
        counter!("routeplane_watch_stops_total", &labels).increment(1);
    }
}
