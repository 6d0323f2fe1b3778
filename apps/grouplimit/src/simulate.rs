//! Contention simulation against a configured limiter

use crate::error::CliError;
use grouplimit_limiter::Limiter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Highest usage seen for one group during a run
#[derive(Debug, Clone, Serialize)]
pub struct GroupPeak {
    pub name: String,
    pub limit: usize,
    pub peak: usize,
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub workers: usize,
    pub granted: usize,
    pub denied: usize,
    pub peaks: Vec<GroupPeak>,
    pub elapsed_ms: u64,
}

type Peaks = Arc<Mutex<BTreeMap<String, GroupPeak>>>;

fn record_peaks(limiter: &Limiter, peaks: &Peaks) {
    let snapshot = limiter.snapshot();
    let mut peaks = peaks.lock().unwrap_or_else(PoisonError::into_inner);
    for usage in snapshot {
        let entry = peaks.entry(usage.name.clone()).or_insert(GroupPeak {
            name: usage.name,
            limit: usage.limit,
            peak: 0,
        });
        entry.limit = usage.limit;
        entry.peak = entry.peak.max(usage.current);
    }
}

/// Spawn `workers` tasks that each reserve every group in `groups`, hold
/// the reservation for `hold` and release it
///
/// # Errors
///
/// Returns an error if a worker task panics.
pub async fn run(
    limiter: Arc<Limiter>,
    groups: Vec<String>,
    workers: usize,
    hold: Duration,
    wait: Option<Duration>,
) -> Result<SimulationReport, CliError> {
    let started = Instant::now();
    let groups: Arc<[String]> = groups.into();
    let peaks: Peaks = Arc::default();

    info!(workers, ?hold, ?wait, groups = ?groups, "starting simulation");

    let handles = (0..workers).map(|worker| {
        let limiter = Arc::clone(&limiter);
        let groups = Arc::clone(&groups);
        let peaks = Arc::clone(&peaks);
        tokio::spawn(async move {
            let Some(reservation) = Arc::clone(&limiter).acquire_owned(&groups[..], wait).await else {
                debug!(worker, "denied");
                return false;
            };
            record_peaks(&limiter, &peaks);
            debug!(worker, "granted");
            tokio::time::sleep(hold).await;
            reservation.release();
            true
        })
    });

    let mut granted = 0;
    for outcome in futures::future::join_all(handles).await {
        if outcome.map_err(|e| CliError::Worker(e.to_string()))? {
            granted += 1;
        }
    }

    let peaks = peaks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect();

    Ok(SimulationReport {
        workers,
        granted,
        denied: workers - granted,
        peaks,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
