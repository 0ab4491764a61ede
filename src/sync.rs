//! # Catalog Sync Module
//!
//! Refreshes the meal catalog from the [`MealSource`]. A sync runs once at
//! startup and then daily at a fixed wall-clock time. Overlapping triggers
//! are dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::{normalize_meal_names, CatalogStore};
use crate::errors::{FetchError, StorageError};
use crate::meal_source::MealSource;
use crate::week::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

/// What a single sync run did
#[derive(Debug)]
pub enum SyncOutcome {
    /// The catalog now holds `meals` meals
    Replaced { meals: usize },
    /// The source returned no usable names; the catalog was left as it was
    SkippedEmpty,
    /// The source could not be read; the catalog was left as it was
    FetchFailed(FetchError),
    /// Another run was in progress
    AlreadyRunning,
}

/// Resets the coordinator to `Idle` on every exit path, unwinding included
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncCoordinator<S, C> {
    source: Arc<S>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    syncing: AtomicBool,
}

impl<S: MealSource, C: CatalogStore> SyncCoordinator<S, C> {
    pub fn new(
        source: Arc<S>,
        catalog: Arc<C>,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            catalog,
            clock,
            fetch_timeout,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    fn try_begin(&self) -> Option<SyncingGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncingGuard(&self.syncing))
    }

    /// Pull the meal list from the source and replace the catalog with it.
    ///
    /// Fetch failures and empty results leave the catalog untouched and are
    /// reported through the outcome; only a storage failure is an error.
    pub async fn run(&self) -> Result<SyncOutcome, StorageError> {
        let Some(_guard) = self.try_begin() else {
            info!("Meal sync already in progress, skipping trigger");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        info!("Syncing meals from source...");
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(Ok(names)) => names,
            Ok(Err(e)) => {
                error!(error = %e, "Error fetching meals, catalog left unchanged");
                return Ok(SyncOutcome::FetchFailed(e));
            }
            Err(_) => {
                let secs = self.fetch_timeout.as_secs();
                error!(timeout_secs = secs, "Meal fetch timed out, catalog left unchanged");
                return Ok(SyncOutcome::FetchFailed(FetchError::Timeout(secs)));
            }
        };

        let names = normalize_meal_names(&fetched);
        if names.is_empty() {
            warn!("No meals fetched from source, keeping current catalog");
            return Ok(SyncOutcome::SkippedEmpty);
        }

        let meals = self
            .catalog
            .replace_all(&names, self.clock.now())
            .await
            .inspect_err(|e| error!(error = %e, "Error replacing meal catalog"))?;

        info!(meals, "Successfully synced meals");
        Ok(SyncOutcome::Replaced { meals })
    }
}

/// Next instant strictly after `now` whose wall-clock time in `now`'s
/// timezone is `at`. An `at` that falls into a DST gap fires once the gap is
/// over.
pub fn next_occurrence<Z: TimeZone>(now: &DateTime<Z>, at: NaiveTime) -> DateTime<Z> {
    let tz = now.timezone();
    let mut day = now.date_naive();

    // Two days always suffice; the loop bound only guards odd timezone data
    for _ in 0..3 {
        let local = day.and_time(at);
        let candidate = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest());

        if let Some(candidate) = candidate {
            if candidate > *now {
                return candidate;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    now.clone() + chrono::Duration::days(1)
}

/// Time from `now` until the next occurrence of wall-clock `at`
pub fn duration_until_next<Z: TimeZone>(now: &DateTime<Z>, at: NaiveTime) -> Duration {
    (next_occurrence(now, at) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Where to look for the run after the one aimed at `target`. Never earlier
/// than a second past `target`, so a wake-up slightly before the wall clock
/// reaches `target` cannot schedule the same occurrence twice.
pub fn resume_after<Z: TimeZone>(target: &DateTime<Z>, now: &DateTime<Z>) -> DateTime<Z> {
    let floor = target.clone() + chrono::Duration::seconds(1);
    if *now > floor {
        now.clone()
    } else {
        floor
    }
}

/// Run the sync every day at `at` in timezone `tz`
pub fn spawn_daily<S, C>(coordinator: Arc<SyncCoordinator<S, C>>, tz: Tz, at: NaiveTime) -> JoinHandle<()>
where
    S: MealSource + 'static,
    C: CatalogStore + 'static,
{
    info!(time = %at, timezone = %tz, "Scheduled daily meal sync");
    tokio::spawn(async move {
        let mut from = Utc::now().with_timezone(&tz);
        loop {
            let target = next_occurrence(&from, at);
            let delay = (target - Utc::now().with_timezone(&tz))
                .to_std()
                .unwrap_or(Duration::ZERO);
            info!(next_run = %target, next_run_in_secs = delay.as_secs(), "Waiting for next meal sync");
            tokio::time::sleep(delay).await;

            match coordinator.run().await {
                Ok(outcome) => info!(outcome = ?outcome, "Daily meal sync finished"),
                Err(e) => error!(error = %e, "Daily meal sync failed"),
            }

            from = resume_after(&target, &Utc::now().with_timezone(&tz));
        }
    })
}
