//! # Sync Coordinator Tests
//!
//! Catalog refresh behaviour with scripted meal sources: empty and failing
//! fetches keep the catalog, overlapping triggers are dropped, and the
//! coordinator always returns to idle.

use chrono::{DateTime, NaiveDate, Utc};
use meal_planner::catalog::{CatalogStore, Meal};
use meal_planner::errors::{FetchError, StorageError, StorageResult};
use meal_planner::meal_source::MealSource;
use meal_planner::memory_store::InMemoryStore;
use meal_planner::sync::{SyncCoordinator, SyncOutcome, SyncState};
use meal_planner::week::{Clock, FixedClock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()))
}

/// Source answering each fetch with the next scripted result
struct ScriptedSource {
    results: Mutex<Vec<Result<Vec<String>, FetchError>>>,
}

impl ScriptedSource {
    fn new(mut results: Vec<Result<Vec<String>, FetchError>>) -> Self {
        results.reverse();
        Self {
            results: Mutex::new(results),
        }
    }
}

impl MealSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        self.results
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(FetchError::Malformed("script exhausted".to_string())))
    }

    async fn append(&self, _name: &str) -> bool {
        false
    }
}

/// Source whose fetch blocks until the test releases it
struct GatedSource {
    entered: Notify,
    release: Notify,
    names: Vec<String>,
}

impl MealSource for GatedSource {
    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.names.clone())
    }

    async fn append(&self, _name: &str) -> bool {
        false
    }
}

/// Source that never answers in time
struct StalledSource;

impl MealSource for StalledSource {
    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn append(&self, _name: &str) -> bool {
        false
    }
}

/// In-memory catalog counting replacements
#[derive(Default)]
struct CountingCatalog {
    inner: InMemoryStore,
    replacements: AtomicUsize,
}

impl CountingCatalog {
    fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }
}

impl CatalogStore for CountingCatalog {
    async fn replace_all(&self, names: &[String], synced_at: DateTime<Utc>) -> StorageResult<usize> {
        self.replacements.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(names, synced_at).await
    }

    async fn list(&self) -> StorageResult<Vec<Meal>> {
        self.inner.list().await
    }

    async fn get(&self, meal_id: i64) -> StorageResult<Option<Meal>> {
        self.inner.get(meal_id).await
    }

    async fn is_empty(&self) -> StorageResult<bool> {
        self.inner.is_empty().await
    }
}

/// Catalog whose writes always fail
struct BrokenCatalog;

impl CatalogStore for BrokenCatalog {
    async fn replace_all(&self, _names: &[String], _synced_at: DateTime<Utc>) -> StorageResult<usize> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }

    async fn list(&self) -> StorageResult<Vec<Meal>> {
        Ok(Vec::new())
    }

    async fn get(&self, _meal_id: i64) -> StorageResult<Option<Meal>> {
        Ok(None)
    }

    async fn is_empty(&self) -> StorageResult<bool> {
        Ok(true)
    }
}

async fn catalog_names(catalog: &CountingCatalog) -> Vec<String> {
    catalog
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|meal| meal.name)
        .collect()
}

#[tokio::test]
async fn test_sync_replaces_catalog() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(names(&["Pasta", " Soup ", "", "Pasta"]))]));
    let catalog = Arc::new(CountingCatalog::default());
    let clock = clock();
    let coordinator = SyncCoordinator::new(source, Arc::clone(&catalog), Arc::clone(&clock), FETCH_TIMEOUT);

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Replaced { meals: 2 }));
    assert_eq!(catalog_names(&catalog).await, vec!["Pasta", "Soup"]);
    let meals = catalog.list().await.unwrap();
    assert!(meals.iter().all(|meal| meal.synced_at == clock.now()));
}

#[tokio::test]
async fn test_empty_fetch_keeps_catalog() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(names(&["Pasta", "Soup"])),
        Ok(Vec::new()),
        Ok(names(&["", "   "])),
    ]));
    let catalog = Arc::new(CountingCatalog::default());
    let coordinator = SyncCoordinator::new(source, Arc::clone(&catalog), clock(), FETCH_TIMEOUT);

    coordinator.run().await.unwrap();
    let before = catalog.list().await.unwrap();

    assert!(matches!(coordinator.run().await.unwrap(), SyncOutcome::SkippedEmpty));
    // Whitespace-only cells count as empty
    assert!(matches!(coordinator.run().await.unwrap(), SyncOutcome::SkippedEmpty));

    assert_eq!(catalog.list().await.unwrap(), before);
    assert_eq!(catalog.replacements(), 1);
}

#[tokio::test]
async fn test_fetch_failure_keeps_catalog() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(names(&["Pasta", "Soup"])),
        Err(FetchError::Api {
            status: 503,
            body: "backend unavailable".to_string(),
        }),
    ]));
    let catalog = Arc::new(CountingCatalog::default());
    let coordinator = SyncCoordinator::new(source, Arc::clone(&catalog), clock(), FETCH_TIMEOUT);

    coordinator.run().await.unwrap();
    let before = catalog.list().await.unwrap();

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::FetchFailed(FetchError::Api { status: 503, .. })));
    assert_eq!(catalog.list().await.unwrap(), before);
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_fetch_timeout_keeps_catalog() {
    let catalog = Arc::new(CountingCatalog::default());
    let coordinator = SyncCoordinator::new(
        Arc::new(StalledSource),
        Arc::clone(&catalog),
        clock(),
        Duration::from_millis(50),
    );

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::FetchFailed(FetchError::Timeout(_))));
    assert_eq!(catalog.replacements(), 0);
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_storage_failure_is_reported_and_resets_state() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(names(&["Pasta"]))]));
    let coordinator = SyncCoordinator::new(source, Arc::new(BrokenCatalog), clock(), FETCH_TIMEOUT);

    let result = coordinator.run().await;

    assert!(matches!(result, Err(StorageError::Unavailable(_))));
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_trigger_is_dropped() {
    let source = Arc::new(GatedSource {
        entered: Notify::new(),
        release: Notify::new(),
        names: names(&["Pasta", "Soup"]),
    });
    let catalog = Arc::new(CountingCatalog::default());
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::clone(&source),
        Arc::clone(&catalog),
        clock(),
        FETCH_TIMEOUT,
    ));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run().await })
    };

    // Wait until the first run is inside fetch
    source.entered.notified().await;
    assert_eq!(coordinator.state(), SyncState::Syncing);

    let second = coordinator.run().await.unwrap();
    assert!(matches!(second, SyncOutcome::AlreadyRunning));

    source.release.notify_one();
    let first = first.await.unwrap().unwrap();

    assert!(matches!(first, SyncOutcome::Replaced { meals: 2 }));
    assert_eq!(catalog.replacements(), 1);
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_sequential_runs_each_replace() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(names(&["Pasta"])),
        Ok(names(&["Soup", "Salad"])),
    ]));
    let catalog = Arc::new(CountingCatalog::default());
    let coordinator = SyncCoordinator::new(source, Arc::clone(&catalog), clock(), FETCH_TIMEOUT);

    coordinator.run().await.unwrap();
    coordinator.run().await.unwrap();

    assert_eq!(catalog.replacements(), 2);
    assert_eq!(catalog_names(&catalog).await, vec!["Soup", "Salad"]);
}
