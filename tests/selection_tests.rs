//! # Selection Store Tests
//!
//! One-selection-per-triple enforcement and the weekly read path, exercised
//! against the in-memory store.

use chrono::{NaiveDate, Utc};
use meal_planner::catalog::CatalogStore;
use meal_planner::memory_store::InMemoryStore;
use meal_planner::selection::{SelectOutcome, SelectionStore};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Store with a catalog of the given meals, returning their ids in order
async fn store_with_meals(items: &[&str]) -> (InMemoryStore, Vec<i64>) {
    let store = InMemoryStore::new();
    let names: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    store.replace_all(&names, Utc::now()).await.unwrap();
    let ids = store.list().await.unwrap().iter().map(|m| m.id).collect();
    (store, ids)
}

#[tokio::test]
async fn test_select_twice_is_already_selected() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;
    let day = date(2024, 1, 3);

    assert_eq!(store.select(1, ids[0], day).await.unwrap(), SelectOutcome::Selected);
    assert_eq!(store.select(1, ids[0], day).await.unwrap(), SelectOutcome::AlreadySelected);
    assert_eq!(store.selections().unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_meal_other_day_or_other_user_is_selected() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;

    assert_eq!(store.select(1, ids[0], date(2024, 1, 3)).await.unwrap(), SelectOutcome::Selected);
    assert_eq!(store.select(1, ids[0], date(2024, 1, 4)).await.unwrap(), SelectOutcome::Selected);
    assert_eq!(store.select(2, ids[0], date(2024, 1, 3)).await.unwrap(), SelectOutcome::Selected);
}

#[tokio::test]
async fn test_different_meal_same_day_is_allowed_by_constraint() {
    // Uniqueness covers (user, meal, date), not (user, date)
    let (store, ids) = store_with_meals(&["Pasta", "Soup"]).await;
    let day = date(2024, 1, 3);

    assert_eq!(store.select(1, ids[0], day).await.unwrap(), SelectOutcome::Selected);
    assert_eq!(store.select(1, ids[1], day).await.unwrap(), SelectOutcome::Selected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_selects_yield_exactly_one_selected() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;
    let store = Arc::new(store);
    let meal_id = ids[0];
    let day = date(2024, 1, 3);

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.select(42, meal_id, day).await.unwrap() })
        })
        .collect();

    let mut selected = 0;
    let mut already = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            SelectOutcome::Selected => selected += 1,
            SelectOutcome::AlreadySelected => already += 1,
        }
    }

    assert_eq!(selected, 1);
    assert_eq!(already, 15);
    assert_eq!(store.selections().unwrap().len(), 1);
}

#[tokio::test]
async fn test_weekly_uses_half_open_window() {
    let (store, ids) = store_with_meals(&["Pasta", "Soup", "Salad"]).await;

    store.select(1, ids[0], date(2024, 1, 1)).await.unwrap();
    store.select(1, ids[1], date(2024, 1, 7)).await.unwrap();
    store.select(1, ids[2], date(2024, 1, 8)).await.unwrap();

    let week = store.weekly(1, date(2024, 1, 1)).await.unwrap();

    assert_eq!(week.len(), 2);
    assert_eq!(week[0].meal_name, "Pasta");
    assert_eq!(week[0].selected_date, date(2024, 1, 1));
    assert_eq!(week[1].meal_name, "Soup");
    assert_eq!(week[1].selected_date, date(2024, 1, 7));
}

#[tokio::test]
async fn test_weekly_excludes_days_before_week_start() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;
    store.select(1, ids[0], date(2023, 12, 31)).await.unwrap();

    assert!(store.weekly(1, date(2024, 1, 1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_weekly_is_ordered_by_date() {
    let (store, ids) = store_with_meals(&["Pasta", "Soup", "Salad"]).await;

    store.select(1, ids[0], date(2024, 1, 5)).await.unwrap();
    store.select(1, ids[1], date(2024, 1, 2)).await.unwrap();
    store.select(1, ids[2], date(2024, 1, 4)).await.unwrap();

    let dates: Vec<NaiveDate> = store
        .weekly(1, date(2024, 1, 1))
        .await
        .unwrap()
        .iter()
        .map(|s| s.selected_date)
        .collect();
    assert_eq!(dates, vec![date(2024, 1, 2), date(2024, 1, 4), date(2024, 1, 5)]);
}

#[tokio::test]
async fn test_weekly_is_scoped_to_user() {
    let (store, ids) = store_with_meals(&["Pasta", "Soup"]).await;

    store.select(1, ids[0], date(2024, 1, 2)).await.unwrap();
    store.select(2, ids[1], date(2024, 1, 2)).await.unwrap();

    let week = store.weekly(1, date(2024, 1, 1)).await.unwrap();
    assert_eq!(week.len(), 1);
    assert_eq!(week[0].meal_name, "Pasta");
}

#[tokio::test]
async fn test_select_unknown_meal_succeeds_but_is_not_reported() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;
    let missing = ids[0] + 1000;

    assert_eq!(store.select(1, missing, date(2024, 1, 2)).await.unwrap(), SelectOutcome::Selected);
    assert!(store.weekly(1, date(2024, 1, 1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_selections_dangle_after_resync() {
    let (store, ids) = store_with_meals(&["Pasta"]).await;
    store.select(1, ids[0], date(2024, 1, 2)).await.unwrap();
    assert_eq!(store.weekly(1, date(2024, 1, 1)).await.unwrap().len(), 1);

    // Same name, new generation, new id
    store.replace_all(&["Pasta".to_string()], Utc::now()).await.unwrap();

    assert!(store.weekly(1, date(2024, 1, 1)).await.unwrap().is_empty());
    assert_eq!(store.selections().unwrap()[0].meal_id, ids[0]);
}
