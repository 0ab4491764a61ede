//! # In-Memory Storage Module
//!
//! A process-local catalog and selection store with the same contracts as the
//! PostgreSQL backend. Every operation runs inside one critical section, which
//! gives atomic catalog replacement and a race-free uniqueness check.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::catalog::{normalize_meal_names, CatalogStore, Meal};
use crate::errors::{StorageError, StorageResult};
use crate::selection::{SelectOutcome, Selection, SelectionStore, WeeklySelection};
use crate::week::WeekInterval;

#[derive(Debug, Default)]
struct Tables {
    meals: Vec<Meal>,
    next_meal_id: i64,
    selections: Vec<Selection>,
    selection_keys: HashSet<(i64, i64, NaiveDate)>,
    next_selection_id: i64,
}

/// Catalog and selection store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    /// Every stored selection, dangling or not, in insertion order
    pub fn selections(&self) -> StorageResult<Vec<Selection>> {
        Ok(self.tables()?.selections.clone())
    }
}

impl CatalogStore for InMemoryStore {
    async fn replace_all(&self, names: &[String], synced_at: DateTime<Utc>) -> StorageResult<usize> {
        let names = normalize_meal_names(names);
        let mut tables = self.tables()?;

        // Ids keep increasing across generations, as a sequence would
        let first_id = tables.next_meal_id + 1;
        let meals: Vec<Meal> = names
            .into_iter()
            .zip(first_id..)
            .map(|(name, id)| Meal { id, name, synced_at })
            .collect();

        tables.next_meal_id += meals.len() as i64;
        let stored = meals.len();
        tables.meals = meals;

        info!(meals = stored, "Replaced meal catalog");
        Ok(stored)
    }

    async fn list(&self) -> StorageResult<Vec<Meal>> {
        Ok(self.tables()?.meals.clone())
    }

    async fn get(&self, meal_id: i64) -> StorageResult<Option<Meal>> {
        Ok(self.tables()?.meals.iter().find(|meal| meal.id == meal_id).cloned())
    }

    async fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.tables()?.meals.is_empty())
    }
}

impl SelectionStore for InMemoryStore {
    async fn select(&self, user_id: i64, meal_id: i64, date: NaiveDate) -> StorageResult<SelectOutcome> {
        let mut tables = self.tables()?;

        if !tables.selection_keys.insert((user_id, meal_id, date)) {
            info!(user_id, meal_id, %date, "Meal already selected");
            return Ok(SelectOutcome::AlreadySelected);
        }

        tables.next_selection_id += 1;
        let id = tables.next_selection_id;
        tables.selections.push(Selection {
            id,
            user_id,
            meal_id,
            selected_date: date,
            created_at: Utc::now(),
        });

        info!(user_id, meal_id, %date, "Meal selected");
        Ok(SelectOutcome::Selected)
    }

    async fn weekly(&self, user_id: i64, week_start: NaiveDate) -> StorageResult<Vec<WeeklySelection>> {
        let week = WeekInterval::starting(week_start);
        let tables = self.tables()?;

        let mut rows: Vec<(NaiveDate, i64, String)> = tables
            .selections
            .iter()
            .filter(|s| s.user_id == user_id && week.contains(s.selected_date))
            .filter_map(|s| {
                tables
                    .meals
                    .iter()
                    .find(|meal| meal.id == s.meal_id)
                    .map(|meal| (s.selected_date, s.id, meal.name.clone()))
            })
            .collect();
        rows.sort();

        Ok(rows
            .into_iter()
            .map(|(selected_date, _, meal_name)| WeeklySelection {
                meal_name,
                selected_date,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_meal_ids_change_across_generations() {
        let store = InMemoryStore::new();
        let names = vec!["Pasta".to_string(), "Soup".to_string()];

        store.replace_all(&names, Utc::now()).await.unwrap();
        let first = store.list().await.unwrap();
        store.replace_all(&names, Utc::now()).await.unwrap();
        let second = store.list().await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0].name, second[0].name);
        assert_ne!(first[0].id, second[0].id);
        assert!(second[0].id < second[1].id);
    }

    #[tokio::test]
    async fn test_dangling_selection_is_kept_but_not_reported() {
        let store = InMemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        store.replace_all(&["Pasta".to_string()], Utc::now()).await.unwrap();
        let old_id = store.list().await.unwrap()[0].id;
        store.select(7, old_id, day).await.unwrap();

        store.replace_all(&["Pasta".to_string()], Utc::now()).await.unwrap();

        assert_eq!(store.selections().unwrap().len(), 1);
        let week_start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(store.weekly(7, week_start).await.unwrap().is_empty());
    }
}
