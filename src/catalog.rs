//! # Meal Catalog Module
//!
//! The catalog is a local cache of the meal names held in the spreadsheet.
//! It is replaced wholesale on every sync, so meal ids are only stable within
//! one catalog generation.

use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StorageResult;

/// A meal in the current catalog generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Meal {
    pub id: i64,
    pub name: String,
    pub synced_at: DateTime<Utc>,
}

/// Owner of the cached meal catalog.
///
/// Implementations must make `replace_all` atomic: a concurrent `list` sees
/// either the previous catalog or the new one, never a mix of the two.
pub trait CatalogStore: Send + Sync {
    /// Replace every meal with the distinct, trimmed, non-empty names from
    /// `names`, in first-occurrence order. Returns the number of meals stored.
    fn replace_all(
        &self,
        names: &[String],
        synced_at: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<usize>> + Send;

    /// All meals ordered by id ascending
    fn list(&self) -> impl Future<Output = StorageResult<Vec<Meal>>> + Send;

    fn get(&self, meal_id: i64) -> impl Future<Output = StorageResult<Option<Meal>>> + Send;

    fn is_empty(&self) -> impl Future<Output = StorageResult<bool>> + Send;
}

/// Trim every name, drop blanks and collapse duplicates, keeping the first
/// occurrence of each name.
pub fn normalize_meal_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}
