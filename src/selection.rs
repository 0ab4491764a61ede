//! # Meal Selection Module
//!
//! Per-user, per-date meal selections. Storage enforces uniqueness of the
//! (user, meal, date) triple; a collision is reported as
//! [`SelectOutcome::AlreadySelected`] rather than as an error.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StorageResult;

/// A stored selection. `meal_id` may refer to a meal from an older catalog
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Selection {
    pub id: i64,
    pub user_id: i64,
    pub meal_id: i64,
    pub selected_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Result of a selection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    AlreadySelected,
}

/// One line of a weekly summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklySelection {
    pub meal_name: String,
    pub selected_date: NaiveDate,
}

/// Owner of the selection rows
pub trait SelectionStore: Send + Sync {
    /// Record that `user_id` picked `meal_id` on `date`.
    ///
    /// The meal id is not checked against the live catalog.
    fn select(
        &self,
        user_id: i64,
        meal_id: i64,
        date: NaiveDate,
    ) -> impl Future<Output = StorageResult<SelectOutcome>> + Send;

    /// Selections of `user_id` within the week starting at `week_start`,
    /// joined with the live catalog and ordered by date. Selections whose meal
    /// no longer exists are left out.
    fn weekly(
        &self,
        user_id: i64,
        week_start: NaiveDate,
    ) -> impl Future<Output = StorageResult<Vec<WeeklySelection>>> + Send;
}
