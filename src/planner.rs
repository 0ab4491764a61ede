//! # Meal Planner Module
//!
//! The operations the chat transport needs, expressed against the catalog,
//! selection and meal source contracts. Handlers in `bot` only translate
//! these results into messages.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::catalog::{CatalogStore, Meal};
use crate::dialogue::{validate_meal_name, MealNameError};
use crate::errors::StorageResult;
use crate::meal_source::MealSource;
use crate::selection::{SelectOutcome, SelectionStore, WeeklySelection};
use crate::week::{current_week_start, Clock};

/// Result of picking a meal for today
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodaySelection {
    pub outcome: SelectOutcome,
    pub date: NaiveDate,
    /// The chosen meal, if it is still in the live catalog
    pub meal: Option<Meal>,
}

/// Result of adding a meal to the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddMealOutcome {
    /// Written to the source; selectable after the next sync
    Added(String),
    Forbidden,
    Invalid(MealNameError),
    Failed,
}

pub struct MealPlanner<S, M> {
    store: Arc<S>,
    source: Arc<M>,
    clock: Arc<dyn Clock>,
    admin_user_ids: HashSet<i64>,
}

impl<S, M> MealPlanner<S, M>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    pub fn new(store: Arc<S>, source: Arc<M>, clock: Arc<dyn Clock>, admin_user_ids: HashSet<i64>) -> Self {
        Self {
            store,
            source,
            clock,
            admin_user_ids,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Meals currently on offer
    pub async fn meals(&self) -> StorageResult<Vec<Meal>> {
        self.store.list().await
    }

    /// Record `meal_id` as the user's pick for today
    pub async fn select_today(&self, user_id: i64, meal_id: i64) -> StorageResult<TodaySelection> {
        let date = self.clock.today();
        let outcome = self.store.select(user_id, meal_id, date).await?;

        // The selection is committed; a failed lookup only costs the meal name
        let meal = match self.store.get(meal_id).await {
            Ok(Some(meal)) => Some(meal),
            Ok(None) => {
                warn!(user_id, meal_id, "Selected meal is not in the current catalog");
                None
            }
            Err(e) => {
                warn!(user_id, meal_id, error = %e, "Could not look up selected meal");
                None
            }
        };
        Ok(TodaySelection { outcome, date, meal })
    }

    /// The user's selections for the current week
    pub async fn this_week(&self, user_id: i64) -> StorageResult<Vec<WeeklySelection>> {
        let week_start = current_week_start(self.clock.as_ref());
        self.store.weekly(user_id, week_start).await
    }

    pub fn can_add_meals(&self, user_id: i64) -> bool {
        self.admin_user_ids.is_empty() || self.admin_user_ids.contains(&user_id)
    }

    /// Append a meal to the source. The catalog is not touched.
    pub async fn add_meal(&self, user_id: i64, name: &str) -> AddMealOutcome {
        if !self.can_add_meals(user_id) {
            warn!(user_id, "User is not allowed to add meals");
            return AddMealOutcome::Forbidden;
        }

        let name = match validate_meal_name(name) {
            Ok(name) => name,
            Err(e) => return AddMealOutcome::Invalid(e),
        };

        if self.source.append(&name).await {
            info!(user_id, meal = %name, "Meal added to source");
            AddMealOutcome::Added(name)
        } else {
            AddMealOutcome::Failed
        }
    }
}
