//! The external, authoritative list of meals.

use std::future::Future;

use crate::errors::FetchError;

/// Capability to read and extend the authoritative meal list
pub trait MealSource: Send + Sync {
    /// All meal names, trimmed, with empty cells removed
    fn fetch(&self) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;

    /// Append `name` at the next free slot. Returns `false` on any remote
    /// failure; the catalog only picks the meal up on the next sync.
    fn append(&self, name: &str) -> impl Future<Output = bool> + Send;
}
