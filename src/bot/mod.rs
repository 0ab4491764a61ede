//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Handles commands and add-meal dialogue input
//! - `callback_handler`: Handles meal keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use crate::catalog::CatalogStore;
use crate::dialogue::{AddMealDialogue, AddMealDialogueState};
use crate::meal_source::MealSource;
use crate::planner::MealPlanner;
use crate::selection::SelectionStore;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

/// Dispatch tree routing messages and callback queries to their handlers.
///
/// The dispatcher must provide an `InMemStorage<AddMealDialogueState>`.
pub fn schema<S, M>(planner: Arc<MealPlanner<S, M>>) -> UpdateHandler<anyhow::Error>
where
    S: CatalogStore + SelectionStore + 'static,
    M: MealSource + 'static,
{
    let message_planner = Arc::clone(&planner);
    let callback_planner = planner;

    dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<AddMealDialogueState>, AddMealDialogueState>()
                .endpoint(move |bot: Bot, msg: Message, dialogue: AddMealDialogue| {
                    let planner = Arc::clone(&message_planner);
                    async move { message_handler(bot, msg, planner, dialogue).await }
                }),
        )
        .branch(
            Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                let planner = Arc::clone(&callback_planner);
                async move { callback_handler(bot, q, planner).await }
            }),
        )
}
