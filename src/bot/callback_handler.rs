//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::catalog::CatalogStore;
use crate::meal_source::MealSource;
use crate::planner::MealPlanner;
use crate::selection::{SelectOutcome, SelectionStore};

// Import UI builder functions
use super::ui_builder::parse_meal_callback;

/// Handle callback queries from the meal keyboard
pub async fn callback_handler<S, M>(
    bot: Bot,
    q: teloxide::types::CallbackQuery,
    planner: Arc<MealPlanner<S, M>>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    debug!(user_id = %q.from.id, "Received callback query from user");

    let language_code = q.from.language_code.as_deref();
    let user_id = q.from.id.0 as i64;

    let Some(meal_id) = q.data.as_deref().and_then(parse_meal_callback) else {
        warn!(user_id, data = ?q.data, "Unrecognized callback data");
        bot.answer_callback_query(q.id)
            .text(t_lang("select-invalid", language_code))
            .show_alert(true)
            .await?;
        return Ok(());
    };

    match planner.select_today(user_id, meal_id).await {
        Ok(selection) if selection.outcome == SelectOutcome::Selected => {
            bot.answer_callback_query(q.id.clone())
                .text(t_lang("select-success", language_code))
                .await?;

            let confirmation = match &selection.meal {
                Some(meal) => t_args_lang(
                    "select-confirmation",
                    &[("meal", meal.name.as_str())],
                    language_code,
                ),
                None => t_lang("select-confirmation-generic", language_code),
            };

            // Replace the keyboard message with the confirmation
            if let Some(msg) = &q.message {
                if let Err(e) = bot
                    .edit_message_text(msg.chat().id, msg.id(), confirmation)
                    .await
                {
                    error!(user_id, error = %e, "Failed to edit message after meal selection");
                }
            }
        }
        Ok(_) => {
            bot.answer_callback_query(q.id)
                .text(t_lang("select-already", language_code))
                .show_alert(true)
                .await?;
        }
        Err(e) => {
            error!(user_id, meal_id, error = %e, "Error processing meal selection");
            bot.answer_callback_query(q.id)
                .text(t_lang("error-generic", language_code))
                .show_alert(true)
                .await?;
        }
    }

    Ok(())
}
