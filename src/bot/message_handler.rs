//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, info};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{AddMealDialogue, AddMealDialogueState, MealNameError, MAX_MEAL_NAME_LENGTH};

use crate::catalog::CatalogStore;
use crate::meal_source::MealSource;
use crate::planner::{AddMealOutcome, MealPlanner};
use crate::selection::SelectionStore;

// Import UI builder functions
use super::ui_builder::{create_meals_keyboard, format_weekly_selections, format_welcome_message};

/// Commands understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Meals,
    View,
    AddMeal(Option<String>),
    Cancel,
    Unknown(String),
}

/// Parse `/command@botname argument` text. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let (head, argument) = match rest.split_once(char::is_whitespace) {
        Some((head, argument)) => (head, argument.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "meals" => Command::Meals,
        "view" => Command::View,
        "addmeal" => Command::AddMeal(Some(argument.to_string()).filter(|a| !a.is_empty())),
        "cancel" => Command::Cancel,
        _ => Command::Unknown(name),
    };
    Some(command)
}

fn user_language(msg: &Message) -> Option<&str> {
    msg.from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str())
}

async fn handle_meals_command<S, M>(
    bot: &Bot,
    msg: &Message,
    planner: &MealPlanner<S, M>,
    language_code: Option<&str>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    match planner.meals().await {
        Ok(meals) if meals.is_empty() => {
            bot.send_message(msg.chat.id, t_lang("meals-empty", language_code))
                .await?;
        }
        Ok(meals) => {
            debug!(user_id = %msg.chat.id, meals = meals.len(), "Sending meal keyboard");
            bot.send_message(msg.chat.id, t_lang("meals-prompt", language_code))
                .reply_markup(create_meals_keyboard(&meals))
                .await?;
        }
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Error in /meals command");
            bot.send_message(msg.chat.id, t_lang("error-generic", language_code))
                .await?;
        }
    }
    Ok(())
}

async fn handle_view_command<S, M>(
    bot: &Bot,
    msg: &Message,
    planner: &MealPlanner<S, M>,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    let text = match planner.this_week(user_id).await {
        Ok(selections) => format_weekly_selections(&selections, language_code),
        Err(e) => {
            error!(user_id, error = %e, "Error in /view command");
            t_lang("error-generic", language_code)
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Add a meal and report the result; returns whether the dialogue is done
async fn add_meal_and_reply<S, M>(
    bot: &Bot,
    msg: &Message,
    planner: &MealPlanner<S, M>,
    user_id: i64,
    name: &str,
    language_code: Option<&str>,
) -> Result<bool>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    let max = MAX_MEAL_NAME_LENGTH.to_string();
    let (reply, done) = match planner.add_meal(user_id, name).await {
        AddMealOutcome::Added(name) => (
            t_args_lang("addmeal-success", &[("meal", name.as_str())], language_code),
            true,
        ),
        AddMealOutcome::Forbidden => (t_lang("addmeal-forbidden", language_code), true),
        AddMealOutcome::Invalid(MealNameError::Empty) => (t_lang("addmeal-empty", language_code), false),
        AddMealOutcome::Invalid(MealNameError::TooLong) => (
            t_args_lang("addmeal-too-long", &[("max", max.as_str())], language_code),
            false,
        ),
        AddMealOutcome::Failed => (t_lang("addmeal-failed", language_code), true),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(done)
}

async fn handle_add_meal_command<S, M>(
    bot: &Bot,
    msg: &Message,
    dialogue: AddMealDialogue,
    planner: &MealPlanner<S, M>,
    user_id: i64,
    name: Option<String>,
    language_code: Option<&str>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    if !planner.can_add_meals(user_id) {
        bot.send_message(msg.chat.id, t_lang("addmeal-forbidden", language_code))
            .await?;
        return Ok(());
    }

    match name {
        Some(name) => {
            add_meal_and_reply(bot, msg, planner, user_id, &name, language_code).await?;
        }
        None => {
            bot.send_message(msg.chat.id, t_lang("addmeal-prompt", language_code))
                .await?;
            dialogue
                .update(AddMealDialogueState::WaitingForMealName {
                    language_code: language_code.map(|s| s.to_string()),
                })
                .await?;
        }
    }
    Ok(())
}

async fn handle_text_message<S, M>(
    bot: &Bot,
    msg: &Message,
    text: &str,
    dialogue: AddMealDialogue,
    planner: &MealPlanner<S, M>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    let Some(user_id) = msg.from.as_ref().map(|user| user.id.0 as i64) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };
    debug!(user_id, message_length = text.len(), "Received text message from user");

    let language_code = user_language(msg);
    let command = parse_command(text);

    // Check dialogue state first
    let dialogue_state = dialogue.get().await?;
    if let Some(AddMealDialogueState::WaitingForMealName {
        language_code: dialogue_lang_code,
    }) = dialogue_state
    {
        // Use dialogue language code if available, otherwise fall back to message language
        let effective_language_code = dialogue_lang_code.as_deref().or(language_code);

        match &command {
            None => {
                let done = add_meal_and_reply(bot, msg, planner, user_id, text, effective_language_code).await?;
                if done {
                    dialogue.exit().await?;
                }
                return Ok(());
            }
            Some(Command::Cancel) => {
                dialogue.exit().await?;
                bot.send_message(msg.chat.id, t_lang("addmeal-cancelled", effective_language_code))
                    .await?;
                return Ok(());
            }
            // Any other command abandons the dialogue and runs normally
            Some(_) => dialogue.exit().await?,
        }
    }

    match command {
        Some(Command::Start) | Some(Command::Help) => {
            bot.send_message(msg.chat.id, format_welcome_message(language_code))
                .await?;
        }
        Some(Command::Meals) => handle_meals_command(bot, msg, planner, language_code).await?,
        Some(Command::View) => handle_view_command(bot, msg, planner, user_id, language_code).await?,
        Some(Command::AddMeal(name)) => {
            handle_add_meal_command(bot, msg, dialogue, planner, user_id, name, language_code).await?
        }
        Some(Command::Cancel) => {
            bot.send_message(msg.chat.id, t_lang("addmeal-cancelled", language_code))
                .await?;
        }
        Some(Command::Unknown(name)) => {
            info!(user_id, command = %name, "Unknown command");
            send_text_tip(bot, msg, language_code).await?;
        }
        None => send_text_tip(bot, msg, language_code).await?,
    }
    Ok(())
}

async fn send_text_tip(bot: &Bot, msg: &Message, language_code: Option<&str>) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        format!(
            "{} {}",
            t_lang("text-response", language_code),
            t_lang("text-tip", language_code)
        ),
    )
    .await?;
    Ok(())
}

pub async fn message_handler<S, M>(
    bot: Bot,
    msg: Message,
    planner: Arc<MealPlanner<S, M>>,
    dialogue: AddMealDialogue,
) -> Result<()>
where
    S: CatalogStore + SelectionStore,
    M: MealSource,
{
    match msg.text() {
        Some(text) => handle_text_message(&bot, &msg, text, dialogue, &planner).await?,
        None => {
            debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
            send_text_tip(&bot, &msg, user_language(&msg)).await?;
        }
    }

    Ok(())
}
