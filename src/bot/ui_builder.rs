//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::catalog::Meal;
use crate::selection::WeeklySelection;

/// Callback data prefix of meal buttons
pub const MEAL_CALLBACK_PREFIX: &str = "meal_";

/// Callback data for a meal button
pub fn meal_callback_data(meal_id: i64) -> String {
    format!("{MEAL_CALLBACK_PREFIX}{meal_id}")
}

/// Meal id carried by a meal button's callback data
pub fn parse_meal_callback(data: &str) -> Option<i64> {
    data.strip_prefix(MEAL_CALLBACK_PREFIX)?.parse().ok()
}

/// One button per meal, one meal per row
pub fn create_meals_keyboard(meals: &[Meal]) -> InlineKeyboardMarkup {
    let buttons: Vec<Vec<InlineKeyboardButton>> = meals
        .iter()
        .map(|meal| {
            vec![InlineKeyboardButton::callback(
                meal.name.clone(),
                meal_callback_data(meal.id),
            )]
        })
        .collect();

    InlineKeyboardMarkup::new(buttons)
}

/// Welcome text with the command list
pub fn format_welcome_message(language_code: Option<&str>) -> String {
    [
        t_lang("welcome-title", language_code),
        t_lang("welcome-description", language_code),
        [
            t_lang("help-commands", language_code),
            t_lang("help-start", language_code),
            t_lang("help-meals", language_code),
            t_lang("help-view", language_code),
            t_lang("help-addmeal", language_code),
            t_lang("help-cancel", language_code),
        ]
        .join("\n"),
    ]
    .join("\n\n")
}

/// Weekly summary, one `date: meal` line per selection
pub fn format_weekly_selections(selections: &[WeeklySelection], language_code: Option<&str>) -> String {
    if selections.is_empty() {
        return t_lang("view-empty", language_code);
    }

    let mut result = t_lang("view-title", language_code);
    result.push('\n');

    for selection in selections {
        let date = selection.selected_date.format("%Y-%m-%d").to_string();
        result.push('\n');
        result.push_str(&t_args_lang(
            "view-line",
            &[("date", date.as_str()), ("meal", selection.meal_name.as_str())],
            language_code,
        ));
    }

    result
}
