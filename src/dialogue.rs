//! Add-meal dialogue module for handling conversation state with users.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// Longest accepted meal name, in characters
pub const MAX_MEAL_NAME_LENGTH: usize = 100;

/// Represents the conversation state for the add-meal dialogue
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddMealDialogueState {
    #[default]
    Start,
    WaitingForMealName {
        language_code: Option<String>,
    },
}

/// Type alias for our add-meal dialogue
pub type AddMealDialogue = Dialogue<AddMealDialogueState, InMemStorage<AddMealDialogueState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealNameError {
    Empty,
    TooLong,
}

/// Validates a meal name input
pub fn validate_meal_name(name: &str) -> Result<String, MealNameError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(MealNameError::Empty);
    }

    if trimmed.chars().count() > MAX_MEAL_NAME_LENGTH {
        return Err(MealNameError::TooLong);
    }

    Ok(trimmed.to_string())
}
