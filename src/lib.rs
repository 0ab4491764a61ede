//! # Meal Planner Telegram Bot
//!
//! A Telegram bot that lets users pick a meal for the day from a menu kept in
//! a Google spreadsheet, and review their selections for the week. The menu is
//! cached locally and resynced from the spreadsheet at startup and once a day.

pub mod bot;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod meal_source;
pub mod memory_store;
pub mod planner;
pub mod selection;
pub mod sheets;
pub mod sync;
pub mod week;
