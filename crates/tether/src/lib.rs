pub mod api;
pub mod config;
pub mod db;
pub mod reminders;
pub mod schedule;
pub mod trigger;
