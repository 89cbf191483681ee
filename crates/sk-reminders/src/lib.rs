//! `sk-reminders` — C6 Reminder Store: durable, single-delivery reminders.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ReminderError, Result};
pub use store::{ReminderDeliverer, ReminderStore};
pub use types::{Reminder, ReminderPatch, ReminderStatus};
