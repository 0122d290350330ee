pub mod entry_store;
pub mod history;
pub mod models;
pub mod recurrence;
pub mod registry;
pub mod time;
pub mod week_sheet;
