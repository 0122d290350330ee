//! Week planner core: entry reconciliation, weekly recurrence and the command layer a desktop
//! shell calls into.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, bootstrap_workspace};
pub use application::commands::{
    AppState, EntryView, NewDayPresetRequest, NewEntryRequest, NewPresetRequest, PlannerView,
};
pub use application::dispatch::{DragPayload, DropAction, DropTarget, KeyCommand, KeyInput};
pub use domain::models::{
    BlockCategory, Day, DayPreset, ScheduleEntry, Settings, TemplateEntry, TimeBlock, WeekPlan,
    WeekRef,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::kv_store::{InMemoryKeyValueStore, KeyValueStore, SqliteKeyValueStore};
