use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::dispatch::{
    DragPayload, DropAction, DropTarget, KeyCommand, KeyInput, Selection, resolve_drop,
};
use crate::domain::entry_store::{EntryMove, EntryStore, reconciled};
use crate::domain::history::History;
use crate::domain::models::{
    BlockCategory, Day, DayPreset, DeletedPersistentSlot, PlannerSnapshot, ScheduleEntry,
    Settings, TemplateEntry, TimeBlock, WeekPlan, WeekRef, next_id,
};
use crate::domain::recurrence::{prune_pool_block, resolve_week, sync_pool};
use crate::domain::registry;
use crate::domain::time::{Span, parse_date, shift_week, today_in, week_of, week_start};
use crate::infrastructure::config::{read_default_settings, read_seed_presets, read_timezone};
use crate::infrastructure::csv_export::{CsvExportSink, ExportSink};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{KeyValueStore, SqliteKeyValueStore};
use crate::infrastructure::planner_repository::PlannerRepository;
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    logs_dir: PathBuf,
    export_dir: PathBuf,
    timezone: Tz,
    default_settings: Settings,
    seed_presets: Vec<TimeBlock>,
    repository: PlannerRepository,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        Self::from_bootstrap(bootstrap, store)
    }

    pub fn with_store(
        workspace_root: PathBuf,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::from_bootstrap(bootstrap, store)
    }

    fn from_bootstrap(
        bootstrap: BootstrapResult,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, InfraError> {
        let timezone = match read_timezone(&bootstrap.config_dir)? {
            Some(name) => name.parse::<Tz>().map_err(|error| {
                InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}"))
            })?,
            None => Tz::UTC,
        };
        let default_settings = read_default_settings(&bootstrap.config_dir)?;
        let seed_presets = read_seed_presets(&bootstrap.config_dir)?;
        let week = week_of(today_in(timezone, Utc::now()));
        let runtime = RuntimeState::new(default_settings.clone(), seed_presets.clone(), week);

        Ok(Self {
            logs_dir: bootstrap.logs_dir,
            export_dir: bootstrap.export_dir,
            timezone,
            default_settings,
            seed_presets,
            repository: PlannerRepository::new(store),
            runtime: Mutex::new(runtime),
            log_guard: Mutex::new(()),
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

/// What one undo step restores: the visible snapshot plus the recurrence state it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UndoState {
    snapshot: PlannerSnapshot,
    pool: Vec<ScheduleEntry>,
    tombstones: Vec<DeletedPersistentSlot>,
}

#[derive(Debug)]
struct RuntimeState {
    history: History<UndoState>,
    settings: Settings,
    selection: Selection,
    modal_open: bool,
    navigation_seq: u64,
}

impl RuntimeState {
    fn new(settings: Settings, presets: Vec<TimeBlock>, week: WeekRef) -> Self {
        Self {
            history: History::new(UndoState {
                snapshot: PlannerSnapshot {
                    week_plan: WeekPlan::empty(week),
                    presets,
                    day_presets: Vec::new(),
                },
                pool: Vec::new(),
                tombstones: Vec::new(),
            }),
            settings,
            selection: Selection::default(),
            modal_open: false,
            navigation_seq: 0,
        }
    }

    fn snapshot(&self) -> &PlannerSnapshot {
        &self.history.present().snapshot
    }

    fn week(&self) -> WeekRef {
        self.snapshot().week_plan.week_ref()
    }

    fn entries(&self) -> &[ScheduleEntry] {
        &self.snapshot().week_plan.entries
    }
}

/// The parts of the undoable state a single gesture may change.
struct Draft {
    store: EntryStore,
    presets: Vec<TimeBlock>,
    day_presets: Vec<DayPreset>,
    pool: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    pub block_color: Option<String>,
    pub border_color: Option<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerView {
    pub year: i32,
    pub week_number: u32,
    pub start_date: String,
    pub entries: Vec<EntryView>,
    pub presets: Vec<TimeBlock>,
    pub day_presets: Vec<DayPreset>,
    pub settings: Settings,
    pub selected_ids: Vec<String>,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntryRequest {
    pub block_id: String,
    pub day: Day,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPresetRequest {
    pub name: String,
    pub color: String,
    pub category: BlockCategory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDayPresetRequest {
    pub name: String,
    pub color: String,
    pub entries: Vec<TemplateEntry>,
}

#[derive(Debug, Default)]
struct PendingWrites {
    settings: Option<Settings>,
    presets: Option<Vec<TimeBlock>>,
    day_presets: Option<Vec<DayPreset>>,
    week_plan: Option<WeekPlan>,
    tombstones: Option<Vec<DeletedPersistentSlot>>,
    pool: Option<Vec<ScheduleEntry>>,
}

impl PendingWrites {
    fn between(previous: &UndoState, next: &UndoState) -> Self {
        let mut writes = Self::default();
        if previous.snapshot.week_plan != next.snapshot.week_plan {
            writes.week_plan = Some(next.snapshot.week_plan.clone());
        }
        if previous.snapshot.presets != next.snapshot.presets {
            writes.presets = Some(next.snapshot.presets.clone());
        }
        if previous.snapshot.day_presets != next.snapshot.day_presets {
            writes.day_presets = Some(next.snapshot.day_presets.clone());
        }
        if previous.tombstones != next.tombstones {
            writes.tombstones = Some(next.tombstones.clone());
        }
        if previous.pool != next.pool {
            writes.pool = Some(next.pool.clone());
        }
        writes
    }
}

pub async fn initialize_impl(state: &AppState) -> Result<PlannerView, InfraError> {
    let repository = &state.repository;
    let settings = or_logged(state, "initialize", "settings", repository.settings().await, None)
        .filter(|settings| settings.validate().is_ok())
        .unwrap_or_else(|| state.default_settings.clone());
    let presets = or_logged(state, "initialize", "presets", repository.presets().await, None)
        .unwrap_or_else(|| state.seed_presets.clone());
    let day_presets = or_logged(
        state,
        "initialize",
        "day presets",
        repository.day_presets().await,
        Vec::new(),
    );
    let tombstones = or_logged(
        state,
        "initialize",
        "deleted slots",
        repository.deleted_slots().await,
        Vec::new(),
    );
    let pool = or_logged(
        state,
        "initialize",
        "persistent entries",
        repository.persistent_entries().await,
        Vec::new(),
    );

    {
        let mut runtime = lock_runtime(state)?;
        runtime.settings = settings;
        let week_plan = runtime.snapshot().week_plan.clone();
        runtime.history.set_state(
            UndoState {
                snapshot: PlannerSnapshot {
                    week_plan,
                    presets,
                    day_presets,
                },
                pool,
                tombstones,
            },
            false,
        );
    }

    state.log_info("initialize", "hydrated planner state");
    go_to_today_impl(state).await
}

pub fn get_view_impl(state: &AppState) -> Result<PlannerView, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(build_view(&runtime))
}

/// Materializes `week` and makes it the viewed week. Only the latest navigation is applied.
pub async fn navigate_week_impl(state: &AppState, week: WeekRef) -> Result<PlannerView, InfraError> {
    if week_start(week).is_none() {
        return Err(InfraError::InvalidInput(format!("week does not exist: {week}")));
    }

    let (sequence, pool, tombstones) = {
        let mut runtime = lock_runtime(state)?;
        runtime.navigation_seq += 1;
        let present = runtime.history.present();
        (
            runtime.navigation_seq,
            present.pool.clone(),
            present.tombstones.clone(),
        )
    };

    let saved = or_logged(
        state,
        "navigate_week",
        &format!("plan {week}"),
        state.repository.week_plan(week).await,
        None,
    );
    let resolved = resolve_week(week, saved.clone(), &pool, &tombstones);

    let (view, writes) = {
        let mut runtime = lock_runtime(state)?;
        if runtime.navigation_seq != sequence {
            state.log_info("navigate_week", &format!("discarded stale load of {week}"));
            return Ok(build_view(&runtime));
        }

        let mut writes = PendingWrites::default();
        if saved.as_ref() != Some(&resolved) {
            writes.week_plan = Some(resolved.clone());
        }
        let present = runtime.history.present().clone();
        runtime.history.reset(UndoState {
            snapshot: PlannerSnapshot {
                week_plan: resolved,
                ..present.snapshot
            },
            ..present
        });
        runtime.selection.clear();
        (build_view(&runtime), writes)
    };

    flush_writes(state, "navigate_week", writes).await;
    state.log_info(
        "navigate_week",
        &format!("viewing {week} with {} entries", view.entries.len()),
    );
    Ok(view)
}

pub async fn change_week_impl(state: &AppState, offset: i64) -> Result<PlannerView, InfraError> {
    let current = lock_runtime(state)?.week();
    let target = shift_week(current, offset).ok_or_else(|| {
        InfraError::InvalidInput(format!("cannot move {offset} weeks from {current}"))
    })?;
    navigate_week_impl(state, target).await
}

pub async fn go_to_date_impl(state: &AppState, date: String) -> Result<PlannerView, InfraError> {
    let parsed = parse_date(&date)
        .ok_or_else(|| InfraError::InvalidInput("date must be YYYY-MM-DD".to_string()))?;
    navigate_week_impl(state, week_of(parsed)).await
}

pub async fn go_to_today_impl(state: &AppState) -> Result<PlannerView, InfraError> {
    let today = today_in(state.timezone, Utc::now());
    navigate_week_impl(state, week_of(today)).await
}

pub async fn add_entry_impl(
    state: &AppState,
    request: NewEntryRequest,
) -> Result<Option<ScheduleEntry>, InfraError> {
    let block_id = normalized(&request.block_id, "block_id")?.to_string();

    let ((added, replaced), writes) = {
        let mut runtime = lock_runtime(state)?;
        checked_span(&runtime.settings, &request.start_time, &request.end_time)?;
        if !runtime
            .history
            .present()
            .snapshot
            .presets
            .iter()
            .any(|preset| preset.id == block_id)
        {
            return Ok(None);
        }

        let entry = ScheduleEntry::new(
            next_id("ent"),
            block_id,
            request.day,
            request.start_time.clone(),
            request.end_time.clone(),
        );
        edit(&mut runtime, |draft| {
            let id = entry.id.clone();
            let replaced = draft.store.add_entry(entry);
            (draft.store.entry(&id).cloned(), replaced)
        })
    };

    flush_writes(state, "add_entry", writes).await;
    state.log_info(
        "add_entry",
        &format!(
            "added entry on {} {}-{} replacing {} entries",
            request.day,
            request.start_time,
            request.end_time,
            replaced.len()
        ),
    );
    Ok(added)
}

pub async fn delete_entry_impl(state: &AppState, entry_id: String) -> Result<bool, InfraError> {
    let entry_id = normalized(&entry_id, "entry_id")?.to_string();

    let (removed, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| draft.store.delete_entry(&entry_id))
    };
    let Some(removed) = removed else {
        return Ok(false);
    };

    flush_writes(state, "delete_entry", writes).await;
    state.log_info(
        "delete_entry",
        &format!("deleted entry_id={entry_id} persistent={}", removed.is_persistent),
    );
    Ok(true)
}

pub async fn delete_group_impl(state: &AppState, group_id: String) -> Result<usize, InfraError> {
    let group_id = normalized(&group_id, "group_id")?.to_string();

    let (removed, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| draft.store.delete_group(&group_id).len())
    };

    flush_writes(state, "delete_group", writes).await;
    state.log_info(
        "delete_group",
        &format!("deleted {removed} entries of group_id={group_id}"),
    );
    Ok(removed)
}

pub async fn update_entry_impl(
    state: &AppState,
    entry: ScheduleEntry,
) -> Result<Option<ScheduleEntry>, InfraError> {
    entry.validate().map_err(InfraError::InvalidInput)?;
    let entry_id = entry.id.clone();

    let (updated, writes) = {
        let mut runtime = lock_runtime(state)?;
        checked_span(&runtime.settings, &entry.start_time, &entry.end_time)?;
        edit(&mut runtime, |draft| {
            let outcome = draft.store.update_entry(entry)?;
            draft.store.entry(&entry_id).cloned().map(|updated| (updated, outcome))
        })
    };
    let Some((updated, outcome)) = updated else {
        return Ok(None);
    };

    flush_writes(state, "update_entry", writes).await;
    state.log_info(
        "update_entry",
        &format!(
            "updated entry_id={entry_id} {}-{} removed={} clipped={}",
            updated.start_time,
            updated.end_time,
            outcome.removed.len(),
            outcome.clipped.len()
        ),
    );
    Ok(Some(updated))
}

pub async fn resize_entry_impl(
    state: &AppState,
    entry_id: String,
    start_time: String,
    end_time: String,
) -> Result<Option<ScheduleEntry>, InfraError> {
    let Some(mut entry) = current_entry(state, &entry_id)? else {
        return Ok(None);
    };
    entry.start_time = start_time;
    entry.end_time = end_time;
    update_entry_impl(state, entry).await
}

pub async fn set_entry_persistence_impl(
    state: &AppState,
    entry_id: String,
    persistent: bool,
) -> Result<Option<ScheduleEntry>, InfraError> {
    let Some(mut entry) = current_entry(state, &entry_id)? else {
        return Ok(None);
    };
    entry.is_persistent = persistent;
    update_entry_impl(state, entry).await
}

pub async fn move_entries_impl(
    state: &AppState,
    moves: Vec<EntryMove>,
) -> Result<usize, InfraError> {
    if moves.is_empty() {
        return Ok(0);
    }

    let (removed, writes) = {
        let mut runtime = lock_runtime(state)?;
        for entry_move in &moves {
            checked_span(&runtime.settings, &entry_move.start_time, &entry_move.end_time)?;
        }
        edit(&mut runtime, |draft| draft.store.move_entries(&moves).len())
    };

    flush_writes(state, "move_entries", writes).await;
    state.log_info(
        "move_entries",
        &format!("moved {} entries replacing {removed}", moves.len()),
    );
    Ok(removed)
}

pub fn select_entry_impl(
    state: &AppState,
    entry_id: Option<String>,
    multi: bool,
) -> Result<Vec<String>, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let runtime = &mut *runtime;
    runtime.selection.select(entry_id.as_deref(), multi);
    runtime
        .selection
        .retain_existing(&runtime.history.present().snapshot.week_plan.entries);
    Ok(runtime.selection.ids())
}

pub async fn duplicate_selection_impl(state: &AppState) -> Result<Vec<String>, InfraError> {
    let (created, writes) = {
        let mut runtime = lock_runtime(state)?;
        let ids = runtime.selection.ids();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (created, writes) = edit(&mut runtime, |draft| draft.store.duplicate(&ids));
        runtime.selection.replace(created.iter().cloned());
        (created, writes)
    };

    flush_writes(state, "duplicate_selection", writes).await;
    state.log_info(
        "duplicate_selection",
        &format!("duplicated {} entries", created.len()),
    );
    Ok(created)
}

pub async fn delete_selection_impl(state: &AppState) -> Result<usize, InfraError> {
    let (removed, writes) = {
        let mut runtime = lock_runtime(state)?;
        let ids = runtime.selection.ids();
        if ids.is_empty() {
            return Ok(0);
        }
        let (removed, writes) = edit(&mut runtime, |draft| {
            ids.iter()
                .filter(|id| draft.store.delete_entry(id).is_some())
                .count()
        });
        runtime.selection.clear();
        (removed, writes)
    };

    flush_writes(state, "delete_selection", writes).await;
    state.log_info("delete_selection", &format!("deleted {removed} entries"));
    Ok(removed)
}

pub async fn undo_impl(state: &AppState) -> Result<bool, InfraError> {
    step_history(state, "undo", false).await
}

pub async fn redo_impl(state: &AppState) -> Result<bool, InfraError> {
    step_history(state, "redo", true).await
}

pub async fn add_preset_impl(
    state: &AppState,
    request: NewPresetRequest,
) -> Result<TimeBlock, InfraError> {
    let preset = TimeBlock {
        id: next_id("blk"),
        name: request.name.trim().to_string(),
        color: request.color.trim().to_string(),
        category: request.category,
    };
    preset.validate().map_err(InfraError::InvalidInput)?;

    let ((), writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            registry::add_preset(&mut draft.presets, preset.clone())
        })
    };

    flush_writes(state, "add_preset", writes).await;
    state.log_info("add_preset", &format!("added preset_id={}", preset.id));
    Ok(preset)
}

pub async fn update_preset_impl(state: &AppState, preset: TimeBlock) -> Result<bool, InfraError> {
    preset.validate().map_err(InfraError::InvalidInput)?;
    let preset_id = preset.id.clone();

    let (updated, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            registry::update_preset(&mut draft.presets, preset)
        })
    };

    flush_writes(state, "update_preset", writes).await;
    if updated {
        state.log_info("update_preset", &format!("updated preset_id={preset_id}"));
    }
    Ok(updated)
}

pub async fn delete_preset_impl(state: &AppState, preset_id: String) -> Result<bool, InfraError> {
    let preset_id = normalized(&preset_id, "preset_id")?.to_string();

    let ((existed, removed), writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            let existed = draft.presets.iter().any(|preset| preset.id == preset_id);
            let removed =
                registry::delete_preset(&mut draft.presets, &mut draft.store, &preset_id);
            prune_pool_block(&mut draft.pool, &preset_id);
            (existed, removed.len())
        })
    };

    flush_writes(state, "delete_preset", writes).await;
    if existed {
        state.log_info(
            "delete_preset",
            &format!("deleted preset_id={preset_id} with {removed} entries"),
        );
    }
    Ok(existed)
}

pub async fn add_day_preset_impl(
    state: &AppState,
    request: NewDayPresetRequest,
) -> Result<DayPreset, InfraError> {
    let preset = DayPreset {
        id: next_id("dp"),
        name: request.name.trim().to_string(),
        color: request.color.trim().to_string(),
        entries: request.entries,
    };
    preset.validate().map_err(InfraError::InvalidInput)?;

    let ((), writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            registry::add_day_preset(&mut draft.day_presets, preset.clone())
        })
    };

    flush_writes(state, "add_day_preset", writes).await;
    state.log_info(
        "add_day_preset",
        &format!("added day_preset_id={}", preset.id),
    );
    Ok(preset)
}

pub async fn update_day_preset_impl(
    state: &AppState,
    preset: DayPreset,
) -> Result<bool, InfraError> {
    preset.validate().map_err(InfraError::InvalidInput)?;
    let preset_id = preset.id.clone();

    let (updated, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            registry::update_day_preset(&mut draft.day_presets, preset)
        })
    };

    flush_writes(state, "update_day_preset", writes).await;
    if updated {
        state.log_info(
            "update_day_preset",
            &format!("updated day_preset_id={preset_id}"),
        );
    }
    Ok(updated)
}

pub async fn delete_day_preset_impl(
    state: &AppState,
    day_preset_id: String,
) -> Result<bool, InfraError> {
    let day_preset_id = normalized(&day_preset_id, "day_preset_id")?.to_string();

    let ((existed, unlinked), writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            let existed = draft
                .day_presets
                .iter()
                .any(|preset| preset.id == day_preset_id);
            let unlinked =
                registry::delete_day_preset(&mut draft.day_presets, &mut draft.store, &day_preset_id);
            (existed, unlinked)
        })
    };

    flush_writes(state, "delete_day_preset", writes).await;
    if existed {
        state.log_info(
            "delete_day_preset",
            &format!("deleted day_preset_id={day_preset_id} unlinking {unlinked} entries"),
        );
    }
    Ok(existed)
}

pub async fn save_day_as_preset_impl(
    state: &AppState,
    day: Day,
) -> Result<Option<DayPreset>, InfraError> {
    let (saved, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            let preset =
                registry::save_day_as_preset(draft.store.entries(), day, &draft.day_presets)?;
            draft.day_presets.push(preset.clone());
            Some(preset)
        })
    };

    flush_writes(state, "save_day_as_preset", writes).await;
    if let Some(preset) = &saved {
        state.log_info(
            "save_day_as_preset",
            &format!("saved {day} as '{}' with {} entries", preset.name, preset.entries.len()),
        );
    }
    Ok(saved)
}

pub async fn drop_day_preset_impl(
    state: &AppState,
    day_preset_id: String,
    day: Day,
) -> Result<Vec<String>, InfraError> {
    let day_preset_id = normalized(&day_preset_id, "day_preset_id")?.to_string();

    let (created, writes) = {
        let mut runtime = lock_runtime(state)?;
        edit(&mut runtime, |draft| {
            let Some(preset) = draft
                .day_presets
                .iter()
                .find(|preset| preset.id == day_preset_id)
                .cloned()
            else {
                return Vec::new();
            };
            registry::drop_day_preset(&mut draft.store, &preset, day)
        })
    };

    flush_writes(state, "drop_day_preset", writes).await;
    if !created.is_empty() {
        state.log_info(
            "drop_day_preset",
            &format!(
                "applied day_preset_id={day_preset_id} to {day} creating {} entries",
                created.len()
            ),
        );
    }
    Ok(created)
}

pub async fn toggle_pin_day_impl(state: &AppState, day: Day) -> Result<Settings, InfraError> {
    let (settings, changed, writes) = {
        let mut runtime = lock_runtime(state)?;
        let pinned = !runtime.settings.is_pinned(day);
        if pinned {
            runtime.settings.pinned_days.push(day);
        } else {
            runtime.settings.pinned_days.retain(|candidate| *candidate != day);
        }
        let settings = runtime.settings.clone();
        let (changed, mut writes) = edit(&mut runtime, |draft| {
            draft.store.set_day_persistence(day, pinned)
        });
        writes.settings = Some(settings.clone());
        (settings, changed, writes)
    };

    flush_writes(state, "toggle_pin_day", writes).await;
    state.log_info(
        "toggle_pin_day",
        &format!(
            "{day} pinned={} changed {changed} entries",
            settings.is_pinned(day)
        ),
    );
    Ok(settings)
}

/// Replaces work days and the day window. Pins only change through `toggle_pin_day_impl`.
pub async fn update_settings_impl(
    state: &AppState,
    settings: Settings,
) -> Result<Settings, InfraError> {
    settings.validate().map_err(InfraError::InvalidInput)?;

    let updated = {
        let mut runtime = lock_runtime(state)?;
        let pinned_days = std::mem::take(&mut runtime.settings.pinned_days);
        runtime.settings = Settings {
            pinned_days,
            ..settings
        };
        runtime.settings.clone()
    };

    let writes = PendingWrites {
        settings: Some(updated.clone()),
        ..PendingWrites::default()
    };
    flush_writes(state, "update_settings", writes).await;
    state.log_info(
        "update_settings",
        &format!("day window {}-{}", updated.day_start, updated.day_end),
    );
    Ok(updated)
}

pub fn set_modal_open_impl(state: &AppState, open: bool) -> Result<(), InfraError> {
    lock_runtime(state)?.modal_open = open;
    Ok(())
}

pub async fn handle_key_impl(
    state: &AppState,
    input: KeyInput,
) -> Result<Option<KeyCommand>, InfraError> {
    let command = {
        let runtime = lock_runtime(state)?;
        if runtime.modal_open {
            None
        } else {
            KeyCommand::from_input(&input)
        }
    };
    let Some(command) = command else {
        return Ok(None);
    };

    match command {
        KeyCommand::Undo => {
            undo_impl(state).await?;
        }
        KeyCommand::Redo => {
            redo_impl(state).await?;
        }
        KeyCommand::Duplicate => {
            duplicate_selection_impl(state).await?;
        }
        KeyCommand::DeleteSelection => {
            delete_selection_impl(state).await?;
        }
    }
    Ok(Some(command))
}

pub async fn handle_drop_impl(
    state: &AppState,
    payload: DragPayload,
    target: DropTarget,
) -> Result<Option<DropAction>, InfraError> {
    let action = {
        let runtime = lock_runtime(state)?;
        resolve_drop(&payload, target, &runtime.settings, runtime.entries())
    };
    let Some(action) = action else {
        return Ok(None);
    };

    match &action {
        DropAction::AddEntry {
            block_id,
            day,
            start_time,
            end_time,
        } => {
            add_entry_impl(
                state,
                NewEntryRequest {
                    block_id: block_id.clone(),
                    day: *day,
                    start_time: start_time.clone(),
                    end_time: end_time.clone(),
                },
            )
            .await?;
        }
        DropAction::MoveEntries(moves) => {
            move_entries_impl(state, moves.clone()).await?;
        }
        DropAction::ApplyDayPreset { day_preset_id, day } => {
            drop_day_preset_impl(state, day_preset_id.clone(), *day).await?;
        }
    }
    Ok(Some(action))
}

pub fn export_week_impl(state: &AppState) -> Result<PathBuf, InfraError> {
    let sink = CsvExportSink::new(&state.export_dir);
    export_week_with(state, &sink)
}

/// Exports the viewed week with overlaps resolved in favour of later entries.
pub fn export_week_with(state: &AppState, sink: &dyn ExportSink) -> Result<PathBuf, InfraError> {
    let (plan, presets, settings) = {
        let runtime = lock_runtime(state)?;
        let snapshot = runtime.snapshot();
        let plan = WeekPlan {
            entries: reconciled(&snapshot.week_plan.entries),
            ..snapshot.week_plan.clone()
        };
        (plan, snapshot.presets.clone(), runtime.settings.clone())
    };

    match sink.export(&plan, &presets, &settings) {
        Ok(path) => {
            state.log_info("export_week", &format!("exported to {}", path.display()));
            Ok(path)
        }
        Err(error) => {
            state.log_error("export_week", &format!("export failed: {error}"));
            Err(error)
        }
    }
}

async fn step_history(state: &AppState, command: &str, forward: bool) -> Result<bool, InfraError> {
    let writes = {
        let mut runtime = lock_runtime(state)?;
        let runtime = &mut *runtime;
        let before = runtime.history.present().clone();
        let stepped = if forward {
            runtime.history.redo()
        } else {
            runtime.history.undo()
        };
        if !stepped {
            return Ok(false);
        }

        let after = runtime.history.present();
        runtime
            .selection
            .retain_existing(&after.snapshot.week_plan.entries);
        PendingWrites::between(&before, after)
    };

    flush_writes(state, command, writes).await;
    state.log_info(command, "restored snapshot");
    Ok(true)
}

/// Runs one gesture against the viewed week and records it as a single history step.
/// The recurrence pool follows the entries in the same step, so undo restores both.
fn edit<R>(runtime: &mut RuntimeState, mutate: impl FnOnce(&mut Draft) -> R) -> (R, PendingWrites) {
    let UndoState {
        snapshot,
        pool,
        tombstones,
    } = runtime.history.present().clone();
    let PlannerSnapshot {
        week_plan,
        presets,
        day_presets,
    } = snapshot;
    let WeekPlan {
        week_number,
        year,
        start_date,
        entries,
    } = week_plan;
    let before = entries.clone();

    let mut draft = Draft {
        store: EntryStore::new(
            WeekRef::new(year, week_number),
            entries,
            tombstones,
            &runtime.settings.pinned_days,
        ),
        presets,
        day_presets,
        pool,
    };
    let result = mutate(&mut draft);

    let Draft {
        store,
        presets,
        day_presets,
        mut pool,
    } = draft;
    let (entries, tombstones) = store.into_parts();
    sync_pool(&mut pool, &before, &entries);

    let next = UndoState {
        snapshot: PlannerSnapshot {
            week_plan: WeekPlan {
                week_number,
                year,
                start_date,
                entries,
            },
            presets,
            day_presets,
        },
        pool,
        tombstones,
    };
    let writes = commit(runtime, next);
    (result, writes)
}

fn commit(runtime: &mut RuntimeState, next: UndoState) -> PendingWrites {
    let previous = runtime.history.present();
    if *previous == next {
        return PendingWrites::default();
    }
    let writes = PendingWrites::between(previous, &next);
    runtime.history.set_state(next, true);
    runtime
        .selection
        .retain_existing(&runtime.history.present().snapshot.week_plan.entries);
    writes
}

async fn flush_writes(state: &AppState, command: &str, writes: PendingWrites) {
    let repository = &state.repository;
    if let Some(settings) = writes.settings {
        report_write(state, command, "settings", repository.save_settings(&settings).await);
    }
    if let Some(presets) = writes.presets {
        report_write(state, command, "presets", repository.save_presets(&presets).await);
    }
    if let Some(day_presets) = writes.day_presets {
        report_write(
            state,
            command,
            "day presets",
            repository.save_day_presets(&day_presets).await,
        );
    }
    if let Some(plan) = writes.week_plan {
        report_write(state, command, "week plan", repository.save_week_plan(&plan).await);
    }
    if let Some(slots) = writes.tombstones {
        report_write(
            state,
            command,
            "deleted slots",
            repository.save_deleted_slots(&slots).await,
        );
    }
    if let Some(pool) = writes.pool {
        report_write(
            state,
            command,
            "persistent entries",
            repository.save_persistent_entries(&pool).await,
        );
    }
}

fn report_write(state: &AppState, command: &str, what: &str, result: Result<(), InfraError>) {
    if let Err(error) = result {
        state.log_error(command, &format!("failed to persist {what}: {error}"));
    }
}

fn or_logged<T>(
    state: &AppState,
    command: &str,
    what: &str,
    result: Result<T, InfraError>,
    fallback: T,
) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            state.log_error(command, &format!("failed to load {what}: {error}"));
            fallback
        }
    }
}

fn build_view(runtime: &RuntimeState) -> PlannerView {
    let snapshot = runtime.snapshot();
    let entries = snapshot
        .week_plan
        .entries
        .iter()
        .map(|entry| EntryView {
            block_color: registry::block_color(entry, &snapshot.presets).map(ToOwned::to_owned),
            border_color: registry::border_color(entry, &snapshot.day_presets)
                .map(ToOwned::to_owned),
            selected: runtime.selection.contains(&entry.id),
            entry: entry.clone(),
        })
        .collect();

    PlannerView {
        year: snapshot.week_plan.year,
        week_number: snapshot.week_plan.week_number,
        start_date: snapshot.week_plan.start_date.clone(),
        entries,
        presets: snapshot.presets.clone(),
        day_presets: snapshot.day_presets.clone(),
        settings: runtime.settings.clone(),
        selected_ids: runtime.selection.ids(),
        can_undo: runtime.history.can_undo(),
        can_redo: runtime.history.can_redo(),
    }
}

fn current_entry(state: &AppState, entry_id: &str) -> Result<Option<ScheduleEntry>, InfraError> {
    let entry_id = normalized(entry_id, "entry_id")?;
    let runtime = lock_runtime(state)?;
    Ok(runtime
        .entries()
        .iter()
        .find(|entry| entry.id == entry_id)
        .cloned())
}

fn normalized<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn checked_span(settings: &Settings, start_time: &str, end_time: &str) -> Result<Span, InfraError> {
    let span = Span::of(start_time, end_time).ok_or_else(|| {
        InfraError::InvalidInput(format!(
            "invalid time range {start_time}-{end_time}, expected HH:MM with start before end"
        ))
    })?;
    if !settings.contains(span) {
        return Err(InfraError::InvalidInput(format!(
            "{start_time}-{end_time} is outside the day window {}-{}",
            settings.day_start, settings.day_end
        )));
    }
    Ok(span)
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::Storage(format!("runtime lock poisoned: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::DEFAULT_DAY_PRESET_COLOR;
    use crate::infrastructure::kv_store::InMemoryKeyValueStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    const WEEK: WeekRef = WeekRef { year: 2025, week: 10 };

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "weekplanner-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }

        fn app_state_with(&self, store: Arc<dyn KeyValueStore>) -> AppState {
            AppState::with_store(self.path.clone(), store).expect("initialize app state")
        }

        fn command_log(&self) -> String {
            fs::read_to_string(self.path.join("logs").join("commands.log")).unwrap_or_default()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, InfraError> {
            Ok(None)
        }

        async fn set(&self, key: &str, _value: Value) -> Result<(), InfraError> {
            Err(InfraError::Storage(format!("disk full writing {key}")))
        }
    }

    #[derive(Default)]
    struct SlowStore {
        inner: InMemoryKeyValueStore,
        delays: Mutex<HashMap<String, Duration>>,
    }

    impl SlowStore {
        fn delay(&self, key: &str, delay: Duration) {
            self.delays
                .lock()
                .expect("delays lock")
                .insert(key.to_string(), delay);
        }
    }

    #[async_trait]
    impl KeyValueStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
            let delay = self.delays.lock().expect("delays lock").get(key).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), InfraError> {
            self.inner.set(key, value).await
        }
    }

    async fn ready_state(workspace: &TempWorkspace) -> AppState {
        let state = workspace.app_state();
        initialize_impl(&state).await.expect("initialize");
        navigate_week_impl(&state, WEEK).await.expect("navigate");
        state
    }

    fn request(day: Day, start: &str, end: &str) -> NewEntryRequest {
        NewEntryRequest {
            block_id: "break-1".to_string(),
            day,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    async fn add(state: &AppState, day: Day, start: &str, end: &str) -> ScheduleEntry {
        add_entry_impl(state, request(day, start, end))
            .await
            .expect("add entry")
            .expect("known preset")
    }

    fn entry_ids(view: &PlannerView) -> Vec<String> {
        view.entries.iter().map(|view| view.entry.id.clone()).collect()
    }

    #[tokio::test]
    async fn initialize_seeds_presets_and_opens_current_week() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let view = initialize_impl(&state).await.expect("initialize");

        assert_eq!(view.presets, registry::default_presets());
        assert!(view.entries.is_empty());
        assert!(!view.can_undo);
        assert_eq!(
            WeekRef::new(view.year, view.week_number),
            week_of(today_in(Tz::UTC, Utc::now()))
        );
    }

    #[tokio::test]
    async fn add_entry_is_one_undoable_step() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;

        let added = add(&state, Day::Monday, "09:00", "10:00").await;
        let view = get_view_impl(&state).expect("view");
        assert_eq!(entry_ids(&view), vec![added.id.clone()]);
        assert_eq!(view.entries[0].block_color.as_deref(), Some("#64748b"));
        assert!(view.can_undo);

        assert!(undo_impl(&state).await.expect("undo"));
        assert!(get_view_impl(&state).expect("view").entries.is_empty());
        assert!(!undo_impl(&state).await.expect("undo at boundary"));

        assert!(redo_impl(&state).await.expect("redo"));
        assert_eq!(entry_ids(&get_view_impl(&state).expect("view")), vec![added.id]);
        assert!(!redo_impl(&state).await.expect("redo at boundary"));
    }

    #[tokio::test]
    async fn add_entry_validates_input() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;

        let outside = add_entry_impl(&state, request(Day::Monday, "06:00", "07:00")).await;
        assert!(matches!(outside, Err(InfraError::InvalidInput(_))));

        let reversed = add_entry_impl(&state, request(Day::Monday, "10:00", "09:00")).await;
        assert!(matches!(reversed, Err(InfraError::InvalidInput(_))));

        let mut unknown = request(Day::Monday, "09:00", "10:00");
        unknown.block_id = "missing".to_string();
        assert!(add_entry_impl(&state, unknown).await.expect("no-op").is_none());
        assert!(!get_view_impl(&state).expect("view").can_undo);
    }

    #[tokio::test]
    async fn not_found_commands_are_silent_noops() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;

        assert!(!delete_entry_impl(&state, "missing".to_string()).await.expect("delete"));
        assert_eq!(delete_group_impl(&state, "missing".to_string()).await.expect("group"), 0);
        assert!(resize_entry_impl(
            &state,
            "missing".to_string(),
            "09:00".to_string(),
            "10:00".to_string()
        )
        .await
        .expect("resize")
        .is_none());
        assert!(!delete_preset_impl(&state, "missing".to_string()).await.expect("preset"));
        assert!(!get_view_impl(&state).expect("view").can_undo);
    }

    #[tokio::test]
    async fn persistent_entry_recurs_forward_and_respects_tombstones() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let added = add(&state, Day::Monday, "09:00", "10:00").await;
        let pinned = set_entry_persistence_impl(&state, added.id.clone(), true)
            .await
            .expect("pin")
            .expect("known entry");
        assert_eq!(pinned.valid_from, Some(WEEK));

        let next = change_week_impl(&state, 1).await.expect("next week");
        assert_eq!(entry_ids(&next), vec![added.id.clone()]);
        assert!(!next.can_undo);

        let earlier = change_week_impl(&state, -2).await.expect("earlier week");
        assert!(earlier.entries.is_empty());

        navigate_week_impl(&state, WeekRef::new(2025, 11)).await.expect("week 11");
        assert!(delete_entry_impl(&state, added.id.clone()).await.expect("delete"));

        let later = navigate_week_impl(&state, WeekRef::new(2025, 12)).await.expect("week 12");
        assert_eq!(entry_ids(&later), vec![added.id.clone()]);

        let suppressed = navigate_week_impl(&state, WeekRef::new(2025, 11)).await.expect("week 11");
        assert!(suppressed.entries.is_empty());
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let workspace = TempWorkspace::new();
        let added = {
            let state = ready_state(&workspace).await;
            let added = add(&state, Day::Tuesday, "13:00", "15:00").await;
            set_entry_persistence_impl(&state, added.id.clone(), true)
                .await
                .expect("pin");
            toggle_pin_day_impl(&state, Day::Friday).await.expect("pin day");
            added
        };

        let state = ready_state(&workspace).await;
        let view = get_view_impl(&state).expect("view");
        assert_eq!(entry_ids(&view), vec![added.id.clone()]);
        assert!(view.settings.is_pinned(Day::Friday));

        let future = navigate_week_impl(&state, WeekRef::new(2026, 2)).await.expect("future");
        assert_eq!(entry_ids(&future), vec![added.id]);
    }

    #[tokio::test]
    async fn persistence_failures_are_logged_not_returned() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_with(Arc::new(FailingStore));
        initialize_impl(&state).await.expect("initialize");

        let added = add(&state, Day::Monday, "09:00", "10:00").await;

        let view = get_view_impl(&state).expect("view");
        assert_eq!(entry_ids(&view), vec![added.id]);
        let log = workspace.command_log();
        assert!(log.contains("\"level\":\"error\""));
        assert!(log.contains("failed to persist week plan"));
    }

    #[tokio::test]
    async fn last_navigation_wins() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(SlowStore::default());
        store.delay("plan-2025-20", Duration::from_millis(50));
        let state = workspace.app_state_with(store);
        initialize_impl(&state).await.expect("initialize");

        let (slow, fast) = tokio::join!(
            navigate_week_impl(&state, WeekRef::new(2025, 20)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                navigate_week_impl(&state, WeekRef::new(2025, 21)).await
            },
        );
        slow.expect("slow navigation");
        fast.expect("fast navigation");

        let view = get_view_impl(&state).expect("view");
        assert_eq!(WeekRef::new(view.year, view.week_number), WeekRef::new(2025, 21));
        assert!(workspace.command_log().contains("discarded stale load of 2025-W20"));
    }

    #[tokio::test]
    async fn resize_clips_neighbour_in_one_step() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let first = add(&state, Day::Monday, "09:00", "10:00").await;
        let second = add(&state, Day::Monday, "10:00", "12:00").await;

        resize_entry_impl(&state, first.id.clone(), "09:00".to_string(), "11:00".to_string())
            .await
            .expect("resize")
            .expect("known entry");

        let view = get_view_impl(&state).expect("view");
        let neighbour = view
            .entries
            .iter()
            .find(|view| view.entry.id == second.id)
            .expect("neighbour kept");
        assert_eq!(neighbour.entry.start_time, "11:00");

        undo_impl(&state).await.expect("undo");
        let view = get_view_impl(&state).expect("view");
        let neighbour = view
            .entries
            .iter()
            .find(|view| view.entry.id == second.id)
            .expect("neighbour restored");
        assert_eq!(neighbour.entry.start_time, "10:00");
    }

    #[tokio::test]
    async fn selection_delete_and_duplicate_are_single_steps() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let first = add(&state, Day::Monday, "09:00", "10:00").await;
        let second = add(&state, Day::Tuesday, "09:00", "10:00").await;

        select_entry_impl(&state, Some(first.id.clone()), false).expect("select");
        let selected = select_entry_impl(&state, Some(second.id.clone()), true).expect("select");
        assert_eq!(selected.len(), 2);

        let created = duplicate_selection_impl(&state).await.expect("duplicate");
        assert_eq!(created.len(), 2);
        let view = get_view_impl(&state).expect("view");
        assert_eq!(view.entries.len(), 4);
        let mut selected_ids = view.selected_ids.clone();
        let mut expected = created.clone();
        selected_ids.sort();
        expected.sort();
        assert_eq!(selected_ids, expected);

        assert_eq!(delete_selection_impl(&state).await.expect("delete"), 2);
        let view = get_view_impl(&state).expect("view");
        assert_eq!(view.entries.len(), 2);
        assert!(view.selected_ids.is_empty());

        undo_impl(&state).await.expect("undo delete");
        assert_eq!(get_view_impl(&state).expect("view").entries.len(), 4);
    }

    #[tokio::test]
    async fn keyboard_shortcuts_dispatch_unless_modal_open() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        add(&state, Day::Monday, "09:00", "10:00").await;
        let undo = KeyInput {
            key: "z".to_string(),
            ctrl: true,
            ..KeyInput::default()
        };

        set_modal_open_impl(&state, true).expect("open modal");
        assert_eq!(handle_key_impl(&state, undo.clone()).await.expect("key"), None);
        assert_eq!(get_view_impl(&state).expect("view").entries.len(), 1);

        set_modal_open_impl(&state, false).expect("close modal");
        assert_eq!(
            handle_key_impl(&state, undo).await.expect("key"),
            Some(KeyCommand::Undo)
        );
        assert!(get_view_impl(&state).expect("view").entries.is_empty());
    }

    #[tokio::test]
    async fn drops_dispatch_to_commands() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;

        let action = handle_drop_impl(
            &state,
            DragPayload::Preset {
                block_id: "break-1".to_string(),
            },
            DropTarget {
                day: Day::Wednesday,
                offset_px: 80.0,
            },
        )
        .await
        .expect("drop preset");
        assert!(matches!(action, Some(DropAction::AddEntry { .. })));
        let view = get_view_impl(&state).expect("view");
        assert_eq!(view.entries[0].entry.start_time, "09:00");
        let entry_id = view.entries[0].entry.id.clone();

        handle_drop_impl(
            &state,
            DragPayload::Entry { entry_id },
            DropTarget {
                day: Day::Thursday,
                offset_px: 5_000.0,
            },
        )
        .await
        .expect("drop outside grid");
        assert_eq!(
            get_view_impl(&state).expect("view").entries[0].entry.day,
            Day::Wednesday
        );
    }

    #[tokio::test]
    async fn day_preset_lifecycle() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        add(&state, Day::Monday, "08:00", "09:00").await;
        add(&state, Day::Monday, "09:00", "10:00").await;

        let saved = save_day_as_preset_impl(&state, Day::Monday)
            .await
            .expect("save")
            .expect("non-empty day");
        assert_eq!(saved.name, "MO Template");
        assert_eq!(saved.color, DEFAULT_DAY_PRESET_COLOR);
        let again = save_day_as_preset_impl(&state, Day::Monday)
            .await
            .expect("save")
            .expect("non-empty day");
        assert_eq!(again.name, "MO Template (2)");
        assert!(save_day_as_preset_impl(&state, Day::Sunday)
            .await
            .expect("save")
            .is_none());

        let created = drop_day_preset_impl(&state, saved.id.clone(), Day::Thursday)
            .await
            .expect("drop");
        assert_eq!(created.len(), 2);
        let view = get_view_impl(&state).expect("view");
        let thursday: Vec<&EntryView> = view
            .entries
            .iter()
            .filter(|view| view.entry.day == Day::Thursday)
            .collect();
        assert_eq!(thursday.len(), 2);
        assert_eq!(thursday[0].border_color.as_deref(), Some(DEFAULT_DAY_PRESET_COLOR));

        undo_impl(&state).await.expect("undo drop");
        let view = get_view_impl(&state).expect("view");
        assert!(view.entries.iter().all(|view| view.entry.day != Day::Thursday));
        redo_impl(&state).await.expect("redo drop");

        assert!(delete_day_preset_impl(&state, saved.id.clone()).await.expect("delete"));
        let view = get_view_impl(&state).expect("view");
        assert!(view
            .entries
            .iter()
            .all(|view| view.entry.day_preset_id.as_deref() != Some(saved.id.as_str())));
        assert_eq!(view.day_presets.len(), 1);
    }

    #[tokio::test]
    async fn deleting_preset_cascades_to_entries() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let preset = add_preset_impl(
            &state,
            NewPresetRequest {
                name: "Client".to_string(),
                color: "#0ea5e9".to_string(),
                category: BlockCategory::ProjectExt,
            },
        )
        .await
        .expect("add preset");
        add_entry_impl(
            &state,
            NewEntryRequest {
                block_id: preset.id.clone(),
                ..request(Day::Monday, "09:00", "10:00")
            },
        )
        .await
        .expect("add entry");
        add(&state, Day::Monday, "10:00", "11:00").await;

        assert!(delete_preset_impl(&state, preset.id.clone()).await.expect("delete preset"));

        let view = get_view_impl(&state).expect("view");
        assert_eq!(view.entries.len(), 1);
        assert!(view.presets.iter().all(|candidate| candidate.id != preset.id));
    }

    #[tokio::test]
    async fn pinning_a_day_cascades_persistence() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let added = add(&state, Day::Friday, "09:00", "10:00").await;
        assert!(!added.is_persistent);

        let settings = toggle_pin_day_impl(&state, Day::Friday).await.expect("pin");
        assert!(settings.is_pinned(Day::Friday));
        let later = add(&state, Day::Friday, "11:00", "12:00").await;
        assert!(later.is_persistent);
        let view = get_view_impl(&state).expect("view");
        assert!(view.entries.iter().all(|view| view.entry.is_persistent));

        let settings = toggle_pin_day_impl(&state, Day::Friday).await.expect("unpin");
        assert!(!settings.is_pinned(Day::Friday));
        let view = get_view_impl(&state).expect("view");
        assert!(view.entries.iter().all(|view| !view.entry.is_persistent));
    }

    #[tokio::test]
    async fn update_settings_keeps_pins_and_validates() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        toggle_pin_day_impl(&state, Day::Monday).await.expect("pin");

        let updated = update_settings_impl(
            &state,
            Settings {
                day_start: "07:00".to_string(),
                day_end: "19:00".to_string(),
                ..Settings::default()
            },
        )
        .await
        .expect("update settings");
        assert_eq!(updated.day_start, "07:00");
        assert!(updated.is_pinned(Day::Monday));

        let invalid = update_settings_impl(
            &state,
            Settings {
                day_start: "19:00".to_string(),
                ..Settings::default()
            },
        )
        .await;
        assert!(matches!(invalid, Err(InfraError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn undone_add_on_pinned_day_does_not_recur() {
        let workspace = TempWorkspace::new();
        {
            let state = ready_state(&workspace).await;
            toggle_pin_day_impl(&state, Day::Monday).await.expect("pin");
            let added = add(&state, Day::Monday, "09:00", "10:00").await;
            assert!(added.is_persistent);

            assert!(undo_impl(&state).await.expect("undo"));
            assert!(get_view_impl(&state).expect("view").entries.is_empty());

            let next = change_week_impl(&state, 1).await.expect("next week");
            assert!(next.entries.is_empty());
            let back = change_week_impl(&state, -1).await.expect("back");
            assert!(back.entries.is_empty());
        }

        let state = ready_state(&workspace).await;
        let later = navigate_week_impl(&state, WeekRef::new(2025, 12)).await.expect("week 12");
        assert!(later.entries.is_empty());
    }

    #[tokio::test]
    async fn redone_add_on_pinned_day_recurs_again() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        toggle_pin_day_impl(&state, Day::Monday).await.expect("pin");
        let added = add(&state, Day::Monday, "09:00", "10:00").await;

        undo_impl(&state).await.expect("undo");
        assert!(redo_impl(&state).await.expect("redo"));

        let next = change_week_impl(&state, 1).await.expect("next week");
        assert_eq!(entry_ids(&next), vec![added.id]);
    }

    #[tokio::test]
    async fn undone_delete_lifts_the_week_suppression() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let added = add(&state, Day::Tuesday, "09:00", "10:00").await;
        set_entry_persistence_impl(&state, added.id.clone(), true)
            .await
            .expect("pin entry");

        navigate_week_impl(&state, WeekRef::new(2025, 11)).await.expect("week 11");
        assert!(delete_entry_impl(&state, added.id.clone()).await.expect("delete"));
        assert!(undo_impl(&state).await.expect("undo delete"));

        navigate_week_impl(&state, WeekRef::new(2025, 12)).await.expect("week 12");
        let revisited = navigate_week_impl(&state, WeekRef::new(2025, 11))
            .await
            .expect("week 11 again");
        assert_eq!(entry_ids(&revisited), vec![added.id]);
    }

    #[tokio::test]
    async fn undone_preset_delete_restores_its_series() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let added = add(&state, Day::Monday, "09:00", "10:00").await;
        set_entry_persistence_impl(&state, added.id.clone(), true)
            .await
            .expect("pin entry");

        assert!(delete_preset_impl(&state, "break-1".to_string()).await.expect("delete preset"));
        assert!(undo_impl(&state).await.expect("undo"));

        let next = change_week_impl(&state, 1).await.expect("next week");
        assert_eq!(entry_ids(&next), vec![added.id]);
    }

    #[tokio::test]
    async fn export_writes_reconciled_week() {
        let workspace = TempWorkspace::new();
        let state = ready_state(&workspace).await;
        let first = add(&state, Day::Monday, "09:00", "10:00").await;
        add(&state, Day::Monday, "10:00", "11:00").await;
        select_entry_impl(&state, Some(first.id), false).expect("select");
        duplicate_selection_impl(&state).await.expect("duplicate");

        let path = export_week_impl(&state).expect("export");

        assert!(path.starts_with(state.export_dir()));
        let written = fs::read_to_string(&path).expect("read export");
        assert!(written.contains("09:00 - 10:00,Pause"));
        assert!(written.contains("#64748b,Break,Pause"));
    }
}
