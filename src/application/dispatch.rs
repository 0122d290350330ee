use crate::domain::entry_store::EntryMove;
use crate::domain::models::{Day, ScheduleEntry, Settings};
use crate::domain::time::{SLOT_MINUTES, Span, minutes_to_time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Height of one 60-minute slot on the grid.
pub const SLOT_HEIGHT_PX: f64 = 72.0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    /// Without `multi` the selection is emptied first. `None` only clears.
    pub fn select(&mut self, id: Option<&str>, multi: bool) {
        if !multi {
            self.ids.clear();
        }
        let Some(id) = id else {
            return;
        };
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = String>) {
        self.ids = ids.into_iter().collect();
    }

    pub fn retain_existing(&mut self, entries: &[ScheduleEntry]) {
        self.ids
            .retain(|id| entries.iter().any(|entry| &entry.id == id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyCommand {
    Undo,
    Redo,
    Duplicate,
    DeleteSelection,
}

impl KeyCommand {
    pub fn from_input(input: &KeyInput) -> Option<Self> {
        let modifier = input.ctrl || input.meta;
        let key = input.key.to_ascii_lowercase();
        match key.as_str() {
            "z" if modifier && input.shift => Some(Self::Redo),
            "z" if modifier => Some(Self::Undo),
            "y" if modifier => Some(Self::Redo),
            "d" if modifier => Some(Self::Duplicate),
            "delete" | "backspace" => Some(Self::DeleteSelection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragPayload {
    Preset { block_id: String },
    Entry { entry_id: String },
    DayPreset { day_preset_id: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DropTarget {
    pub day: Day,
    /// Vertical pointer offset from the top of the day column's grid.
    pub offset_px: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropAction {
    AddEntry {
        block_id: String,
        day: Day,
        start_time: String,
        end_time: String,
    },
    MoveEntries(Vec<EntryMove>),
    ApplyDayPreset { day_preset_id: String, day: Day },
}

/// Snaps a pointer offset to a slot start in minutes. `None` below the last slot.
pub fn quantize_drop(offset_px: f64, settings: &Settings) -> Option<u32> {
    let window = settings.day_window()?;
    let y = offset_px.max(0.0);
    let grid_height = f64::from(window.duration()) / f64::from(SLOT_MINUTES) * SLOT_HEIGHT_PX;
    if y > grid_height {
        return None;
    }
    let slot = (y / SLOT_HEIGHT_PX).floor() as u32;
    let latest = window.end.saturating_sub(SLOT_MINUTES).max(window.start);
    Some((slot * SLOT_MINUTES + window.start).min(latest))
}

pub fn resolve_drop(
    payload: &DragPayload,
    target: DropTarget,
    settings: &Settings,
    entries: &[ScheduleEntry],
) -> Option<DropAction> {
    if let DragPayload::DayPreset { day_preset_id } = payload {
        return Some(DropAction::ApplyDayPreset {
            day_preset_id: day_preset_id.clone(),
            day: target.day,
        });
    }

    let drop_start = quantize_drop(target.offset_px, settings)?;
    match payload {
        DragPayload::Preset { block_id } => Some(DropAction::AddEntry {
            block_id: block_id.clone(),
            day: target.day,
            start_time: minutes_to_time(drop_start),
            end_time: minutes_to_time(drop_start + SLOT_MINUTES),
        }),
        DragPayload::Entry { entry_id } => {
            move_for_drop(entry_id, drop_start, target.day, settings, entries)
                .map(DropAction::MoveEntries)
        }
        DragPayload::DayPreset { .. } => None,
    }
}

fn move_for_drop(
    entry_id: &str,
    drop_start: u32,
    day: Day,
    settings: &Settings,
    entries: &[ScheduleEntry],
) -> Option<Vec<EntryMove>> {
    let window = settings.day_window()?;
    let dragged = entries.iter().find(|entry| entry.id == entry_id)?;
    let dragged_span = dragged.span()?;

    let members: Vec<(&ScheduleEntry, Span)> = match dragged.day_preset_group_id.as_deref() {
        Some(group_id) => entries
            .iter()
            .filter(|entry| entry.is_in_group(group_id))
            .filter_map(|entry| entry.span().map(|span| (entry, span)))
            .collect(),
        None => vec![(dragged, dragged_span)],
    };
    let group_start = members.iter().map(|(_, span)| span.start).min()?;
    let group_end = members.iter().map(|(_, span)| span.end).max()?;

    let min_offset = i64::from(window.start) - i64::from(group_start);
    let max_offset = i64::from(window.end) - i64::from(group_end);
    let requested = i64::from(drop_start) - i64::from(dragged_span.start);
    let offset = min_offset.max(max_offset.min(requested));

    members
        .into_iter()
        .map(|(entry, span)| {
            let moved = span.shifted(offset)?;
            Some(EntryMove {
                id: entry.id.clone(),
                day,
                start_time: minutes_to_time(moved.start),
                end_time: minutes_to_time(moved.end),
            })
        })
        .collect()
}
