use crate::domain::models::{Day, DeletedPersistentSlot, ScheduleEntry, WeekRef, next_id};
use crate::domain::time::{SLOT_MINUTES, Span, minutes_to_time};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntryMove {
    pub id: String,
    pub day: Day,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub removed: Vec<String>,
    pub clipped: Vec<String>,
}

enum Resolution {
    Keep,
    Remove,
    ClipStart(u32),
    ClipEnd(u32),
}

fn resolve_against(updated: Span, other: Span) -> Resolution {
    if !updated.overlaps(&other) {
        return Resolution::Keep;
    }
    if updated.covers(&other) {
        return Resolution::Remove;
    }
    if updated.start <= other.start {
        if other.end - updated.end < SLOT_MINUTES {
            return Resolution::Remove;
        }
        return Resolution::ClipStart(updated.end);
    }
    if updated.end >= other.end {
        if updated.start - other.start < SLOT_MINUTES {
            return Resolution::Remove;
        }
        return Resolution::ClipEnd(updated.start);
    }
    // Strictly inside the other entry.
    Resolution::Remove
}

/// Entries of the viewed week plus the recurrence tombstones.
#[derive(Debug, Clone)]
pub struct EntryStore {
    week: WeekRef,
    entries: Vec<ScheduleEntry>,
    tombstones: Vec<DeletedPersistentSlot>,
    pinned_days: BTreeSet<Day>,
}

impl EntryStore {
    pub fn new(
        week: WeekRef,
        entries: Vec<ScheduleEntry>,
        tombstones: Vec<DeletedPersistentSlot>,
        pinned_days: &[Day],
    ) -> Self {
        Self {
            week,
            entries,
            tombstones,
            pinned_days: pinned_days.iter().copied().collect(),
        }
    }

    pub fn week(&self) -> WeekRef {
        self.week
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn tombstones(&self) -> &[DeletedPersistentSlot] {
        &self.tombstones
    }

    pub fn entry(&self, id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn into_parts(self) -> (Vec<ScheduleEntry>, Vec<DeletedPersistentSlot>) {
        (self.entries, self.tombstones)
    }

    /// Inserts `entry`, evicting every same-day entry it overlaps. Returns the evicted ids.
    pub fn add_entry(&mut self, mut entry: ScheduleEntry) -> Vec<String> {
        if self.pinned_days.contains(&entry.day) {
            entry.is_persistent = true;
            if entry.valid_from.is_none() {
                entry.valid_from = Some(self.week);
            }
        }

        let day = entry.day;
        let id = entry.id.clone();
        let removed = match entry.span() {
            Some(span) => self.remove_where(|existing| {
                existing.id == id
                    || (existing.day == day
                        && existing.span().is_some_and(|other| other.overlaps(&span)))
            }),
            None => self.remove_where(|existing| existing.id == id),
        };
        self.entries.push(entry);

        removed
            .into_iter()
            .filter(|existing| existing.id != id)
            .map(|existing| existing.id)
            .collect()
    }

    pub fn delete_entry(&mut self, id: &str) -> Option<ScheduleEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        let removed = self.entries.remove(index);
        if removed.is_persistent {
            self.record_tombstone(removed.day, &removed.start_time);
        }
        if let Some(group_id) = removed.day_preset_group_id.as_deref() {
            self.split_group(group_id);
        }
        Some(removed)
    }

    pub fn delete_group(&mut self, group_id: &str) -> Vec<ScheduleEntry> {
        let removed = self.remove_where(|entry| entry.is_in_group(group_id));
        for entry in removed.iter().filter(|entry| entry.is_persistent) {
            self.record_tombstone(entry.day, &entry.start_time);
        }
        removed
    }

    /// Replaces an entry in place and resolves its overlaps with same-day neighbours.
    pub fn update_entry(&mut self, mut entry: ScheduleEntry) -> Option<UpdateOutcome> {
        let index = self.entries.iter().position(|existing| existing.id == entry.id)?;
        if entry.is_persistent && !self.entries[index].is_persistent && entry.valid_from.is_none() {
            entry.valid_from = Some(self.week);
        }

        let mut outcome = UpdateOutcome::default();
        let Some(span) = entry.span() else {
            self.entries[index] = entry;
            return Some(outcome);
        };

        let day = entry.day;
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut removed = Vec::new();
        for (position, mut existing) in std::mem::take(&mut self.entries).into_iter().enumerate() {
            if position == index {
                kept.push(entry.clone());
                continue;
            }
            let Some(other) = existing.span().filter(|_| existing.day == day) else {
                kept.push(existing);
                continue;
            };
            match resolve_against(span, other) {
                Resolution::Keep => kept.push(existing),
                Resolution::Remove => removed.push(existing),
                Resolution::ClipStart(start) => {
                    existing.start_time = minutes_to_time(start);
                    outcome.clipped.push(existing.id.clone());
                    kept.push(existing);
                }
                Resolution::ClipEnd(end) => {
                    existing.end_time = minutes_to_time(end);
                    outcome.clipped.push(existing.id.clone());
                    kept.push(existing);
                }
            }
        }
        self.entries = kept;

        for existing in removed {
            if existing.is_persistent {
                self.record_tombstone(existing.day, &existing.start_time);
            }
            outcome.removed.push(existing.id);
        }
        Some(outcome)
    }

    /// Applies all moves as one step: targets are computed first, then non-moving entries
    /// overlapping any target are dropped, then coordinates are rewritten.
    pub fn move_entries(&mut self, moves: &[EntryMove]) -> Vec<ScheduleEntry> {
        let known: HashSet<String> = self.entries.iter().map(|entry| entry.id.clone()).collect();
        let moves: HashMap<&str, &EntryMove> = moves
            .iter()
            .filter(|entry_move| known.contains(&entry_move.id))
            .map(|entry_move| (entry_move.id.as_str(), entry_move))
            .collect();
        if moves.is_empty() {
            return Vec::new();
        }

        let targets: Vec<(Day, Span)> = moves
            .values()
            .filter_map(|entry_move| {
                Span::of(&entry_move.start_time, &entry_move.end_time)
                    .map(|span| (entry_move.day, span))
            })
            .collect();

        let removed = self.remove_where(|existing| {
            if moves.contains_key(existing.id.as_str()) {
                return false;
            }
            existing.span().is_some_and(|span| {
                targets
                    .iter()
                    .any(|(day, target)| *day == existing.day && target.overlaps(&span))
            })
        });

        for entry in &mut self.entries {
            if let Some(entry_move) = moves.get(entry.id.as_str()) {
                entry.day = entry_move.day;
                entry.start_time = entry_move.start_time.clone();
                entry.end_time = entry_move.end_time.clone();
            }
        }
        removed
    }

    /// Clones the given entries at the same coordinates. Each source group gets one fresh group id.
    pub fn duplicate(&mut self, ids: &[String]) -> Vec<String> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let sources: Vec<ScheduleEntry> = self
            .entries
            .iter()
            .filter(|entry| wanted.contains(entry.id.as_str()))
            .cloned()
            .collect();

        let mut fresh_groups: HashMap<String, String> = HashMap::new();
        let mut created = Vec::with_capacity(sources.len());
        for mut copy in sources {
            copy.id = next_id("ent");
            if let Some(source_group) = copy.day_preset_group_id.take() {
                let group_id = fresh_groups
                    .entry(source_group)
                    .or_insert_with(|| next_id("grp"))
                    .clone();
                copy.day_preset_group_id = Some(group_id);
            }
            created.push(copy.id.clone());
            self.entries.push(copy);
        }
        created
    }

    /// Pin cascade: every entry of `day` takes the new persistence flag.
    pub fn set_day_persistence(&mut self, day: Day, persistent: bool) -> usize {
        if persistent {
            self.pinned_days.insert(day);
        } else {
            self.pinned_days.remove(&day);
        }

        let week = self.week;
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|entry| entry.day == day) {
            if entry.is_persistent != persistent {
                changed += 1;
            }
            entry.is_persistent = persistent;
            if persistent && entry.valid_from.is_none() {
                entry.valid_from = Some(week);
            }
        }
        changed
    }

    pub fn remove_by_block(&mut self, block_id: &str) -> Vec<ScheduleEntry> {
        self.remove_where(|entry| entry.block_id == block_id)
    }

    pub fn unlink_day_preset(&mut self, preset_id: &str) -> usize {
        let mut unlinked = 0;
        for entry in &mut self.entries {
            if entry.day_preset_id.as_deref() == Some(preset_id) {
                entry.day_preset_id = None;
                entry.day_preset_group_id = None;
                entry.day_preset_color = None;
                unlinked += 1;
            }
        }
        unlinked
    }

    fn record_tombstone(&mut self, day: Day, start_time: &str) {
        let week = self.week;
        self.tombstones
            .retain(|slot| !slot.matches(day, start_time, week));
        self.tombstones.push(DeletedPersistentSlot {
            day,
            start_time: start_time.to_string(),
            deleted_in_week: week,
        });
    }

    fn split_group(&mut self, group_id: &str) {
        let mut members: Vec<(usize, Option<Span>)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_in_group(group_id))
            .map(|(index, entry)| (index, entry.span()))
            .collect();
        if members.len() < 2 {
            return;
        }
        members.sort_by_key(|(_, span)| span.map(|span| span.start).unwrap_or(u32::MAX));

        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut previous_end: Option<u32> = None;
        for (index, span) in members {
            let contiguous = matches!((previous_end, span), (Some(end), Some(span)) if end == span.start);
            match runs.last_mut() {
                Some(run) if contiguous => run.push(index),
                _ => runs.push(vec![index]),
            }
            previous_end = span.map(|span| span.end);
        }
        if runs.len() < 2 {
            return;
        }

        for run in runs {
            let fresh = next_id("grp");
            for index in run {
                self.entries[index].day_preset_group_id = Some(fresh.clone());
            }
        }
    }

    fn remove_where(&mut self, predicate: impl Fn(&ScheduleEntry) -> bool) -> Vec<ScheduleEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| predicate(entry));
        self.entries = kept;
        removed
    }
}

/// Replays entries in order so later entries evict earlier overlapping ones.
pub fn reconciled(entries: &[ScheduleEntry]) -> Vec<ScheduleEntry> {
    let mut result: Vec<ScheduleEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(span) = entry.span() {
            result.retain(|existing| {
                existing.day != entry.day || !existing.span().is_some_and(|other| other.overlaps(&span))
            });
        }
        result.push(entry.clone());
    }
    result
}
