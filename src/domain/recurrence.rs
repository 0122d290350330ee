use crate::domain::models::{DeletedPersistentSlot, ScheduleEntry, WeekPlan, WeekRef};
use std::collections::HashSet;

/// A persistent entry recurs in every week at or after its `valid_from`.
pub fn is_eligible(entry: &ScheduleEntry, week: WeekRef) -> bool {
    match entry.valid_from {
        None => true,
        Some(valid_from) => week >= valid_from,
    }
}

pub fn is_suppressed(
    entry: &ScheduleEntry,
    week: WeekRef,
    tombstones: &[DeletedPersistentSlot],
) -> bool {
    tombstones
        .iter()
        .any(|slot| slot.matches(entry.day, &entry.start_time, week))
}

pub fn candidates<'a>(
    pool: &'a [ScheduleEntry],
    week: WeekRef,
    tombstones: &[DeletedPersistentSlot],
) -> Vec<&'a ScheduleEntry> {
    pool.iter()
        .filter(|entry| entry.is_persistent)
        .filter(|entry| is_eligible(entry, week))
        .filter(|entry| !is_suppressed(entry, week, tombstones))
        .collect()
}

/// Materializes the entries of `week`: the saved plan (if any) plus recurring pool entries
/// it does not already contain. Candidates colliding with an entry already placed are skipped.
pub fn resolve_week(
    week: WeekRef,
    saved: Option<WeekPlan>,
    pool: &[ScheduleEntry],
    tombstones: &[DeletedPersistentSlot],
) -> WeekPlan {
    let mut plan = match saved {
        Some(plan) => WeekPlan {
            week_number: week.week,
            year: week.year,
            ..plan
        },
        None => WeekPlan::empty(week),
    };
    if plan.start_date.is_empty() {
        plan.start_date = WeekPlan::empty(week).start_date;
    }

    let mut present: HashSet<String> = plan.entries.iter().map(|entry| entry.id.clone()).collect();
    for candidate in candidates(pool, week, tombstones) {
        if present.contains(&candidate.id) {
            continue;
        }
        let collides = candidate.span().is_some_and(|span| {
            plan.entries.iter().any(|existing| {
                existing.day == candidate.day
                    && existing.span().is_some_and(|other| other.overlaps(&span))
            })
        });
        if collides {
            continue;
        }
        present.insert(candidate.id.clone());
        plan.entries.push(candidate.clone());
    }
    plan
}

/// Brings the pool in line with a committed change of the viewed week's entries.
/// Deleted instances stay in the pool; their suppression is week-scoped.
pub fn sync_pool(
    pool: &mut Vec<ScheduleEntry>,
    before: &[ScheduleEntry],
    after: &[ScheduleEntry],
) -> bool {
    let mut changed = false;

    for entry in after {
        let previous = before.iter().find(|candidate| candidate.id == entry.id);
        if previous == Some(entry) {
            continue;
        }
        let slot = pool.iter().position(|pooled| pooled.id == entry.id);
        match (entry.is_persistent, slot) {
            (true, Some(index)) => {
                if pool[index] != *entry {
                    pool[index] = entry.clone();
                    changed = true;
                }
            }
            (true, None) => {
                pool.push(entry.clone());
                changed = true;
            }
            (false, Some(index)) => {
                if previous.is_some_and(|previous| previous.is_persistent) {
                    pool.remove(index);
                    changed = true;
                }
            }
            (false, None) => {}
        }
    }
    changed
}

pub fn prune_pool_block(pool: &mut Vec<ScheduleEntry>, block_id: &str) -> bool {
    let before = pool.len();
    pool.retain(|entry| entry.block_id != block_id);
    pool.len() != before
}
