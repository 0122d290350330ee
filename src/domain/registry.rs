use crate::domain::entry_store::EntryStore;
use crate::domain::models::{
    BlockCategory, Day, DayPreset, ScheduleEntry, TemplateEntry, TimeBlock, next_id,
};

pub const DEFAULT_DAY_PRESET_COLOR: &str = "#6366f1";

pub fn default_presets() -> Vec<TimeBlock> {
    vec![TimeBlock {
        id: "break-1".to_string(),
        name: "Pause".to_string(),
        color: "#64748b".to_string(),
        category: BlockCategory::Break,
    }]
}

/// Appends `preset`, replacing an existing preset with the same id.
pub fn add_preset(presets: &mut Vec<TimeBlock>, preset: TimeBlock) {
    match presets.iter_mut().find(|existing| existing.id == preset.id) {
        Some(existing) => *existing = preset,
        None => presets.push(preset),
    }
}

pub fn update_preset(presets: &mut [TimeBlock], preset: TimeBlock) -> bool {
    match presets.iter_mut().find(|existing| existing.id == preset.id) {
        Some(existing) => {
            *existing = preset;
            true
        }
        None => false,
    }
}

/// Removes the preset and every entry of the viewed week that uses it.
pub fn delete_preset(
    presets: &mut Vec<TimeBlock>,
    store: &mut EntryStore,
    preset_id: &str,
) -> Vec<ScheduleEntry> {
    presets.retain(|preset| preset.id != preset_id);
    store.remove_by_block(preset_id)
}

pub fn add_day_preset(day_presets: &mut Vec<DayPreset>, preset: DayPreset) {
    match day_presets.iter_mut().find(|existing| existing.id == preset.id) {
        Some(existing) => *existing = preset,
        None => day_presets.push(preset),
    }
}

pub fn update_day_preset(day_presets: &mut [DayPreset], preset: DayPreset) -> bool {
    match day_presets.iter_mut().find(|existing| existing.id == preset.id) {
        Some(existing) => {
            *existing = preset;
            true
        }
        None => false,
    }
}

/// Removes the day preset; entries it created lose their link, group and stored color.
pub fn delete_day_preset(
    day_presets: &mut Vec<DayPreset>,
    store: &mut EntryStore,
    preset_id: &str,
) -> usize {
    day_presets.retain(|preset| preset.id != preset_id);
    store.unlink_day_preset(preset_id)
}

pub fn block_color<'a>(entry: &ScheduleEntry, presets: &'a [TimeBlock]) -> Option<&'a str> {
    presets
        .iter()
        .find(|preset| preset.id == entry.block_id)
        .map(|preset| preset.color.as_str())
}

/// Live day preset color when the link resolves, else the color stored on the entry.
pub fn border_color<'a>(entry: &'a ScheduleEntry, day_presets: &'a [DayPreset]) -> Option<&'a str> {
    entry
        .day_preset_id
        .as_deref()
        .and_then(|id| day_presets.iter().find(|preset| preset.id == id))
        .map(|preset| preset.color.as_str())
        .or(entry.day_preset_color.as_deref())
}

pub fn template_name(day: Day, existing: &[DayPreset]) -> String {
    let base = format!("{} Template", day.code());
    let taken = existing
        .iter()
        .filter(|preset| preset.name.starts_with(&base))
        .count();
    if taken == 0 {
        base
    } else {
        format!("{base} ({})", taken + 1)
    }
}

/// Captures the entries of `day` as a new day preset. `None` when the day is empty.
pub fn save_day_as_preset(
    entries: &[ScheduleEntry],
    day: Day,
    existing: &[DayPreset],
) -> Option<DayPreset> {
    let templates: Vec<TemplateEntry> = entries
        .iter()
        .filter(|entry| entry.day == day)
        .map(|entry| TemplateEntry {
            block_id: entry.block_id.clone(),
            start_time: entry.start_time.clone(),
            end_time: entry.end_time.clone(),
            day_preset_color: entry.day_preset_color.clone(),
            day_preset_group_id: entry.day_preset_group_id.clone(),
        })
        .collect();
    if templates.is_empty() {
        return None;
    }

    Some(DayPreset {
        id: next_id("dp"),
        name: template_name(day, existing),
        color: DEFAULT_DAY_PRESET_COLOR.to_string(),
        entries: templates,
    })
}

/// Builds concrete entries for `day` from a day preset, all sharing one fresh group id.
pub fn materialize_day_preset(preset: &DayPreset, day: Day) -> Vec<ScheduleEntry> {
    let group_id = next_id("grp");
    preset
        .entries
        .iter()
        .map(|template| ScheduleEntry {
            id: next_id("ent"),
            block_id: template.block_id.clone(),
            day,
            start_time: template.start_time.clone(),
            end_time: template.end_time.clone(),
            is_persistent: false,
            valid_from: None,
            day_preset_color: Some(preset.color.clone()),
            day_preset_group_id: Some(group_id.clone()),
            day_preset_id: Some(preset.id.clone()),
        })
        .collect()
}

pub fn drop_day_preset(store: &mut EntryStore, preset: &DayPreset, day: Day) -> Vec<String> {
    materialize_day_preset(preset, day)
        .into_iter()
        .map(|entry| {
            let id = entry.id.clone();
            store.add_entry(entry);
            id
        })
        .collect()
}
