use crate::domain::time::{Span, parse_hhmm, week_start};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Day {
    #[serde(rename = "MO")]
    Monday,
    #[serde(rename = "DI")]
    Tuesday,
    #[serde(rename = "MI")]
    Wednesday,
    #[serde(rename = "DO")]
    Thursday,
    #[serde(rename = "FR")]
    Friday,
    #[serde(rename = "SA")]
    Saturday,
    #[serde(rename = "SO")]
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Monday => "MO",
            Self::Tuesday => "DI",
            Self::Wednesday => "MI",
            Self::Thursday => "DO",
            Self::Friday => "FR",
            Self::Saturday => "SA",
            Self::Sunday => "SO",
        }
    }

    /// Zero-based offset from Monday.
    pub fn index(self) -> u32 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|day| day.code() == normalized.as_str())
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BlockCategory {
    ProjectInt,
    ProjectExt,
    SchoolReg,
    SchoolUk,
    #[serde(rename = "weiterbildung")]
    FurtherEducation,
    Break,
}

impl BlockCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::ProjectInt => "Project (Int)",
            Self::ProjectExt => "Project (Ext)",
            Self::SchoolReg => "School",
            Self::SchoolUk => "Inter-company course",
            Self::FurtherEducation => "Further education",
            Self::Break => "Break",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(alias = "type")]
    pub category: BlockCategory,
}

impl TimeBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "preset.id")?;
        validate_non_empty(&self.name, "preset.name")?;
        validate_color(&self.color, "preset.color")
    }
}

/// ISO week reference. Ordering is `(year, week)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekRef {
    pub year: i32,
    pub week: u32,
}

impl WeekRef {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }
}

impl fmt::Display for WeekRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub block_id: String,
    pub day: Day,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_persistent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<WeekRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_preset_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_preset_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_preset_id: Option<String>,
}

impl ScheduleEntry {
    pub fn new(
        id: impl Into<String>,
        block_id: impl Into<String>,
        day: Day,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            block_id: block_id.into(),
            day,
            start_time: start_time.into(),
            end_time: end_time.into(),
            is_persistent: false,
            valid_from: None,
            day_preset_color: None,
            day_preset_group_id: None,
            day_preset_id: None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        Span::of(&self.start_time, &self.end_time)
    }

    pub fn is_in_group(&self, group_id: &str) -> bool {
        self.day_preset_group_id.as_deref() == Some(group_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "entry.id")?;
        validate_non_empty(&self.block_id, "entry.block_id")?;
        validate_hhmm(&self.start_time, "entry.start_time")?;
        validate_hhmm(&self.end_time, "entry.end_time")?;
        if self.span().is_none() {
            return Err("entry.end_time must be after entry.start_time".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlan {
    pub week_number: u32,
    pub year: i32,
    pub start_date: String,
    pub entries: Vec<ScheduleEntry>,
}

impl WeekPlan {
    pub fn empty(week: WeekRef) -> Self {
        Self {
            week_number: week.week,
            year: week.year,
            start_date: week_start(week)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            entries: Vec::new(),
        }
    }

    pub fn week_ref(&self) -> WeekRef {
        WeekRef::new(self.year, self.week_number)
    }
}

/// Week-scoped suppression of one recurring `(day, start_time)` slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPersistentSlot {
    pub day: Day,
    pub start_time: String,
    pub deleted_in_week: WeekRef,
}

impl DeletedPersistentSlot {
    pub fn matches(&self, day: Day, start_time: &str, week: WeekRef) -> bool {
        self.day == day && self.start_time == start_time && self.deleted_in_week == week
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    pub block_id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_preset_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_preset_group_id: Option<String>,
}

impl TemplateEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.block_id, "template.block_id")?;
        validate_hhmm(&self.start_time, "template.start_time")?;
        validate_hhmm(&self.end_time, "template.end_time")?;
        if Span::of(&self.start_time, &self.end_time).is_none() {
            return Err("template.end_time must be after template.start_time".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayPreset {
    pub id: String,
    pub name: String,
    pub color: String,
    pub entries: Vec<TemplateEntry>,
}

impl DayPreset {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "day_preset.id")?;
        validate_non_empty(&self.name, "day_preset.name")?;
        validate_color(&self.color, "day_preset.color")?;
        for entry in &self.entries {
            entry.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub work_days: Vec<Day>,
    pub day_start: String,
    pub day_end: String,
    #[serde(default)]
    pub pinned_days: Vec<Day>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_days: vec![
                Day::Monday,
                Day::Tuesday,
                Day::Wednesday,
                Day::Thursday,
                Day::Friday,
            ],
            day_start: "08:00".to_string(),
            day_end: "17:00".to_string(),
            pinned_days: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.day_start, "settings.day_start")?;
        validate_hhmm(&self.day_end, "settings.day_end")?;
        if self.day_window().is_none() {
            return Err("settings.day_end must be after settings.day_start".to_string());
        }
        if self.work_days.is_empty() {
            return Err("settings.work_days must not be empty".to_string());
        }
        Ok(())
    }

    pub fn day_window(&self) -> Option<Span> {
        Span::of(&self.day_start, &self.day_end)
    }

    pub fn is_pinned(&self, day: Day) -> bool {
        self.pinned_days.contains(&day)
    }

    pub fn contains(&self, span: Span) -> bool {
        self.day_window()
            .map(|window| window.start <= span.start && span.end <= window.end)
            .unwrap_or(false)
    }
}

/// Undoable application state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerSnapshot {
    pub week_plan: WeekPlan,
    pub presets: Vec<TimeBlock>,
    pub day_presets: Vec<DayPreset>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    parse_hhmm(value)
        .map(|_| ())
        .ok_or_else(|| format!("{field_name} must be HH:MM"))
}

fn validate_color(value: &str, field_name: &str) -> Result<(), String> {
    let Some(hex) = value.strip_prefix('#') else {
        return Err(format!("{field_name} must be #RRGGBB"));
    };
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{field_name} must be #RRGGBB"));
    }
    Ok(())
}
