use crate::domain::models::{Settings, TimeBlock, WeekPlan};
use crate::domain::time::{SLOT_MINUTES, day_date, minutes_to_time};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

pub const UNKNOWN_BLOCK_NAME: &str = "Unknown";
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub label: String,
    /// Block name per work day, repeated on every row an entry spans.
    pub cells: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendItem {
    pub color: String,
    pub category: String,
    pub name: String,
}

/// Tabular layout of one week, independent of the output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekSheet {
    pub title: String,
    pub file_stem: String,
    pub header: Vec<String>,
    pub rows: Vec<SheetRow>,
    pub legend: Vec<LegendItem>,
}

pub fn build_week_sheet(
    plan: &WeekPlan,
    presets: &[TimeBlock],
    settings: &Settings,
) -> Result<WeekSheet, String> {
    settings.validate()?;
    let window = settings
        .day_window()
        .ok_or_else(|| "settings.day_window is empty".to_string())?;
    let week = plan.week_ref();

    let first_day = settings
        .work_days
        .iter()
        .min()
        .and_then(|day| day_date(week, *day))
        .ok_or_else(|| format!("week {week} does not exist"))?;
    let last_day = settings
        .work_days
        .iter()
        .max()
        .and_then(|day| day_date(week, *day))
        .ok_or_else(|| format!("week {week} does not exist"))?;

    let mut header = vec!["Time".to_string()];
    header.extend(settings.work_days.iter().map(|day| day.code().to_string()));

    let mut rows = Vec::new();
    let mut slot = window.start;
    while slot < window.end {
        let slot_end = (slot + SLOT_MINUTES).min(window.end);
        rows.push(SheetRow {
            label: format!("{} - {}", minutes_to_time(slot), minutes_to_time(slot_end)),
            cells: vec![None; settings.work_days.len()],
        });
        slot = slot_end;
    }

    for entry in &plan.entries {
        let Some(column) = settings.work_days.iter().position(|day| *day == entry.day) else {
            continue;
        };
        let Some(span) = entry.span() else {
            continue;
        };
        let name = presets
            .iter()
            .find(|preset| preset.id == entry.block_id)
            .map(|preset| preset.name.clone())
            .unwrap_or_else(|| UNKNOWN_BLOCK_NAME.to_string());

        let offset_start = i64::from(span.start) - i64::from(window.start);
        let offset_end = i64::from(span.end) - i64::from(window.start);
        let slot = i64::from(SLOT_MINUTES);
        let first_row = offset_start.div_euclid(slot).max(0);
        let last_row = (offset_end + slot - 1).div_euclid(slot).min(rows.len() as i64);

        for row in first_row..last_row {
            rows[row as usize].cells[column] = Some(name.clone());
        }
    }

    let used: HashSet<&str> = plan
        .entries
        .iter()
        .map(|entry| entry.block_id.as_str())
        .collect();
    let legend = presets
        .iter()
        .filter(|preset| used.contains(preset.id.as_str()))
        .map(|preset| LegendItem {
            color: preset.color.clone(),
            category: preset.category.label().to_string(),
            name: preset.name.clone(),
        })
        .collect();

    Ok(WeekSheet {
        title: format!("W {}, {}", week.week, date_range(first_day, last_day)),
        file_stem: format!("Weekplan_W{}_{}", week.week, week.year),
        header,
        rows,
        legend,
    })
}

fn date_range(first: NaiveDate, last: NaiveDate) -> String {
    if first.year() != last.year() {
        format!("{} - {}", first.format("%-d. %b %Y"), last.format("%-d. %b %Y"))
    } else if first.month() != last.month() {
        format!("{} - {}", first.format("%-d. %b"), last.format("%-d. %b %Y"))
    } else {
        format!("{}. - {}", first.day(), last.format("%-d. %b %Y"))
    }
}
