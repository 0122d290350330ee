use crate::domain::models::{Settings, TimeBlock, WeekPlan};
use crate::domain::week_sheet::build_week_sheet;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ExportSink: Send + Sync {
    fn export(
        &self,
        plan: &WeekPlan,
        presets: &[TimeBlock],
        settings: &Settings,
    ) -> Result<PathBuf, InfraError>;
}

#[derive(Debug, Clone)]
pub struct CsvExportSink {
    export_dir: PathBuf,
}

impl CsvExportSink {
    pub fn new(export_dir: impl AsRef<Path>) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }
}

impl ExportSink for CsvExportSink {
    fn export(
        &self,
        plan: &WeekPlan,
        presets: &[TimeBlock],
        settings: &Settings,
    ) -> Result<PathBuf, InfraError> {
        let sheet = build_week_sheet(plan, presets, settings).map_err(InfraError::Export)?;
        fs::create_dir_all(&self.export_dir)?;
        let path = self.export_dir.join(format!("{}.csv", sheet.file_stem));

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)?;
        writer.write_record([sheet.title.as_str()])?;
        writer.write_record([""])?;
        writer.write_record(&sheet.header)?;
        for row in &sheet.rows {
            let mut record = vec![row.label.clone()];
            record.extend(row.cells.iter().map(|cell| cell.clone().unwrap_or_default()));
            writer.write_record(&record)?;
        }

        if !sheet.legend.is_empty() {
            writer.write_record([""])?;
            writer.write_record(["Legend"])?;
            for item in &sheet.legend {
                writer.write_record([&item.color, &item.category, &item.name])?;
            }
        }
        writer.flush()?;
        Ok(path)
    }
}
