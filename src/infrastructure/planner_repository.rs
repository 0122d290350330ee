use crate::domain::models::{
    DayPreset, DeletedPersistentSlot, ScheduleEntry, Settings, TimeBlock, WeekPlan, WeekRef,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const SETTINGS_KEY: &str = "settings";
pub const PRESETS_KEY: &str = "presets";
pub const DAY_PRESETS_KEY: &str = "dayPresets";
pub const DELETED_SLOTS_KEY: &str = "deletedPersistentSlots";
pub const PERSISTENT_ENTRIES_KEY: &str = "persistentEntries";

pub fn week_plan_key(week: WeekRef) -> String {
    format!("plan-{}-{}", week.year, week.week)
}

/// Typed access to the planner's keys. Missing keys read as `None` or empty.
#[derive(Clone)]
pub struct PlannerRepository {
    store: Arc<dyn KeyValueStore>,
}

impl PlannerRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, InfraError> {
        match self.store.get(key).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|error| {
                InfraError::Storage(format!("unreadable value under '{key}': {error}"))
            }),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), InfraError> {
        self.store.set(key, serde_json::to_value(value)?).await
    }

    pub async fn settings(&self) -> Result<Option<Settings>, InfraError> {
        self.load(SETTINGS_KEY).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), InfraError> {
        self.save(SETTINGS_KEY, settings).await
    }

    pub async fn presets(&self) -> Result<Option<Vec<TimeBlock>>, InfraError> {
        self.load(PRESETS_KEY).await
    }

    pub async fn save_presets(&self, presets: &[TimeBlock]) -> Result<(), InfraError> {
        self.save(PRESETS_KEY, &presets).await
    }

    pub async fn day_presets(&self) -> Result<Vec<DayPreset>, InfraError> {
        Ok(self.load(DAY_PRESETS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_day_presets(&self, day_presets: &[DayPreset]) -> Result<(), InfraError> {
        self.save(DAY_PRESETS_KEY, &day_presets).await
    }

    pub async fn week_plan(&self, week: WeekRef) -> Result<Option<WeekPlan>, InfraError> {
        self.load(&week_plan_key(week)).await
    }

    pub async fn save_week_plan(&self, plan: &WeekPlan) -> Result<(), InfraError> {
        self.save(&week_plan_key(plan.week_ref()), plan).await
    }

    pub async fn deleted_slots(&self) -> Result<Vec<DeletedPersistentSlot>, InfraError> {
        Ok(self.load(DELETED_SLOTS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_deleted_slots(
        &self,
        slots: &[DeletedPersistentSlot],
    ) -> Result<(), InfraError> {
        self.save(DELETED_SLOTS_KEY, &slots).await
    }

    pub async fn persistent_entries(&self) -> Result<Vec<ScheduleEntry>, InfraError> {
        Ok(self.load(PERSISTENT_ENTRIES_KEY).await?.unwrap_or_default())
    }

    pub async fn save_persistent_entries(
        &self,
        entries: &[ScheduleEntry],
    ) -> Result<(), InfraError> {
        self.save(PERSISTENT_ENTRIES_KEY, &entries).await
    }
}
