use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::model::{Activity, ActivityType, FamilyMember};
use crate::schedule::{Schedule, default_activity_types, default_members};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub activities_path: PathBuf,
    pub members_path: PathBuf,
    pub types_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivitiesFile {
    #[serde(default)]
    activities: Vec<Activity>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let activities_path = data_dir.join("activities.json");
        let members_path = data_dir.join("members.json");
        let types_path = data_dir.join("activity_types.json");

        info!(
            data_dir = %data_dir.display(),
            activities = %activities_path.display(),
            members = %members_path.display(),
            types = %types_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            activities_path,
            members_path,
            types_path,
        })
    }

    /// Missing files fall back to an empty activity list and the default
    /// members and types.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Schedule> {
        Ok(Schedule {
            activities: self.load_activities()?,
            family_members: self.load_members()?,
            activity_types: self.load_activity_types()?,
        })
    }

    #[tracing::instrument(skip(self, schedule, now))]
    pub fn save(&self, schedule: &Schedule, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.save_activities(&schedule.activities, now)?;
        self.save_members(&schedule.family_members)?;
        self.save_activity_types(&schedule.activity_types)?;
        info!(
            activities = schedule.activities.len(),
            members = schedule.family_members.len(),
            types = schedule.activity_types.len(),
            "saved schedule"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_activities(&self) -> anyhow::Result<Vec<Activity>> {
        let file: Option<ActivitiesFile> =
            load_json(&self.activities_path).context("failed to load activities.json")?;
        Ok(file.map(|f| f.activities).unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_members(&self) -> anyhow::Result<Vec<FamilyMember>> {
        let members = load_json(&self.members_path).context("failed to load members.json")?;
        Ok(members.unwrap_or_else(default_members))
    }

    #[tracing::instrument(skip(self))]
    pub fn load_activity_types(&self) -> anyhow::Result<Vec<ActivityType>> {
        let types =
            load_json(&self.types_path).context("failed to load activity_types.json")?;
        Ok(types.unwrap_or_else(default_activity_types))
    }

    #[tracing::instrument(skip(self, activities, now))]
    pub fn save_activities(&self, activities: &[Activity], now: DateTime<Utc>) -> anyhow::Result<()> {
        let file = ActivitiesFile {
            activities: activities.to_vec(),
            last_updated: Some(now),
        };
        save_json_atomic(&self.activities_path, &file).context("failed to save activities.json")
    }

    #[tracing::instrument(skip(self, members))]
    pub fn save_members(&self, members: &[FamilyMember]) -> anyhow::Result<()> {
        save_json_atomic(&self.members_path, members).context("failed to save members.json")
    }

    #[tracing::instrument(skip(self, types))]
    pub fn save_activity_types(&self, types: &[ActivityType]) -> anyhow::Result<()> {
        save_json_atomic(&self.types_path, types).context("failed to save activity_types.json")
    }
}

#[tracing::instrument(skip(path))]
fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        debug!(file = %path.display(), "no file yet; using defaults");
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    debug!(file = %path.display(), bytes = raw.len(), "loaded json");
    Ok(Some(value))
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
