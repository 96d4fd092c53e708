#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::colony::ColonyState;
use crate::error::ColonyError;

pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub saved_at: String,
    pub state: ColonyState,
}

/// Whole-colony snapshot on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct StateStorage {
    path: PathBuf,
}

impl StateStorage {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, state: &ColonyState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir {}", parent.display()))?;
        }
        let file = StateFile {
            version: STATE_FORMAT_VERSION,
            saved_at: now_rfc3339(),
            state: state.clone(),
        };
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&file)?;
        std::fs::write(&tmp, &data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to rename {} -> {}", tmp.display(), self.path.display())
        })?;
        Ok(())
    }

    pub fn load_file(&self) -> anyhow::Result<StateFile> {
        if !self.path.exists() {
            return Err(ColonyError::StateNotFound(self.path.clone()).into());
        }
        let data = std::fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: StateFile = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        if file.version != STATE_FORMAT_VERSION {
            return Err(ColonyError::StateVersion {
                path: self.path.clone(),
                found: file.version,
                expected: STATE_FORMAT_VERSION,
            }
            .into());
        }
        Ok(file)
    }

    pub fn load(&self) -> anyhow::Result<ColonyState> {
        Ok(self.load_file()?.state)
    }

    /// Fresh state when nothing has been saved yet.
    pub fn load_or_default(&self) -> anyhow::Result<ColonyState> {
        if !self.path.exists() {
            return Ok(ColonyState::default());
        }
        self.load()
    }

    pub fn delete(&self) -> anyhow::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ColonyError::IoPath {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TickContext;
    use crate::task::engine::TaskEngine;
    use crate::task::model::{TaskParams, TaskSpec};
    use crate::world::{Position, SimWorld};

    fn sample_state() -> ColonyState {
        let world = SimWorld::new();
        let ctx = TickContext::new(42, &world);
        let mut engine = TaskEngine::new(Default::default(), Default::default());
        let id = engine.create_task(
            &ctx,
            TaskSpec::new(
                "W1N1",
                TaskParams::Upgrade {
                    controller_id: "ctrl".to_owned(),
                    pos: Position::new(20, 20, "W1N1"),
                },
            ),
        );
        assert!(engine.assign_task(&ctx, &id, "w1"));
        ColonyState {
            tick: 42,
            tasks: engine.into_registry(),
            ..ColonyState::default()
        }
    }

    #[test]
    fn save_then_load_restores_indexes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StateStorage::new(dir.path().join("nested").join("state.json"));
        let state = sample_state();

        storage.save(&state).unwrap();
        assert!(!storage.path().with_extension("json.tmp").exists());

        let file = storage.load_file().unwrap();
        assert_eq!(file.version, STATE_FORMAT_VERSION);
        assert!(!file.saved_at.is_empty());
        assert_eq!(file.state.tick, 42);
        let room = &file.state.tasks.rooms["W1N1"];
        assert_eq!(room.creep_tasks.len(), 1);
        assert_eq!(room.counters.tasks_created, 1);
        assert_eq!(file.state.tasks, state.tasks);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StateStorage::new(dir.path().join("state.json"));
        let err = storage.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColonyError>(),
            Some(ColonyError::StateNotFound(_))
        ));
        assert_eq!(storage.load_or_default().unwrap().tick, 0);
        assert!(!storage.delete().unwrap());
    }

    #[test]
    fn unknown_task_type_fails_the_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StateStorage::new(dir.path().join("state.json"));
        storage.save(&sample_state()).unwrap();

        let raw = std::fs::read_to_string(storage.path()).unwrap();
        std::fs::write(storage.path(), raw.replace("\"upgrade\"", "\"juggle\"")).unwrap();
        assert!(storage.load().is_err());
    }

    #[test]
    fn other_format_versions_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StateStorage::new(dir.path().join("state.json"));
        storage.save(&sample_state()).unwrap();

        let raw = std::fs::read_to_string(storage.path()).unwrap();
        std::fs::write(storage.path(), raw.replacen("\"version\": 1", "\"version\": 9", 1)).unwrap();
        let err = storage.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColonyError>(),
            Some(ColonyError::StateVersion { found: 9, .. })
        ));
    }
}
