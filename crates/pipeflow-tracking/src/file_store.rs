//! Store de tracking en disco.
//!
//! Layout:
//! - `<root>/experiments.json`: nombre → id.
//! - `<root>/<experiment_id>/<run_id>/run.pb`: el `Run` en formato wire.
//! - `<root>/<experiment_id>/<run_id>/artifacts/`: copias de artifacts.
//!
//! Todas las escrituras pasan por un único mutex; cada actualización reescribe
//! `run.pb` completo vía archivo temporal + rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;

use crate::entities::{Metric, Param, Run, RunData, RunInfo, RunStatus, RunTag};
use crate::error::TrackingError;
use crate::store::{apply_param, apply_status, apply_tag, new_run, select_runs, OrderBy, RunFilter, TrackingStore};

const RUN_FILE: &str = "run.pb";
const EXPERIMENTS_FILE: &str = "experiments.json";

#[derive(Debug)]
pub struct FileTrackingStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileTrackingStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, TrackingError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiments(&self) -> Result<BTreeMap<String, String>, TrackingError> {
        let path = self.root.join(EXPERIMENTS_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.root.join(experiment_id).join(run_id)
    }

    fn find_run_file(&self, run_id: &str) -> Result<PathBuf, TrackingError> {
        for exp in self.experiments()?.values() {
            let candidate = self.run_dir(exp, run_id).join(RUN_FILE);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(TrackingError::NotFound(run_id.to_string()))
    }

    fn read_run(path: &Path) -> Result<Run, TrackingError> {
        Ok(Run::from_wire(&fs::read(path)?)?)
    }

    fn write_run(&self, run: &Run) -> Result<(), TrackingError> {
        let dir = self.run_dir(&run.info.experiment_id, &run.info.run_id);
        fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!("{RUN_FILE}.tmp"));
        fs::write(&tmp, run.to_wire())?;
        fs::rename(&tmp, dir.join(RUN_FILE))?;
        Ok(())
    }

    fn update<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> Result<T, TrackingError>) -> Result<T, TrackingError> {
        let _guard = self.lock.lock();
        let path = self.find_run_file(run_id)?;
        let mut run = Self::read_run(&path)?;
        let out = f(&mut run)?;
        self.write_run(&run)?;
        Ok(out)
    }
}

impl TrackingStore for FileTrackingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let _guard = self.lock.lock();
        let mut experiments = self.experiments()?;
        if let Some(id) = experiments.get(name) {
            return Ok(id.clone());
        }
        let id = experiments.len().to_string();
        experiments.insert(name.to_string(), id.clone());
        fs::write(self.root.join(EXPERIMENTS_FILE), serde_json::to_vec_pretty(&experiments)?)?;
        fs::create_dir_all(self.root.join(&id))?;
        debug!("experiment created name={name} id={id}");
        Ok(id)
    }

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>, tags: &[RunTag]) -> Result<RunInfo, TrackingError> {
        let _guard = self.lock.lock();
        let root = format!("file://{}", self.root.display());
        let run = new_run(experiment_id, run_name, tags, &root);
        self.write_run(&run)?;
        Ok(run.info)
    }

    fn log_metric(&self, run_id: &str, metric: Metric) -> Result<(), TrackingError> {
        self.update(run_id, |run| {
                run.data.get_or_insert_with(RunData::default).metrics.push(metric);
                Ok(())
            })
    }

    fn log_param(&self, run_id: &str, param: Param) -> Result<(), TrackingError> {
        self.update(run_id, |run| apply_param(run, param))
    }

    fn set_tag(&self, run_id: &str, tag: RunTag) -> Result<(), TrackingError> {
        self.update(run_id, |run| {
                apply_tag(run, tag);
                Ok(())
            })
    }

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, TrackingError> {
        self.update(run_id, |run| {
                apply_status(run, status, end_time)?;
                Ok(run.info.clone())
            })
    }

    fn get_run(&self, run_id: &str) -> Result<Run, TrackingError> {
        let _guard = self.lock.lock();
        Self::read_run(&self.find_run_file(run_id)?)
    }

    fn search_runs(&self,
                   experiment_ids: &[String],
                   filter: &RunFilter,
                   order_by: Option<&OrderBy>,
                   max_results: usize)
                   -> Result<Vec<Run>, TrackingError> {
        let _guard = self.lock.lock();
        let mut runs = Vec::new();
        for exp in experiment_ids {
            let dir = self.root.join(exp);
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path().join(RUN_FILE);
                if path.is_file() {
                    runs.push(Self::read_run(&path)?);
                }
            }
        }
        Ok(select_runs(runs, experiment_ids, filter, order_by, max_results))
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<PathBuf, TrackingError> {
        let _guard = self.lock.lock();
        let run_file = self.find_run_file(run_id)?;
        let artifacts = run_file.parent().map(|p| p.join("artifacts")).ok_or_else(|| TrackingError::NotFound(run_id.to_string()))?;
        fs::create_dir_all(&artifacts)?;
        let file_name = local_path.file_name().ok_or_else(|| TrackingError::InvalidState(format!("not a file: {}", local_path.display())))?;
        let dest = artifacts.join(file_name);
        fs::copy(local_path, &dest)?;
        Ok(dest)
    }
}
