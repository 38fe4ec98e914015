//! Where session recordings land and which ones survive.

use std::path::{Path, PathBuf};

use crate::config::RecordingMode;

/// Prefix for recordings of runs with at least one failed test.
const FAILED_PREFIX: &str = "FAILED";
/// Prefix for recordings of runs where every test passed.
const PASSED_PREFIX: &str = "PASSED";

/// Names the in-progress recording and decides its fate at teardown.
#[derive(Debug, Clone)]
pub struct RecordingPlan {
    mode: RecordingMode,
    dir: PathBuf,
    stamp: String,
}

impl RecordingPlan {
    pub fn new(mode: RecordingMode, dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            dir: dir.into(),
            stamp: chrono::Local::now().format("%Y%m%d-%H%M%S").to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != RecordingMode::Skip
    }

    /// File name the recorder writes to while the run is in progress.
    pub fn working_file_name(&self) -> String {
        format!("recording-{}.mp4", self.stamp)
    }

    pub fn working_path(&self) -> PathBuf {
        self.dir.join(self.working_file_name())
    }

    /// Final path for a run with the given outcome, or `None` when the policy
    /// discards it.
    pub fn final_path(&self, failed: bool) -> Option<PathBuf> {
        if !self.mode.keeps(failed) {
            return None;
        }
        let prefix = if failed { FAILED_PREFIX } else { PASSED_PREFIX };
        Some(self.dir.join(format!("{}-{}.mp4", prefix, self.stamp)))
    }

    /// Keep (rename) or discard the recording after the recorder stopped.
    pub fn finalize(&self, failed: bool) -> std::io::Result<Option<PathBuf>> {
        let working = self.working_path();
        if !working.exists() {
            return Ok(None);
        }
        match self.final_path(failed) {
            Some(target) => {
                std::fs::rename(&working, &target)?;
                tracing::info!("Saved session recording to {}", target.display());
                Ok(Some(target))
            }
            None => {
                std::fs::remove_file(&working)?;
                tracing::debug!("Discarded session recording {}", working.display());
                Ok(None)
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_recording(mode: RecordingMode) -> (tempfile::TempDir, RecordingPlan) {
        let dir = tempfile::tempdir().unwrap();
        let plan = RecordingPlan::new(mode, dir.path());
        std::fs::write(plan.working_path(), b"video").unwrap();
        (dir, plan)
    }

    #[test]
    fn failing_run_keeps_recording() {
        let (_dir, plan) = plan_with_recording(RecordingMode::RecordFailing);
        let saved = plan.finalize(true).unwrap().unwrap();
        assert!(saved.exists());
        assert!(saved.file_name().unwrap().to_string_lossy().starts_with("FAILED-"));
        assert!(!plan.working_path().exists());
    }

    #[test]
    fn passing_run_discards_recording() {
        let (_dir, plan) = plan_with_recording(RecordingMode::RecordFailing);
        assert_eq!(plan.finalize(false).unwrap(), None);
        assert!(!plan.working_path().exists());
    }

    #[test]
    fn record_all_keeps_passing_run() {
        let (_dir, plan) = plan_with_recording(RecordingMode::RecordAll);
        let saved = plan.finalize(false).unwrap().unwrap();
        assert!(saved.file_name().unwrap().to_string_lossy().starts_with("PASSED-"));
    }

    #[test]
    fn missing_recording_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RecordingPlan::new(RecordingMode::RecordAll, dir.path());
        assert_eq!(plan.finalize(true).unwrap(), None);
        assert!(!RecordingPlan::new(RecordingMode::Skip, dir.path()).is_enabled());
    }
}
