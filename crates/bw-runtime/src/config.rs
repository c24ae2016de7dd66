//! Worker configuration (spec.md §6, supplemented per SPEC_FULL.md's
//! Configuration section). `bw-cli` builds this from `clap` args; this
//! crate only needs the resulting struct, not the parsing machinery.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub project_id: String,
    pub job_id: String,
    pub coordinator_root_url: Url,
    pub local_staging_directory: PathBuf,
    pub environment_info_path: Option<PathBuf>,
    pub default_lease_duration: Duration,
    /// Present for parity with spec.md §6; profiling itself is a Non-goal.
    pub profile: bool,
}

impl WorkerConfig {
    /// `true` iff the staging directory points at a remote-storage scheme,
    /// mirroring the original's `temp_gcs_directory` vs
    /// `local_staging_directory` split — kept generic as `"gs://"` rather
    /// than inventing a new scheme.
    pub fn running_in_managed_env(&self) -> bool {
        self.local_staging_directory
            .to_string_lossy()
            .starts_with("gs://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(staging: &str) -> WorkerConfig {
        WorkerConfig {
            worker_id: "w-1".to_string(),
            project_id: "proj".to_string(),
            job_id: "job-1".to_string(),
            coordinator_root_url: Url::parse("https://coordinator.example/").unwrap(),
            local_staging_directory: PathBuf::from(staging),
            environment_info_path: None,
            default_lease_duration: Duration::from_secs(60),
            profile: false,
        }
    }

    #[test]
    fn local_path_is_not_managed() {
        assert!(!config("/var/tmp/staging").running_in_managed_env());
    }

    #[test]
    fn gs_prefix_is_managed() {
        assert!(config("gs://bucket/staging").running_in_managed_env());
    }
}
