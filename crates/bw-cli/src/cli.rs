//! CLI argument parsing for the worker daemon, in the teacher's
//! `clap`-derive-plus-`env`-fallback style (`client/src/cli.rs`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

fn default_coordinator_url() -> Url {
    Url::parse("http://127.0.0.1:8080/").expect("default coordinator URL must be valid")
}

fn parse_duration_secs(input: &str) -> Result<Duration, String> {
    let secs: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration in seconds: {input:?}"))?;
    if secs <= 0.0 {
        return Err(format!("duration must be > 0: {input:?}"));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[derive(Debug, Clone, Parser)]
#[command(name = "bw-worker", version, about = "Batch worker runtime")]
pub struct Cli {
    #[arg(long, env = "BW_WORKER_ID")]
    pub worker_id: String,

    #[arg(long, env = "BW_PROJECT_ID")]
    pub project_id: String,

    #[arg(long, env = "BW_JOB_ID")]
    pub job_id: String,

    #[arg(long, env = "BW_COORDINATOR_URL", default_value_t = default_coordinator_url())]
    pub coordinator_url: Url,

    #[arg(long, env = "BW_LOCAL_STAGING_DIRECTORY", default_value = "/tmp/bw-staging")]
    pub local_staging_directory: PathBuf,

    #[arg(long, env = "BW_ENVIRONMENT_INFO_PATH")]
    pub environment_info_path: Option<PathBuf>,

    /// Desired lease duration in seconds, sent with every lease/report call.
    #[arg(
        long = "lease-duration",
        env = "BW_DEFAULT_LEASE_DURATION_SECS",
        default_value = "60",
        value_parser = parse_duration_secs
    )]
    pub default_lease_duration: Duration,

    /// Present for parity with the coordinator's pipeline-options map;
    /// profiling itself is out of scope.
    #[arg(long, env = "BW_PROFILE", default_value_t = false)]
    pub profile: bool,

    /// Work item kinds this worker will accept.
    #[arg(long = "work-type", env = "BW_WORK_TYPES", value_delimiter = ',', default_value = "map_task,source_operation_split_task")]
    pub work_types: Vec<String>,

    /// Optional capabilities advertised to the coordinator.
    #[arg(long = "capability", env = "BW_CAPABILITIES", value_delimiter = ',')]
    pub capabilities: Vec<String>,
}
