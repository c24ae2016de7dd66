mod cli;
mod shutdown;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

use bw_runtime::{CoordinatorClient, WorkerConfig, WorkerCore};

use crate::cli::Cli;
use crate::shutdown::spawn_ctrl_c_handler;

fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_ansi(true).with_filter(
        EnvFilter::builder()
            .with_default_directive("info".parse().unwrap())
            .from_env_lossy(),
    );

    tracing_subscriber::registry().with(fmt_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = WorkerConfig {
        worker_id: cli.worker_id,
        project_id: cli.project_id,
        job_id: cli.job_id,
        coordinator_root_url: cli.coordinator_url,
        local_staging_directory: cli.local_staging_directory,
        environment_info_path: cli.environment_info_path,
        default_lease_duration: cli.default_lease_duration,
        profile: cli.profile,
    };

    let http = reqwest::Client::new();
    let client = CoordinatorClient::new(http, config.coordinator_root_url.clone());

    let worker = WorkerCore::new(config, client, cli.work_types, cli.capabilities);

    spawn_ctrl_c_handler(worker.shutdown_handle());

    worker.run().await?;

    Ok(())
}
