use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use palaver_inference::{LlamaGenerator, PalaverInferenceConfig, ResponseGenerator};
use palaver_service::{
    config::PalaverServiceConfig,
    server::{run_server, AppState},
    telemetry,
};
use palaver_state::{config::PalaverStateConfig, PalaverState};
use palaver_utils::spawn_with_shutdown;
use tokio::{net::TcpListener, sync::watch, try_join};
use tracing::info;

#[derive(Parser)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config_path: String,
}

#[tokio::main]
#[allow(clippy::redundant_pub_crate)]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let service_config = PalaverServiceConfig::from_file_path(&args.config_path)
        .context("Failed to load palaver_service configuration")?;
    let state_config = PalaverStateConfig::from_file_path(&args.config_path)
        .context("Failed to load palaver_state configuration")?;
    let inference_config = PalaverInferenceConfig::from_file_path(&args.config_path)
        .context("Failed to load palaver_inference configuration")?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard =
        telemetry::setup_logging(&service_config.log_directory, &service_config.log_file_name)
            .context("Failed to setup logging")?;

    info!(
        target = "palaver-service",
        event = "palaver-service-start",
        "Connecting to the database..."
    );
    let state = PalaverState::new_from_config(&state_config).await?;

    info!(
        target = "palaver-service",
        event = "palaver-service-start",
        model_id = %inference_config.model_id,
        "Loading the text-generation model..."
    );
    let model = tokio::task::spawn_blocking(move || LlamaGenerator::from_config(&inference_config))
        .await??;
    let app_state = AppState {
        state,
        response_generator: ResponseGenerator::new(Arc::new(model)),
        use_chat_history: service_config.use_chat_history,
    };

    let tcp_listener = TcpListener::bind(&service_config.service_bind_address).await?;
    info!(
        target = "palaver-service",
        event = "palaver-service-start",
        "Starting the Palaver service, on {}",
        service_config.service_bind_address
    );

    let (shutdown_sender, mut shutdown_receiver) = watch::channel(false);
    let service_handle = spawn_with_shutdown(
        run_server(app_state, tcp_listener, shutdown_receiver.clone()),
        shutdown_sender.clone(),
    );

    let ctrl_c = tokio::task::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                info!(
                    target = "palaver-service",
                    event = "palaver-service-stop",
                    "ctrl-c received, sending shutdown signal"
                );
                shutdown_sender
                    .send(true)
                    .context("Failed to send shutdown signal")?;
                result.map_err(anyhow::Error::from)
            }
            _ = shutdown_receiver.changed() => {
                Ok(())
            }
        }
    });

    let (service_result, _) = try_join!(service_handle, ctrl_c)?;
    info!(
        target = "palaver-service",
        event = "palaver-service-stop",
        "Palaver service stopped"
    );
    service_result
}
