//! Argus multi-stream motion surveillance

use std::path::PathBuf;
use std::sync::Arc;

use argus::capture::DefaultConnector;
use argus::display::Mosaic;
use argus::pipeline::Supervisor;
use argus::Config;
use color_eyre::Result;
use flume::bounded;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("argus=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Argus launching...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);
    for (id, stream) in config.streams.iter().enumerate() {
        info!(session = id, "Stream {}: {}", stream.name, stream.uri);
    }

    // Display consumer; a real window or encoder would sit here
    let (tx, rx) = bounded::<Mosaic>(config.supervisor.output_queue.max(1));
    let consumer = tokio::spawn(async move {
        while let Ok(mosaic) = rx.recv_async().await {
            debug!(
                "Mosaic {}x{} ({}x{} grid)",
                mosaic.image.width(),
                mosaic.image.height(),
                mosaic.layout.cols,
                mosaic.layout.rows
            );
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let supervisor = Supervisor::new(config, Arc::new(DefaultConnector::new()));
    let result = supervisor.run(tx, shutdown).await;
    consumer.await?;

    match result {
        Ok(()) => {
            info!("Argus shutting down");
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}
