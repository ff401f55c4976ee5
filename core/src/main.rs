use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use wirebroker::{BrokerConfig, BrokerServer, FramingMode, MalformedFramePolicy, Result};

#[derive(Parser, Debug)]
#[command(name = "wirebroker")]
#[command(about = "A Kafka-style binary protocol front-end")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value = "9092")]
    port: u16,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Close a connection after this long without a complete frame
    #[arg(long, default_value = "5000")]
    read_timeout_ms: u64,

    #[arg(long, default_value = "1000")]
    max_connections: usize,

    /// `read_unit` (one read is one frame) or `length_prefixed`
    #[arg(long, default_value = "read_unit")]
    framing: FramingMode,

    /// Close the connection after a frame too short to hold a request header
    #[arg(long)]
    disconnect_on_malformed: bool,

    /// Load settings from WIREBROKER_* environment variables instead of flags
    #[arg(long)]
    from_env: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(&args.log_level))
        .init();

    let config = if args.from_env {
        BrokerConfig::from_env()?
    } else {
        BrokerConfig {
            host: args.host,
            port: args.port,
            read_timeout_ms: args.read_timeout_ms,
            max_connections: args.max_connections,
            framing: args.framing,
            malformed_frame_policy: if args.disconnect_on_malformed {
                MalformedFramePolicy::Disconnect
            } else {
                MalformedFramePolicy::Placeholder
            },
            ..Default::default()
        }
    };

    let server = Arc::new(BrokerServer::new(config)?);

    let config = server.config();
    info!("Starting wirebroker on {}", config.listen_addr());
    info!("Framing: {:?}", config.framing);
    info!("Read timeout: {}ms", config.read_timeout_ms);
    info!("Malformed frames: {:?}", config.malformed_frame_policy);

    // Spawn the server task
    let mut server_handle = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run().await }
    });

    // Set up signal handlers
    let finished = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            None
        }
        result = &mut server_handle => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => {
            server.shutdown();
            server_handle.await
        }
    };

    match result {
        Ok(Ok(())) => info!("Server task completed"),
        Ok(Err(e)) => {
            error!("Server error: {}", e);
            return Err(e);
        }
        Err(e) => error!("Server task failed: {}", e),
    }

    let metrics = server.metrics().snapshot();
    info!(
        "wirebroker shut down successfully ({} connections, {} requests served)",
        metrics.total_connections, metrics.total_requests
    );
    Ok(())
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            warn!("Invalid log level '{}', defaulting to 'info'", level);
            tracing::Level::INFO
        }
    }
}
