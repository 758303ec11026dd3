mod config_store;
mod error;
mod handlers;
mod netprobe;
mod power;
mod server_loop;
mod session_store;
mod sms;
mod types;
mod workers;

use crate::types::GenericBoxedStream;
use clap::Parser;
use config_store::ConfigStore;
use handlers::{handle_connection, Gateway};
use netprobe::SystemPinger;
use power::IpmitoolController;
use server_loop::{accept_stream, serve_stream};
use session_store::SessionStore;
use sms::HttpSmsGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    signal, task,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value = "23080")]
    port: u16,
    /// Path to the fleet roster file
    #[arg(long, default_value = "server_info.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // A missing or broken roster degrades endpoints, it never blocks startup
    let config = ConfigStore::new();
    if let Err(e) = config.load_file(&args.config) {
        warn!(
            "Could not load {}: {}; starting with an empty fleet",
            args.config.display(),
            e
        );
    }

    let sessions = SessionStore::new();
    let gateway = Gateway {
        config: config.clone(),
        sessions: sessions.clone(),
        chassis: Arc::new(IpmitoolController),
        sms: Arc::new(HttpSmsGateway::new(config.clone())),
        pinger: Arc::new(SystemPinger),
    };

    let shutdown_notify = Arc::new(tokio::sync::Notify::new());

    let shutdown_handle = shutdown_notify.clone();
    tokio::spawn({
        let interrupt_handle = shutdown_handle.clone();
        async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            interrupt_handle.notify_waiters();
        }
    });

    let server_handle = tokio::spawn({
        let args_clone = args.clone();
        let server_shutdown = shutdown_notify.clone();
        async move {
            if let Err(e) = run_web_server(args_clone, gateway, server_shutdown).await {
                error!("Server error: {}", e);
            }
        }
    });

    let worker_handle = tokio::spawn({
        let worker_shutdown_handle = shutdown_notify.clone();
        async move {
            workers::run_workers(worker_shutdown_handle, sessions).await;
        }
    });

    let _ = tokio::try_join!(server_handle, worker_handle);

    Ok(())
}

async fn run_web_server(
    args: Args,
    gateway: Gateway,
    shutdown_notify: Arc<tokio::sync::Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", args.host, args.port);
    let tcp = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    let stream: GenericBoxedStream<Result<TcpStream, std::io::Error>> =
        Box::pin(accept_stream(tcp));

    serve_stream(stream, shutdown_notify.clone(), move |stream_result| {
        let gateway = gateway.clone();
        task::spawn(async move {
            match stream_result {
                Ok(stream) => {
                    handle_connection(stream, gateway).await;
                }
                Err(e) => {
                    error!("Stream error during connection: {}", e);
                }
            }
        })
    })
    .await?;

    Ok(())
}
