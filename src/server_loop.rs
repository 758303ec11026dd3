use crate::types::GenericBoxedStream;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Turn a bound listener into a stream of accepted connections. Accept
/// errors are logged and skipped; the stream itself never ends.
pub fn accept_stream(listener: TcpListener) -> impl Stream<Item = Result<TcpStream, io::Error>> {
    stream! {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    yield Ok(stream);
                }
                Err(e) => {
                    error!("TCP accept error: {}", e);
                    continue;
                }
            }
        }
    }
}

/// Await the next item from a stream or a shutdown signal.
///
/// - Returns `Ok(Some(item))` when the stream yields
/// - Returns `Ok(None)` when the stream ends
/// - Returns `Err(())` on shutdown
async fn next_or_shutdown<T>(
    mut stream: Pin<&mut (dyn Stream<Item = T> + Send)>,
    shutdown_notify: Arc<Notify>,
) -> Result<Option<T>, ()> {
    tokio::select! {
        item = stream.next() => Ok(item),
        _ = shutdown_notify.notified() => Err(()),
    }
}

/// Drain a connection stream into per-connection tasks until shutdown.
pub async fn serve_stream<T>(
    mut stream: GenericBoxedStream<T>,
    shutdown_notify: Arc<Notify>,
    handler: impl Fn(T) -> tokio::task::JoinHandle<()> + Send + Sync + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match next_or_shutdown(stream.as_mut(), shutdown_notify.clone()).await {
            Ok(Some(item)) => {
                handler(item);
            }
            Ok(None) => {
                info!("Stream ended");
                break;
            }
            Err(()) => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
