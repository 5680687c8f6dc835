//! The two tasks that run for every connection.
//!
//! `drain_outbound` owns the transport's write half and flushes the
//! connection's queue into it. `pump_inbound` reads frames and hands them
//! to the router. They share nothing but the [`ConnectionHandle`]: closing
//! it stops both.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use parley_shared::OutboundEnvelope;

use crate::connection::ConnectionHandle;
use crate::router::MessageRouter;

/// Why an inbound loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// The peer closed the transport.
    TransportClosed,
    TransportError(String),
    /// The handle was closed: superseded, or disconnected as a slow consumer.
    HandleClosed,
    Shutdown,
}

/// Write queued envelopes to `sink` until the queue ends, the handle is
/// closed, or shutdown is signalled. On shutdown whatever is already queued
/// is flushed first. Returns the number of frames written.
pub async fn drain_outbound<K>(
    handle: Arc<ConnectionHandle>,
    mut queue: mpsc::Receiver<OutboundEnvelope>,
    mut sink: K,
    mut shutdown: watch::Receiver<bool>,
) -> usize
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    let mut written = 0;

    loop {
        tokio::select! {
            biased;

            _ = handle.closed() => {
                debug!(user = %handle.user_id(), "Outbound loop abandoned");
                break;
            }
            _ = stopped(&mut shutdown) => {
                while let Ok(envelope) = queue.try_recv() {
                    if !write(&handle, &mut sink, &envelope).await {
                        break;
                    }
                    written += 1;
                }
                debug!(user = %handle.user_id(), written, "Outbound loop drained for shutdown");
                break;
            }
            next = queue.recv() => {
                let Some(envelope) = next else { break };
                if !write(&handle, &mut sink, &envelope).await {
                    handle.close();
                    break;
                }
                written += 1;
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(user = %handle.user_id(), error = %e, "Transport close failed");
    }
    written
}

/// Resolves once shutdown is signalled, or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn write<K>(handle: &ConnectionHandle, sink: &mut K, envelope: &OutboundEnvelope) -> bool
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    let frame = match envelope.to_json() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user = %handle.user_id(), error = %e, "Failed to encode outbound envelope");
            return true;
        }
    };
    match sink.send(frame).await {
        Ok(()) => true,
        Err(e) => {
            debug!(user = %handle.user_id(), error = %e, "Transport write failed");
            false
        }
    }
}

/// Feed inbound text frames to `router` until the transport ends, the
/// handle is closed, or shutdown is signalled.
pub async fn pump_inbound<S, E>(
    router: &MessageRouter,
    handle: &Arc<ConnectionHandle>,
    mut inbound: S,
    mut shutdown: watch::Receiver<bool>,
) -> Teardown
where
    S: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            biased;

            _ = handle.closed() => return Teardown::HandleClosed,
            _ = stopped(&mut shutdown) => return Teardown::Shutdown,
            frame = inbound.next() => match frame {
                Some(Ok(raw)) => router.handle_frame(handle, &raw).await,
                Some(Err(e)) => return Teardown::TransportError(e.to_string()),
                None => return Teardown::TransportClosed,
            },
        }
    }
}
