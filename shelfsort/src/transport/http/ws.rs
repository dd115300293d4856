//! WebSocket connection loop.
//!
//! Each connection runs three tasks:
//! - reader (this task): decodes text frames and feeds the session worker
//! - worker: owns the `Session` and handles one message at a time
//! - writer: drains the session's outbox into the socket
//!
//! Closing the socket stops the reader and cancels the connection; the worker
//! finishes its current message and skips anything still queued, then the
//! writer drains what is left and the session is dropped.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::codec::{self, ProtocolError};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::service::ShelfService;

const INBOUND_BUFFER: usize = 32;
const OUTBOUND_BUFFER: usize = 64;

pub async fn handle_socket(socket: WebSocket, service: Arc<ShelfService>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_BUFFER);

    let (session, guard) = service.open_session(outbound_tx);
    let id = guard.id();
    let cancel = service.connection_token();

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match codec::encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(session = %id, error = %e, "Failed to encode notification");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(session = %id, error = %e, "Socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let worker = tokio::spawn(session.run(inbound_rx, cancel.clone()));

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(session = %id, "Closing connection for shutdown");
                break;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match codec::decode(text.as_str()) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "Dropping client message");
                }
            },
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!(session = %id, error = %ProtocolError::BinaryFrame, "Dropping client message");
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session = %id, error = %e, "Socket read failed");
                break;
            }
        }
    }

    // The client is gone; skip whatever is still queued.
    cancel.cancel();
    drop(inbound_tx);
    if let Err(e) = worker.await {
        tracing::error!(session = %id, error = %e, "Session worker panicked");
    }
    if let Err(e) = writer.await {
        tracing::error!(session = %id, error = %e, "Socket writer panicked");
    }
    drop(guard);
}
