// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared writer handle for the browser side of a bridge.
//!
//! Interceptors and spawned deployment operations all write through this
//! handle; a dedicated task owns the socket sink so writes stay ordered. Once
//! the browser disconnects every further write becomes a logged no-op.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use serde_json::Value;
use tokio::sync::mpsc;

/// Clone-able handle writing messages to one browser connection.
#[derive(Clone)]
pub struct ClientWriter {
    tx: mpsc::UnboundedSender<Message>,
}

impl ClientWriter {
    /// Spawn the writer task owning the given sink.
    pub fn spawn(mut sink: SplitSink<WebSocket, Message>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });
        Self { tx }
    }

    /// Build a writer backed by a plain channel. Test seam.
    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send_text(&self, text: String) {
        if self.tx.send(Message::Text(text.into())).is_err() {
            tracing::debug!("write to closed browser connection discarded");
        }
    }

    pub fn send_binary(&self, data: Bytes) {
        if self.tx.send(Message::Binary(data)).is_err() {
            tracing::debug!("write to closed browser connection discarded");
        }
    }

    /// Serialize and send a JSON value.
    pub fn send_value(&self, value: &Value) {
        match serde_json::to_string(value) {
            Ok(text) => self.send_text(text),
            Err(err) => tracing::error!(err = %err, "failed to encode outgoing message"),
        }
    }

    /// Ask the writer task to close the browser connection.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}
