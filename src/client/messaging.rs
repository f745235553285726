//! Outbound frames: correlated requests and fire-and-forget notifications.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ClientInner, TeardownReason};
use crate::{
    correlation::{CorrelatableFrame, CorrelationId, CorrelationKey, Reply},
    error::{ClientError, Result},
    frame::Frame,
    metrics,
};

/// Wait for a registered reply. A dropped sender means the connection went
/// away first.
pub(crate) async fn await_reply(reply: oneshot::Receiver<Reply>) -> Result<Frame> {
    reply.await.unwrap_or(Err(ClientError::ConnectionClosed))
}

impl ClientInner {
    /// Write `frame` to the current connection.
    ///
    /// A failed write tears the connection down and schedules a reconnect
    /// before the error is returned. A sink whose connection has already been
    /// torn down, but not yet detached, counts as no connection.
    pub(crate) async fn transmit(self: &Arc<Self>, frame: &Frame) -> Result<()> {
        let text = frame.encode().map_err(ClientError::Encode)?;
        let mut guard = self.sink.lock().await;
        let Some(live) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        let epoch = live.epoch;
        if epoch != self.current_epoch() {
            debug!(event = %frame.event, epoch, "refusing write to torn-down connection");
            return Err(ClientError::NotConnected);
        }
        match live.sink.send(text).await {
            Ok(()) => {
                metrics::inc_frames(metrics::Direction::Outbound);
                debug!(event = %frame.event, reference = ?frame.reference, "frame sent");
                Ok(())
            }
            Err(error) => {
                drop(guard);
                warn!(event = %frame.event, error = %error, "failed to send frame");
                self.teardown(epoch, TeardownReason::SendFailed(error.to_string()));
                Err(error.into())
            }
        }
    }

    /// Register a waiter under a fresh reference and send the request.
    pub(crate) async fn start_request(
        self: &Arc<Self>,
        event: &str,
        payload: Option<Value>,
    ) -> Result<oneshot::Receiver<Reply>> {
        let id = CorrelationId::generate();
        let key = CorrelationKey::new(event, Some(id.to_string()));
        let reply = self.correlator.register(key.clone(), payload.clone())?;

        let mut frame = Frame::new(event);
        frame.payload = payload;
        frame.set_correlation_id(Some(id.into()));
        if let Err(error) = self.transmit(&frame).await {
            self.correlator.reject(&key, ClientError::ConnectionClosed);
            return Err(error);
        }
        Ok(reply)
    }

    /// Send a correlated request and wait for the matching response.
    pub(crate) async fn request(self: &Arc<Self>, event: &str, payload: Option<Value>) -> Result<Frame> {
        let reply = self.start_request(event, payload).await?;
        await_reply(reply).await
    }

    /// Send a frame with no reference; nothing waits for a reply.
    pub(crate) async fn notify(self: &Arc<Self>, event: &str, payload: Option<Value>) -> Result<()> {
        let mut frame = Frame::new(event);
        frame.payload = payload;
        self.transmit(&frame).await
    }
}
