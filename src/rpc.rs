//! # RPC Service (spec component C5)
//!
//! Implements the generated `tonic` service trait over the [`Router`] and a
//! bridge-supplied send callback. Streaming cancellation/shutdown uses
//! `tokio::select!` against a [`ShutdownSignal`] rather than a polled
//! condition-variable loop: spec.md section 4.4 allows either strategy as
//! long as it doesn't busy-spin, and this one maps directly onto the
//! runtime's own cancellation-friendly primitives instead of a manual
//! timeout loop.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::pb::mavlink_bridge_server::MavlinkBridge;
use crate::pb::{MavlinkMessage, SendResponse, StreamFilter};
use crate::router::{Router, SubscriptionFilter};

/// Capacity of the per-stream delivery channel between the router's
/// (synchronous) write callback and the async forwarding task.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// A global "shut everything down" flag paired with a `Notify`, following
/// the canonical `tokio::sync::Notify` pattern: obtain the `Notified`
/// future before checking the flag, so a `notify_waiters` call racing with
/// a fresh waiter can never be missed.
#[derive(Default)]
pub struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the flag and wakes every task currently waiting in [`Self::wait`].
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves immediately if shutdown already happened, otherwise waits
    /// for the next [`Self::shutdown`] call.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.flag.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// A send callback the coordinator wires up: converts a structured message
/// to wire form and pushes it through the protocol engine. Returns whether
/// the transport accepted the write.
pub type SendFn = Arc<dyn Fn(&MavlinkMessage) -> bool + Send + Sync>;

pub struct BridgeService {
    router: Arc<Router>,
    send: SendFn,
    shutdown: Arc<ShutdownSignal>,
}

impl BridgeService {
    pub fn new(router: Arc<Router>, send: SendFn, shutdown: Arc<ShutdownSignal>) -> Self {
        Self { router, send, shutdown }
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

#[tonic::async_trait]
impl MavlinkBridge for BridgeService {
    type StreamMessagesStream = Pin<Box<dyn Stream<Item = Result<MavlinkMessage, Status>> + Send + 'static>>;

    async fn stream_messages(
        &self,
        request: Request<StreamFilter>,
    ) -> Result<Response<Self::StreamMessagesStream>, Status> {
        let filter = request.into_inner();
        let subscription_filter = SubscriptionFilter {
            system_id: filter.system_id,
            component_id: filter.component_id,
            message_ids: filter.message_ids,
        };

        let (delivery_tx, mut delivery_rx) = mpsc::channel::<MavlinkMessage>(STREAM_CHANNEL_CAPACITY);
        let subscription_id = self.router.subscribe(
            subscription_filter,
            Box::new(move |message| delivery_tx.blocking_send(message.clone()).is_ok()),
        );

        let (out_tx, out_rx) = mpsc::channel::<Result<MavlinkMessage, Status>>(STREAM_CHANNEL_CAPACITY);
        let router = self.router.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    maybe_message = delivery_rx.recv() => {
                        match maybe_message {
                            Some(message) if out_tx.send(Ok(message)).await.is_ok() => {}
                            _ => break,
                        }
                    }
                }
            }
            router.unsubscribe(subscription_id);
            debug!(subscription_id, "stream handler exited");
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(out_rx))))
    }

    async fn send_message(&self, request: Request<MavlinkMessage>) -> Result<Response<SendResponse>, Status> {
        let message = request.into_inner();
        if message.payload.is_none() {
            return Err(Status::invalid_argument("message has no payload"));
        }

        if (self.send)(&message) {
            Ok(Response::new(SendResponse {
                success: true,
                error: String::new(),
            }))
        } else {
            info!(message_id = message.message_id, "send failed at transport");
            Err(Status::internal("failed to push message through transport"))
        }
    }
}
