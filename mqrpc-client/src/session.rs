//! Reply session: one reply consumer per channel, shared by all calls
//!
//! Every call made on a channel gets its reply on the same direct reply-to
//! pseudo-queue. The session owns that consumer and a map from correlation
//! id to the one-shot handle of the waiting caller.
//!
//! # Call Lifecycle
//!
//! 1. **Listen**: the first call installs the reply consumer (once per session)
//! 2. **Register**: a handle is stored under a fresh correlation id
//! 3. **Send**: the request goes out with that correlation id
//! 4. **Dispatch**: the consumer loop hands the reply body to the handle
//! 5. **Return**: the caller's [`PendingReply::wait`] resolves
//!
//! Replies for correlation ids nobody is waiting for are dropped. Dropping a
//! [`PendingReply`] removes its entry.
//!
//! # Connection loss
//!
//! When the reply consumer ends, every waiting call fails with
//! `Error::ConnectionClosed`. A session built with a [`Reconnector`] then
//! opens a new channel, installs a new reply consumer and carries on; without
//! one (or once the reconnector gives up) the session stays closed.

use mqrpc_core::{Channel, ConsumeOptions, Consumer, Error, Reconnector, Result, REPLY_TO_QUEUE};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, OnceCell, RwLock};

type ReplySender = oneshot::Sender<Result<Vec<u8>>>;

#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<String, ReplySender>,
    closed: bool,
}

struct Shared {
    channel: RwLock<Arc<dyn Channel>>,
    pending: Mutex<PendingCalls>,
    reconnector: Option<Arc<Reconnector>>,
}

impl Shared {
    async fn remove(&self, correlation_id: &str) -> Option<ReplySender> {
        self.pending.lock().await.waiters.remove(correlation_id)
    }

    /// Fail every waiting call; `close` also refuses new ones
    async fn fail_pending(&self, close: bool) {
        let mut pending = self.pending.lock().await;
        pending.closed |= close;
        for (_, tx) in pending.waiters.drain() {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }
    }
}

/// Reply consumer and correlation map for one channel
///
/// Create one per channel and share it (`Arc<ReplySession>`) between every
/// [`crate::RpcClient`] on that channel.
///
/// # Examples
///
/// ```rust
/// use mqrpc_client::{ReplySession, RpcClient};
/// use mqrpc_core::MemoryBroker;
/// use std::sync::Arc;
///
/// let broker = MemoryBroker::new();
/// let session = Arc::new(ReplySession::new(Arc::new(broker.channel())));
///
/// let images = RpcClient::new(session.clone(), "image-builder");
/// let billing = RpcClient::new(session, "billing");
/// # let _ = (images, billing);
/// ```
pub struct ReplySession {
    shared: Arc<Shared>,
    listener: OnceCell<()>,
}

impl ReplySession {
    /// Create a session on a channel; nothing is consumed until first use
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_parts(channel, None)
    }

    /// Create a session that reopens its channel through `reconnector`
    /// after a connection loss
    pub fn with_reconnector(channel: Arc<dyn Channel>, reconnector: Arc<Reconnector>) -> Self {
        Self::with_parts(channel, Some(reconnector))
    }

    fn with_parts(channel: Arc<dyn Channel>, reconnector: Option<Arc<Reconnector>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: RwLock::new(channel),
                pending: Mutex::new(PendingCalls::default()),
                reconnector,
            }),
            listener: OnceCell::new(),
        }
    }

    /// The channel this session currently sends and listens on
    pub async fn channel(&self) -> Arc<dyn Channel> {
        self.shared.channel.read().await.clone()
    }

    /// True once the reply consumer has been installed
    pub fn is_listening(&self) -> bool {
        self.listener.initialized()
    }

    /// True once the session gave up on its connection
    pub async fn is_closed(&self) -> bool {
        self.shared.pending.lock().await.closed
    }

    /// Number of calls waiting for a reply
    pub async fn pending_count(&self) -> usize {
        self.shared.pending.lock().await.waiters.len()
    }

    /// Install the reply consumer if it is not running yet
    ///
    /// Concurrent first callers wait for the same installation; exactly one
    /// consumer is started per session.
    pub async fn listen(&self) -> Result<()> {
        self.listener
            .get_or_try_init(|| async {
                let consumer = self
                    .channel()
                    .await
                    .consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack())
                    .await?;
                tracing::debug!(consumer_tag = %consumer.tag(), "Listening for replies");
                tokio::spawn(run_replies(consumer, self.shared.clone()));
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    /// Register a waiting caller under `correlation_id`
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` if the session is closed.
    pub async fn register(&self, correlation_id: impl Into<String>) -> Result<PendingReply> {
        let correlation_id = correlation_id.into();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.shared.pending.lock().await;
            if pending.closed {
                return Err(Error::ConnectionClosed);
            }
            pending.waiters.insert(correlation_id.clone(), tx);
        }

        Ok(PendingReply {
            correlation_id,
            rx,
            shared: self.shared.clone(),
            settled: false,
        })
    }

    /// Drop the waiting caller for `correlation_id`, if any
    pub async fn forget(&self, correlation_id: &str) -> bool {
        self.shared.remove(correlation_id).await.is_some()
    }
}

/// Handle for one outstanding call
///
/// Resolves with the raw reply body. Dropping it unregisters the call.
pub struct PendingReply {
    correlation_id: String,
    rx: oneshot::Receiver<Result<Vec<u8>>>,
    shared: Arc<Shared>,
    settled: bool,
}

impl PendingReply {
    /// Correlation id this handle waits on
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the reply body
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` if the reply consumer stopped first.
    pub async fn wait(mut self) -> Result<Vec<u8>> {
        let outcome = (&mut self.rx).await;
        self.settled = true;
        outcome.map_err(|_| Error::ConnectionClosed)?
    }

    /// Unregister without waiting
    pub async fn cancel(mut self) {
        self.shared.remove(&self.correlation_id).await;
        self.settled = true;
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        // Dropped mid-wait (timeout or caller cancellation)
        let id = std::mem::take(&mut self.correlation_id);
        match self.shared.pending.try_lock() {
            Ok(mut pending) => {
                pending.waiters.remove(&id);
            }
            Err(_) => {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let shared = self.shared.clone();
                    handle.spawn(async move {
                        shared.remove(&id).await;
                    });
                }
            }
        }
    }
}

/// Dispatch replies, re-establishing the consumer after a connection loss
async fn run_replies(mut consumer: Consumer, shared: Arc<Shared>) {
    loop {
        dispatch_replies(&mut consumer, &shared).await;

        let Some(reconnector) = shared.reconnector.clone() else {
            tracing::warn!("Reply consumer closed, failing pending calls");
            shared.fail_pending(true).await;
            return;
        };

        tracing::warn!("Reply consumer closed, failing pending calls and reconnecting");
        shared.fail_pending(false).await;

        match resubscribe(&reconnector).await {
            Some((channel, next)) => {
                tracing::info!(consumer_tag = %next.tag(), "Reply consumer re-established");
                *shared.channel.write().await = channel;
                consumer = next;
            }
            None => {
                shared.fail_pending(true).await;
                return;
            }
        }
    }
}

/// Open a new channel and consume direct reply-to on it
async fn resubscribe(reconnector: &Reconnector) -> Option<(Arc<dyn Channel>, Consumer)> {
    loop {
        let channel = match reconnector.reconnect().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "Reply session closed for good");
                return None;
            }
        };
        match channel.consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack()).await {
            Ok(consumer) => return Some((channel, consumer)),
            Err(e) => tracing::warn!(error = %e, "Failed to consume replies on new channel"),
        }
    }
}

/// Route reply bodies to their waiting callers until the consumer ends
async fn dispatch_replies(consumer: &mut Consumer, shared: &Shared) {
    while let Some(delivery) = consumer.next().await {
        let Some(correlation_id) = delivery.properties.correlation_id.as_deref() else {
            tracing::warn!(delivery_tag = delivery.delivery_tag, "Reply without correlation id");
            continue;
        };

        match shared.remove(correlation_id).await {
            Some(tx) => {
                if tx.send(Ok(delivery.body)).is_err() {
                    tracing::debug!(correlation_id = %correlation_id, "Caller gone before reply arrived");
                }
            }
            None => {
                tracing::debug!(correlation_id = %correlation_id, "Dropping reply with unknown correlation id");
            }
        }
    }
}
