use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use otk_client::{PushError, PushStream, PushTransport};
use otk_schemas::Credential;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::lock;

/// What the next connect attempt does.
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    /// Fail immediately.
    Fail(PushError),
    /// Never complete; the caller's connect timeout decides.
    Hang,
    /// Open a connection driven by a [`PushFeed`].
    Accept,
}

#[derive(Debug)]
enum FeedItem {
    Text(String),
    Error(PushError),
    Close,
}

/// Test-side handle of one accepted connection.
#[derive(Debug, Clone)]
pub struct PushFeed {
    tx: mpsc::UnboundedSender<FeedItem>,
}

impl PushFeed {
    /// Send a raw text frame. `false` if the connection is already gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(FeedItem::Text(text.into())).is_ok()
    }

    /// Send an `info` envelope wrapping `body`.
    pub fn send_info(&self, body: Value) -> bool {
        self.send_text(crate::info_frame(body))
    }

    /// Fail the connection with a read error.
    pub fn fail(&self, error: PushError) -> bool {
        self.tx.send(FeedItem::Error(error)).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(&self) -> bool {
        self.tx.send(FeedItem::Close).is_ok()
    }

    /// The client side has dropped this connection.
    pub fn is_dropped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Push transport stand-in. Each connect attempt consumes one scripted
/// behaviour; once the script is empty the default applies.
#[derive(Debug)]
pub struct ScriptedPushTransport {
    script: Mutex<VecDeque<ConnectBehavior>>,
    default: ConnectBehavior,
    attempts: AtomicUsize,
    open: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
    feeds: Mutex<Vec<PushFeed>>,
    accepted: Notify,
}

impl ScriptedPushTransport {
    pub fn new(script: impl IntoIterator<Item = ConnectBehavior>, default: ConnectBehavior) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            default,
            attempts: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            peak_open: Arc::new(AtomicUsize::new(0)),
            feeds: Mutex::new(Vec::new()),
            accepted: Notify::new(),
        }
    }

    /// Every attempt fails immediately.
    pub fn always_failing() -> Self {
        Self::new([], ConnectBehavior::Fail(PushError::Connect("refused".to_string())))
    }

    /// Every attempt is accepted.
    pub fn always_accepting() -> Self {
        Self::new([], ConnectBehavior::Accept)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak_open_connections(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    /// Feed of the `index`-th accepted connection, waiting for it if needed.
    pub async fn connection(&self, index: usize) -> PushFeed {
        loop {
            let notified = self.accepted.notified();
            if let Some(feed) = lock(&self.feeds).get(index).cloned() {
                return feed;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PushTransport for ScriptedPushTransport {
    async fn connect(
        &self,
        _order_id: &str,
        _credential: &Credential,
    ) -> Result<Box<dyn PushStream>, PushError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match behavior {
            ConnectBehavior::Fail(e) => Err(e),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_open.fetch_max(now, Ordering::SeqCst);
                lock(&self.feeds).push(PushFeed { tx });
                self.accepted.notify_waiters();
                Ok(Box::new(ScriptedStream {
                    rx,
                    open: self.open.clone(),
                }))
            }
        }
    }
}

struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<FeedItem>,
    open: Arc<AtomicUsize>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PushStream for ScriptedStream {
    async fn next_message(&mut self) -> Option<Result<String, PushError>> {
        match self.rx.recv().await? {
            FeedItem::Text(t) => Some(Ok(t)),
            FeedItem::Error(e) => Some(Err(e)),
            FeedItem::Close => None,
        }
    }
}
