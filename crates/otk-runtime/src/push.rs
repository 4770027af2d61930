//! Push Listener: one connection at a time with bounded linear backoff.
//!
//! The listener task owns the connection. Frames are decoded here and
//! forwarded as sparse updates; connection health is reported as
//! [`PushSignal`]s. After `max_failures` consecutive failures it emits
//! `Exhausted` and ends; nothing reconnects after that.

use std::sync::Arc;

use otk_client::{PushError, PushTransport};
use otk_config::TimingConfig;
use otk_schemas::{Credential, InboundUpdate, PushFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{PushSignal, SessionEvent};

#[derive(Clone)]
pub struct PushListener {
    transport: Arc<dyn PushTransport>,
    timing: TimingConfig,
    events: mpsc::Sender<SessionEvent>,
}

impl PushListener {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        timing: &TimingConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            timing: *timing,
            events,
        }
    }

    /// Start the listener task for `order_id`.
    pub fn open(&self, order_id: &str, credential: &Credential) -> PushHandle {
        let listener = self.clone();
        let order_id = order_id.to_string();
        let credential = credential.clone();
        let task = tokio::spawn(async move { listener.run(order_id, credential).await });
        PushHandle { task: Some(task) }
    }

    async fn run(self, order_id: String, credential: Credential) {
        let connect_timeout = self.timing.connect_timeout;
        let max_failures = self.timing.max_push_failures.max(1);
        let mut failures: u32 = 0;
        loop {
            let error = match tokio::time::timeout(
                connect_timeout,
                self.transport.connect(&order_id, &credential),
            )
            .await
            {
                Err(_) => PushError::ConnectTimeout {
                    after_ms: connect_timeout.as_millis() as u64,
                },
                Ok(Err(e)) => e,
                Ok(Ok(mut stream)) => {
                    failures = 0;
                    tracing::info!(order_id = %order_id, "push connected");
                    if !self.emit(SessionEvent::Push(PushSignal::Connected)).await {
                        return;
                    }

                    let mut first = true;
                    let error = loop {
                        let text = match stream.next_message().await {
                            None => break PushError::Closed,
                            Some(Err(e)) => break e,
                            Some(Ok(text)) => text,
                        };
                        if first {
                            first = false;
                            if !self.emit(SessionEvent::Push(PushSignal::FirstMessage)).await {
                                return;
                            }
                        }
                        match PushFrame::decode(&text) {
                            PushFrame::Update(update) => {
                                let ev = SessionEvent::Update(InboundUpdate::push(update));
                                if !self.emit(ev).await {
                                    return;
                                }
                            }
                            PushFrame::Ignored { kind } => {
                                tracing::debug!(order_id = %order_id, kind = %kind, "push envelope ignored");
                            }
                            PushFrame::Malformed(e) => {
                                tracing::warn!(order_id = %order_id, error = %e, "malformed push frame discarded");
                            }
                        }
                    };
                    stream.close().await;
                    error
                }
            };

            failures += 1;
            if failures >= max_failures {
                tracing::warn!(
                    order_id = %order_id,
                    failures,
                    error = %error,
                    "push reconnect budget exhausted"
                );
                self.emit(SessionEvent::Push(PushSignal::Exhausted { failures, error }))
                    .await;
                return;
            }

            let delay = self.timing.reconnect_delay(failures);
            tracing::warn!(
                order_id = %order_id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "push connection failed; reconnect scheduled"
            );
            let signal = PushSignal::ReconnectScheduled {
                failures,
                delay,
                error,
            };
            if !self.emit(SessionEvent::Push(signal)).await {
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// `false` once the merge worker is gone.
    async fn emit(&self, ev: SessionEvent) -> bool {
        self.events.send(ev).await.is_ok()
    }
}

/// Handle to a running listener. Closing is idempotent and also cancels a
/// pending reconnect.
#[derive(Debug, Default)]
pub struct PushHandle {
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    /// A handle that was never opened.
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_a_never_opened_handle_is_a_no_op() {
        let mut h = PushHandle::closed();
        assert!(!h.is_open());
        h.close();
        h.close();
        assert!(!h.is_open());
    }
}
