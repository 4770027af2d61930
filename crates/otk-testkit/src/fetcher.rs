use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use otk_client::{FetchError, OrderFetcher};
use otk_schemas::{Credential, OrderUpdate};

use crate::lock;

type Response = Result<OrderUpdate, FetchError>;

/// Pull endpoint stand-in. Queued responses are served first; once the
/// queue is empty every call returns the default.
#[derive(Debug)]
pub struct ScriptedFetcher {
    queue: Mutex<VecDeque<Response>>,
    default: Mutex<Response>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(default: OrderUpdate) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(default)),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_response(&self, response: Response) {
        lock(&self.queue).push_back(response);
    }

    pub fn set_default(&self, response: Response) {
        *lock(&self.default) = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements on drop so aborted fetches are accounted for.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderFetcher for ScriptedFetcher {
    async fn fetch_order(
        &self,
        _order_id: &str,
        _credential: &Credential,
    ) -> Result<OrderUpdate, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let queued = lock(&self.queue).pop_front();
        match queued {
            Some(r) => r,
            None => lock(&self.default).clone(),
        }
    }
}
