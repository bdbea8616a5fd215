use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Host update counter that suspendable work awaits on.
///
/// The host calls [`FrameClock::advance`] once per update; tasks await
/// [`FrameClock::next_tick`] to resume on the following update.
#[derive(Clone, Debug)]
pub struct FrameClock {
    tx: Arc<watch::Sender<u64>>,
}

impl FrameClock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Number of updates seen so far.
    pub fn frame(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn advance(&self) {
        self.tx.send_modify(|frame| *frame = frame.wrapping_add(1));
    }

    /// Resolve on the first [`FrameClock::advance`] after this call.
    ///
    /// The frame is captured here, not when the future is first polled, so a
    /// task can take its tick before it is spawned.
    pub fn next_tick(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // The sender outlives every clone of the clock that can advance it.
            let _ = rx.changed().await;
        }
    }

    pub async fn ticks(&self, count: u32) {
        for _ in 0..count {
            self.next_tick().await;
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
