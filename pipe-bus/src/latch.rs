use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

/// Countdown that fires exactly once, on the transition from 1 to 0.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicUsize,
    fired: Notify,
}

impl Countdown {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            fired: Notify::new(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Decrements the count. Returns `true` only for the call that brought it
    /// to zero; calls past zero are ignored.
    pub fn count_down(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => {
                self.fired.notify_waiters();
                true
            }
            _ => false,
        }
    }

    /// Resolves once the count has reached zero.
    pub async fn wait(&self) {
        let notified = self.fired.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.remaining() == 0 {
            return;
        }
        notified.await;
    }

    /// Returns a guard that counts down when dropped, including during a panic.
    pub fn guard(self: &Arc<Self>) -> CountdownGuard {
        CountdownGuard {
            latch: Arc::clone(self),
        }
    }
}

pub struct CountdownGuard {
    latch: Arc<Countdown>,
}

impl Drop for CountdownGuard {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
