//! Global request pacing
//!
//! Spaces probe starts at least `delay` apart across every worker. Each
//! caller reserves the next free slot under a lock, then sleeps outside it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

pub struct Pacer {
    delay: Duration,
    next_slot: Mutex<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits until this caller's slot comes up
    pub async fn wait(&self) {
        let start = {
            let mut next_slot = self.next_slot.lock().await;
            let start = (*next_slot).max(Instant::now());
            *next_slot = start + self.delay;
            start
        };
        sleep_until(start).await;
    }
}
