//! Owned, cancellable one-shot timer.
//!
//! The session driver keeps one `Timer` per purpose (connect deadline,
//! reconnect delay) and polls it inside its `select!` loop. A disarmed
//! timer never completes, so a cancelled deadline cannot fire.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};

#[derive(Debug, Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self { sleep: None }
    }

    /// Arm (or re-arm) the timer to fire after `after`.
    pub fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep(after)));
    }

    /// Disarm the timer. Idempotent.
    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// When the timer will fire, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Completes when the armed deadline passes, then disarms.
    ///
    /// Pends forever while disarmed. Cancel-safe: dropping the returned
    /// future leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(s) => {
                s.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}
