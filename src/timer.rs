//! The sender's single retransmission timer.
//!
//! Go-Back-N needs one timer per sender, not one per packet:
//! - armed when the first packet enters an empty window,
//! - restarted whenever it fires or the window advances,
//! - disarmed when the window drains.
//!
//! The timer is a deadline only; the sender races it against the next ACK with
//! `tokio::time::timeout_at`.  Uses `tokio::time::Instant` so tests can run
//! under a paused clock.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RetransmitTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start the timer unless it is already running.
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            self.restart();
        }
    }

    /// Start a fresh timeout period from now.
    pub fn restart(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn arm_keeps_running_deadline() {
        let mut t = RetransmitTimer::new(Duration::from_millis(300));
        assert!(!t.is_armed());

        t.arm();
        let first = t.deadline().unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        t.arm();
        assert_eq!(t.deadline(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_pushes_deadline_forward() {
        let mut t = RetransmitTimer::new(Duration::from_millis(300));
        t.arm();
        let first = t.deadline().unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        t.restart();
        assert_eq!(t.deadline(), Some(first + Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn disarm_clears_deadline() {
        let mut t = RetransmitTimer::new(Duration::from_secs(1));
        t.restart();
        t.disarm();
        assert!(!t.is_armed());
        assert_eq!(t.timeout(), Duration::from_secs(1));
    }
}
