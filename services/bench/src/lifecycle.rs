//! Run phases, the run deadline and the warmup gate
//!
//! ```text
//! Initializing -> Warmup -> Tracking -> Draining -> Done
//! ```
//!
//! The deadline is the only cancellation signal. Loops check it between
//! iterations; nothing is interrupted mid-call.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Initializing,
    Warmup,
    Tracking,
    Draining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::Warmup => "warmup",
            Phase::Tracking => "tracking",
            Phase::Draining => "draining",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Instant at which every loop stops starting new iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn after(duration: Duration) -> Self {
        Self::at(Instant::now() + duration)
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn reached(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub async fn wait(&self) {
        time::sleep_until(self.at).await;
    }

    /// Sleep for `interval`, cut short by the deadline
    pub async fn sleep(&self, interval: Duration) {
        time::sleep(interval.min(self.remaining())).await;
    }
}

/// Whether send and receive outcomes currently count toward statistics
#[derive(Debug)]
pub struct TrackingGate {
    tracking: AtomicBool,
    phase: watch::Sender<Phase>,
}

impl TrackingGate {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Initializing);
        Self {
            tracking: AtomicBool::new(false),
            phase,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// Start counting; moves the run into the tracking phase
    pub fn open(&self) {
        self.tracking.store(true, Ordering::Release);
        self.set_phase(Phase::Tracking);
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            info!("Run phase {} -> {}", previous, phase);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }
}

impl Default for TrackingGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Open `gate` at `tracking_at` unless `deadline` comes first
///
/// When both fall on the same instant the deadline wins and tracking never
/// starts.
pub fn spawn_warmup(
    gate: Arc<TrackingGate>,
    tracking_at: Instant,
    deadline: Deadline,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = deadline.wait() => {
                warn!("Deadline reached before warmup finished; nothing was tracked");
            }
            _ = time::sleep_until(tracking_at) => {
                if deadline.reached() {
                    warn!("Deadline reached before warmup finished; nothing was tracked");
                } else {
                    info!("🔥 Warmup complete, tracking statistics");
                    gate.open();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_warmup_opens_gate_before_deadline() {
        let gate = Arc::new(TrackingGate::new());
        let start = Instant::now();
        let handle = spawn_warmup(
            gate.clone(),
            start + Duration::from_secs(2),
            Deadline::at(start + Duration::from_secs(5)),
        );

        time::sleep(Duration::from_millis(1_999)).await;
        assert!(!gate.is_tracking());

        handle.await.unwrap();
        assert!(gate.is_tracking());
        assert_eq!(gate.phase(), Phase::Tracking);
        assert_eq!(Instant::now(), start + Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_warmup_never_tracks() {
        let gate = Arc::new(TrackingGate::new());
        let start = Instant::now();
        spawn_warmup(
            gate.clone(),
            start + Duration::from_secs(3),
            Deadline::at(start + Duration::from_secs(1)),
        )
        .await
        .unwrap();

        assert!(!gate.is_tracking());
        assert_eq!(gate.phase(), Phase::Initializing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_deadline_wins() {
        let gate = Arc::new(TrackingGate::new());
        let at = Instant::now() + Duration::from_secs(1);
        spawn_warmup(gate.clone(), at, Deadline::at(at)).await.unwrap();

        assert!(!gate.is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_sleep_is_bounded() {
        let deadline = Deadline::after(Duration::from_millis(300));
        let start = Instant::now();

        deadline.sleep(Duration::from_secs(10)).await;
        assert_eq!(Instant::now() - start, Duration::from_millis(300));
        assert!(deadline.reached());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Initializing < Phase::Warmup);
        assert!(Phase::Tracking < Phase::Draining);
        assert_eq!(Phase::Done.to_string(), "done");
    }
}
