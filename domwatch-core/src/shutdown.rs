//! Process shutdown state machine.
//!
//! `Running -> ShutdownRequested -> Stopped` on a clean exit, or
//! `-> ForceShutdown` when a second interrupt arrives or cleanup overruns
//! the grace period. Signals arrive over a channel so the machine can be
//! driven without real OS signals.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShutdownRequested,
    ForceShutdown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Graceful,
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Graceful => 0,
            ShutdownOutcome::Forced => 1,
        }
    }
}

/// Read side handed to long-running tasks.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<ShutdownState>,
}

impl ShutdownListener {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() != ShutdownState::Running
    }

    /// Resolves once shutdown has been requested (or the coordinator is gone).
    pub async fn requested(&mut self) {
        let _ = self
            .rx
            .wait_for(|state| *state != ShutdownState::Running)
            .await;
    }
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    grace_period: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    fn transition(&self, next: ShutdownState) {
        let previous = self.state.send_replace(next);
        info!(from = ?previous, to = ?next, "Shutdown state changed");
    }

    /// Waits for the first signal, then drives `cleanup` to completion
    /// within the grace period.
    ///
    /// A closed signal channel counts as a shutdown request.
    pub async fn run<F>(&self, mut signals: mpsc::Receiver<ShutdownSignal>, cleanup: F) -> ShutdownOutcome
    where
        F: Future<Output = ()>,
    {
        match signals.recv().await {
            Some(signal) => info!(?signal, "Shutdown requested"),
            None => info!("Signal source closed, shutting down"),
        }
        self.transition(ShutdownState::ShutdownRequested);

        tokio::pin!(cleanup);
        let deadline = tokio::time::sleep(self.grace_period);
        tokio::pin!(deadline);
        let mut signals_open = true;

        loop {
            tokio::select! {
                _ = &mut cleanup => {
                    self.transition(ShutdownState::Stopped);
                    return ShutdownOutcome::Graceful;
                }
                _ = &mut deadline => {
                    warn!(
                        grace_secs = self.grace_period.as_secs(),
                        "Cleanup exceeded grace period, forcing shutdown"
                    );
                    self.transition(ShutdownState::ForceShutdown);
                    return ShutdownOutcome::Forced;
                }
                signal = signals.recv(), if signals_open => match signal {
                    Some(ShutdownSignal::Interrupt) => {
                        warn!("Second interrupt received, forcing shutdown");
                        self.transition(ShutdownState::ForceShutdown);
                        return ShutdownOutcome::Forced;
                    }
                    Some(ShutdownSignal::Terminate) => {
                        info!("Already shutting down, ignoring repeated terminate");
                    }
                    None => signals_open = false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_graceful_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Terminate).await.unwrap();

        let outcome = coordinator
            .run(rx, tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_forces() {
        let coordinator = ShutdownCoordinator::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();

        let outcome = coordinator
            .run(rx, tokio::time::sleep(Duration::from_secs(60)))
            .await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(coordinator.state(), ShutdownState::ForceShutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_interrupt_forces() {
        let coordinator = ShutdownCoordinator::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        tx.send(ShutdownSignal::Interrupt).await.unwrap();

        let outcome = coordinator.run(rx, std::future::pending::<()>()).await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert_eq!(coordinator.state(), ShutdownState::ForceShutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_terminate_is_ignored() {
        let coordinator = ShutdownCoordinator::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Terminate).await.unwrap();
        tx.send(ShutdownSignal::Terminate).await.unwrap();

        let outcome = coordinator
            .run(rx, tokio::time::sleep(Duration::from_secs(2)))
            .await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_request() {
        let coordinator = ShutdownCoordinator::new();
        let mut listener = coordinator.listener();
        assert!(!listener.is_requested());

        let (tx, rx) = mpsc::channel(1);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();

        let cleanup = async move {
            listener.requested().await;
            assert!(listener.is_requested());
        };
        let outcome = coordinator.run(rx, cleanup).await;
        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }
}
