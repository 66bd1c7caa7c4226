use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;
use tracing::{error, info};
use vcgate_model::{LogSignals, Readiness};

use crate::error::CoreError;

/// Owner of the process-wide readiness state machine.
///
/// `Loading -> Ready -> Failed`, or `Loading -> Failed`. Failed is terminal:
/// the process has to be restarted externally.
pub struct Lifecycle {
    state: AtomicU8,
    tx: watch::Sender<Readiness>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::Loading);
        Self {
            state: AtomicU8::new(encode(Readiness::Loading)),
            tx,
        }
    }

    /// Lock-free read of the current state.
    #[inline]
    pub fn readiness(&self) -> Readiness {
        decode(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// Model finished loading. No-op when already ready.
    pub fn mark_ready(&self) -> Result<(), CoreError> {
        if self.transition(Readiness::Ready)? {
            info!("{}", LogSignals::MODEL_READY);
        }
        Ok(())
    }

    /// Unrecoverable load or runtime fault. No-op when already failed.
    pub fn mark_failed(&self, reason: &str) -> Result<(), CoreError> {
        if self.readiness() == Readiness::Failed {
            return Ok(());
        }
        if self.transition(Readiness::Failed)? {
            error!(reason, "{} model unavailable: {reason}", LogSignals::RUNTIME_ERROR);
        }
        Ok(())
    }

    /// Observe transitions.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.tx.subscribe()
    }

    /// Resolve once the state has left `Loading`.
    pub async fn wait_settled(&self) -> Readiness {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(|r| *r != Readiness::Loading).await {
            Ok(r) => *r,
            Err(_) => self.readiness(),
        }
    }

    /// Returns `Ok(true)` if the state changed, `Ok(false)` if it already was `next`.
    fn transition(&self, next: Readiness) -> Result<bool, CoreError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = decode(current);
            if from == next {
                return Ok(false);
            }
            if !from.can_transition_to(next) {
                return Err(CoreError::InvalidTransition { from, to: next });
            }
            match self.state.compare_exchange(
                current,
                encode(next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.tx.send_replace(next);
                    return Ok(true);
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(r: Readiness) -> u8 {
    match r {
        Readiness::Loading => 0,
        Readiness::Ready => 1,
        Readiness::Failed => 2,
    }
}

fn decode(v: u8) -> Readiness {
    match v {
        0 => Readiness::Loading,
        1 => Readiness::Ready,
        _ => Readiness::Failed,
    }
}
