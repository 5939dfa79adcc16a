// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Request pacing: the shared rate-limit gate, the retry/backoff state machine
//! and the cancellable sleep both are built on.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PortalError, Result};

/// Sleep for `duration` unless `cancel` fires first.
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(PortalError::Cancelled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PortalError::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Minimum spacing between outbound requests on one session.
///
/// Holding a [`GatePermit`] is the only way to issue a request, so requests on
/// the same gate never overlap.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// Exclusive right to issue one request; released on drop.
#[derive(Debug)]
pub struct GatePermit<'a> {
    _guard: MutexGuard<'a, Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the gate is free and the interval since the previous request
    /// has elapsed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit<'_>> {
        let mut guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PortalError::Cancelled),
            guard = self.last_request.lock() => guard,
        };

        if let Some(last) = *guard {
            let eligible_at = last + self.min_interval;
            let now = Instant::now();
            if eligible_at > now {
                let wait = eligible_at - now;
                debug!("Rate limit: waiting {:?} before next portal request", wait);
                cancellable_sleep(wait, cancel).await?;
            }
        }

        *guard = Some(Instant::now());
        Ok(GatePermit { _guard: guard })
    }
}

/// Attempt bookkeeping for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Counts attempts and yields the backoff delay before the next one.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Record the start of an attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Delay before the next attempt after a transient failure, or `None`
    /// once the attempt budget is spent. Doubles each time: 1s, 2s, 4s.
    pub fn backoff(&self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let exponent = self.attempt.saturating_sub(1).min(16);
        Some(self.policy.base_delay * 2u32.pow(exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_exhausted() {
        let mut state = RetryPolicy::new(3, Duration::from_secs(1)).start();
        assert_eq!(state.begin_attempt(), 1);
        assert_eq!(state.backoff(), Some(Duration::from_secs(1)));
        assert_eq!(state.begin_attempt(), 2);
        assert_eq!(state.backoff(), Some(Duration::from_secs(2)));
        assert_eq!(state.begin_attempt(), 3);
        assert_eq!(state.backoff(), None);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let mut state = RetryPolicy::new(0, Duration::from_secs(1)).start();
        assert_eq!(state.max_attempts(), 1);
        state.begin_attempt();
        assert!(state.backoff().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_spaces_requests() {
        let gate = RateGate::new(Duration::from_secs(300));
        let cancel = CancellationToken::new();

        let start = Instant::now();
        drop(gate.acquire(&cancel).await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));

        drop(gate.acquire(&cancel).await.unwrap());
        assert!(start.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_does_not_wait_after_interval() {
        let gate = RateGate::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        drop(gate.acquire(&cancel).await.unwrap());
        tokio::time::advance(Duration::from_secs(120)).await;

        let before = Instant::now();
        drop(gate.acquire(&cancel).await.unwrap());
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_on_gate() {
        let gate = RateGate::new(Duration::from_secs(600));
        let cancel = CancellationToken::new();
        drop(gate.acquire(&cancel).await.unwrap());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = gate.acquire(&cancel).await;
        assert!(matches!(result, Err(PortalError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_sleep_respects_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable_sleep(Duration::from_secs(3600), &cancel).await;
        assert!(matches!(result, Err(PortalError::Cancelled)));
        assert!(matches!(
            cancellable_sleep(Duration::ZERO, &cancel).await,
            Err(PortalError::Cancelled)
        ));
    }
}
