//! Broker connection retry and recovery
//!
//! A broker is often not reachable when a component starts (it is still
//! booting, or DNS has not converged), and a running connection can drop.
//!
//! - [`connect_with_retry`] keeps calling a [`Connector`] and sleeps between
//!   failures as told by a [`ReconnectionStrategy`]
//! - [`Reconnector`] pairs a connector with two strategies: one for a
//!   connect round and one for the pause between rounds after a connection
//!   was lost
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: growing delays with optional jitter
//! - **FixedDelay**: constant delay between attempts
//! - **NoReconnect**: a single attempt
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_core::reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! // Connecting: 10 attempts, 2s apart
//! let mut connect = FixedDelay::messagebus();
//! assert_eq!(connect.next_delay(0), Some(Duration::from_secs(2)));
//! assert_eq!(connect.next_delay(9), None);
//!
//! // Recovering a lost connection: 2s growing by 10%, at most 10s
//! let mut recover = ExponentialBackoff::messagebus();
//! let first = recover.next_delay(0).unwrap();
//! assert!(first >= Duration::from_secs(2));
//! assert!(first <= Duration::from_millis(2200));
//! ```

use crate::error::{Error, Result};
use crate::transport::{Channel, Connector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Decides how long to wait between connection attempts
///
/// `next_delay` is asked after every failed attempt. Returning `None` gives
/// up. `reset` is called once a connection succeeds.
///
/// `max_attempts` on the built-in strategies counts attempts, not retries:
/// with `with_max_attempts(3)` the connector is called three times.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before the next attempt, given the zero-based index of the
    /// attempt that just failed
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Reset state after a successful connection
    fn reset(&mut self);
}

/// Exponential backoff with optional jitter
///
/// The n-th delay is `min_delay * multiplier^n`, capped at `max_delay`, plus
/// a random jitter of up to `jitter_ratio` of that delay.
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    jitter_ratio: f64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a doubling backoff between `min_delay` and `max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            multiplier: 2.0,
            max_attempts: None,
            jitter_ratio: 0.0,
            current_attempt: 0,
        }
    }

    /// Pause between recovery rounds used by the message bus: starting at
    /// 2s, growing by 10% per round up to 10s, with up to 10% jitter, never
    /// giving up
    pub fn messagebus() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
            .with_multiplier(1.1)
            .with_jitter_ratio(0.1)
    }

    /// Set the growth factor between consecutive delays
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random jitter
    pub fn with_jitter(self) -> Self {
        self.with_jitter_ratio(0.25)
    }

    /// Add up to `ratio` (0.0..=1.0) random jitter
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt.saturating_add(1) >= max {
                return None;
            }
        }

        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let base = self.min_delay.as_nanos() as f64 * factor;
        let delay = Duration::from_nanos(base.min(self.max_delay.as_nanos() as f64).round() as u64);

        if self.jitter_ratio > 0.0 {
            use rand::Rng;
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
            return Some(delay.mul_f64(1.0 + extra).min(self.max_delay));
        }

        Some(delay)
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Constant delay between attempts
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Initial connect used by the message bus: 10 attempts, 2s apart
    pub fn messagebus() -> Self {
        Self::new(Duration::from_secs(2)).with_max_attempts(10)
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt.saturating_add(1) >= max => None,
            _ => Some(self.delay),
        }
    }

    fn reset(&mut self) {}
}

/// Never retry
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// Connect to the broker, retrying per `strategy`
///
/// Returns the first channel obtained. When the strategy gives up the error
/// is `Error::ConnectionFailed` with the number of attempts made.
#[tracing::instrument(skip_all)]
pub async fn connect_with_retry(
    connector: &dyn Connector,
    strategy: &mut dyn ReconnectionStrategy,
) -> Result<Arc<dyn Channel>> {
    let mut failures: u32 = 0;

    loop {
        match connector.connect().await {
            Ok(channel) => {
                if failures > 0 {
                    tracing::info!(attempts = failures + 1, "Connected to message broker");
                }
                strategy.reset();
                return Ok(channel);
            }
            Err(e) => {
                failures += 1;
                match strategy.next_delay(failures - 1) {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            attempt = failures,
                            retry_in_ms = delay.as_millis() as u64,
                            "Error while connecting to message broker, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(error = %e, attempts = failures, "Giving up connecting to message broker");
                        return Err(Error::ConnectionFailed { attempts: failures });
                    }
                }
            }
        }
    }
}

/// Keeps a broker channel available
///
/// [`Reconnector::connect`] runs one connect round. After a connection was
/// lost, [`Reconnector::reconnect`] waits per the recovery strategy, runs a
/// connect round, and repeats until a channel is open or the recovery
/// strategy gives up.
///
/// Defaults: [`FixedDelay::messagebus`] for a connect round and
/// [`ExponentialBackoff::messagebus`] between recovery rounds.
pub struct Reconnector {
    connector: Arc<dyn Connector>,
    connect_strategy: Mutex<Box<dyn ReconnectionStrategy>>,
    recovery_strategy: Mutex<Box<dyn ReconnectionStrategy>>,
}

impl Reconnector {
    /// Wrap `connector` with the message bus defaults
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connect_strategy: Mutex::new(Box::new(FixedDelay::messagebus())),
            recovery_strategy: Mutex::new(Box::new(ExponentialBackoff::messagebus())),
        }
    }

    /// Strategy for the attempts within one connect round
    pub fn with_connect_strategy(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.connect_strategy = Mutex::new(strategy);
        self
    }

    /// Strategy for the pause before each recovery round
    pub fn with_recovery_strategy(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.recovery_strategy = Mutex::new(strategy);
        self
    }

    /// Run one connect round
    pub async fn connect(&self) -> Result<Arc<dyn Channel>> {
        let mut strategy = self.connect_strategy.lock().await;
        connect_with_retry(self.connector.as_ref(), strategy.as_mut()).await
    }

    /// Open a new channel after the previous one was lost
    ///
    /// Fails with `Error::ConnectionFailed` carrying the number of rounds
    /// once the recovery strategy gives up.
    #[tracing::instrument(skip_all)]
    pub async fn reconnect(&self) -> Result<Arc<dyn Channel>> {
        let mut recovery = self.recovery_strategy.lock().await;
        let mut round: u32 = 0;

        loop {
            let Some(delay) = recovery.next_delay(round) else {
                tracing::error!(rounds = round, "Giving up reconnecting to message broker");
                return Err(Error::ConnectionFailed { attempts: round });
            };
            tracing::info!(round = round + 1, delay_ms = delay.as_millis() as u64, "Reconnecting to message broker");
            tokio::time::sleep(delay).await;

            match self.connect().await {
                Ok(channel) => {
                    recovery.reset();
                    tracing::info!(rounds = round + 1, "Reconnected to message broker");
                    return Ok(channel);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Reconnect round failed");
                    round += 1;
                }
            }
        }
    }
}
