//! Supervision of the change-stream connection.
//!
//! A broken connection is reopened with exponential backoff and jitter instead of stopping the
//! indexer. Streams are always reopened at the tail, so changes committed while disconnected are
//! not replayed.

use std::fmt;
use std::time::{Duration, Instant};

use indexer_config::shared::ReconnectionConfig;
use metrics::counter;
use rand::Rng;
use tracing::{error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::error::{IndexerError, IndexerResult};
use crate::metrics::INDEXER_STREAM_RECONNECTIONS_TOTAL;
use crate::replication::apply::{ConsumeLoopResult, ConsumeStats, EventApplier, start_consume_loop};
use crate::replication::stream::{
    ChangeStream, ChangeStreamSource, FilteredChangeStream, StreamRequest,
};
use crate::store::IndexStore;

/// Upper bound of the random extra delay, as a fraction of the computed delay.
const MAX_JITTER: f64 = 0.3;

/// Consecutive connection failures since the stream was last open.
#[derive(Debug, Clone, Copy)]
pub struct Outage {
    pub started_at: Instant,
    pub failures: u32,
}

impl Outage {
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Why the supervisor stopped reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    NotRetryable,
    Disabled,
    WindowExpired,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GiveUpReason::NotRetryable => "error is not retryable",
            GiveUpReason::Disabled => "reconnection is disabled",
            GiveUpReason::WindowExpired => "max retry duration exceeded",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(GiveUpReason),
}

/// Tracks the current outage and decides whether and when to reconnect.
///
/// The retry window starts at the first failure of an outage. A failure that happens after the
/// window has elapsed ends the retries.
#[derive(Debug)]
pub struct StreamBackoff {
    config: ReconnectionConfig,
    outage: Option<Outage>,
}

impl StreamBackoff {
    pub fn new(config: ReconnectionConfig) -> Self {
        Self {
            config,
            outage: None,
        }
    }

    pub fn outage(&self) -> Option<&Outage> {
        self.outage.as_ref()
    }

    pub fn failures(&self) -> u32 {
        self.outage.map_or(0, |outage| outage.failures)
    }

    /// Records a failure of the stream connection and decides what to do next.
    pub fn on_failure(&mut self, err: &IndexerError) -> RetryDecision {
        if !err.kind().is_connection_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
        }

        if !self.config.enabled {
            return RetryDecision::GiveUp(GiveUpReason::Disabled);
        }

        let failures = match self.outage.as_mut() {
            None => {
                self.outage = Some(Outage {
                    started_at: Instant::now(),
                    failures: 1,
                });
                1
            }
            Some(outage) => {
                if outage.duration() >= self.config.max_retry_duration() {
                    return RetryDecision::GiveUp(GiveUpReason::WindowExpired);
                }
                outage.failures += 1;
                outage.failures
            }
        };

        RetryDecision::RetryAfter(self.delay_for(failures))
    }

    /// Ends the current outage, returning it if there was one.
    pub fn on_connected(&mut self) -> Option<Outage> {
        self.outage.take()
    }

    /// Delay before the reconnection following the `failures`-th failure.
    ///
    /// `initial * multiplier^(failures - 1)`, capped at the maximum delay, plus up to 30% jitter.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.config.initial_retry_delay_ms as f64
            * self.config.backoff_multiplier.powi(exponent))
        .min(self.config.max_retry_delay_ms as f64);

        let jitter = rand::rng().random::<f64>() * MAX_JITTER;

        Duration::from_millis((delay_ms * (1.0 + jitter)) as u64)
    }
}

/// Consumes the change stream, reopening it when the connection fails.
///
/// Returns when the source closes the stream, when shutdown is requested, or with the error that
/// could not be retried. Each opened stream is closed before returning or reconnecting.
pub async fn reconnection_loop<C, S>(
    source: &C,
    request: &StreamRequest,
    config: &ReconnectionConfig,
    applier: &EventApplier<S>,
    mut shutdown_rx: ShutdownRx,
    stats: &mut ConsumeStats,
) -> IndexerResult<ConsumeLoopResult>
where
    C: ChangeStreamSource,
    S: IndexStore,
{
    let mut backoff = StreamBackoff::new(config.clone());

    loop {
        if is_shutdown_requested(&shutdown_rx) {
            info!("shutdown requested before opening the change stream");
            return Ok(ConsumeLoopResult::ShutdownRequested);
        }

        let failure = match source.open(request).await {
            Ok(stream) => {
                if let Some(outage) = backoff.on_connected() {
                    info!(
                        failures = outage.failures,
                        downtime_ms = outage.duration().as_millis() as u64,
                        "change stream reopened, resuming consumption at the tail"
                    );
                    counter!(INDEXER_STREAM_RECONNECTIONS_TOTAL).increment(1);
                }

                let mut stream = FilteredChangeStream::new(stream, request.clone());
                let result = start_consume_loop(&mut stream, applier, &mut shutdown_rx, stats).await;

                if let Err(err) = stream.close().await {
                    warn!(error = %err, "failed to close change stream");
                }

                match result {
                    Ok(result) => return Ok(result),
                    Err(err) => {
                        warn!(
                            error = %err,
                            events_received = stats.received,
                            "change stream connection lost"
                        );
                        err
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to open change stream");
                err
            }
        };

        match backoff.on_failure(&failure) {
            RetryDecision::RetryAfter(delay) => {
                info!(
                    failures = backoff.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting to the change stream after backoff"
                );

                if wait_for_retry(delay, &mut shutdown_rx).await {
                    return Ok(ConsumeLoopResult::ShutdownRequested);
                }
            }
            RetryDecision::GiveUp(reason) => {
                error!(
                    error = %failure,
                    %reason,
                    failures = backoff.failures(),
                    "giving up on the change stream"
                );
                return Err(failure);
            }
        }
    }
}

/// Sleeps for `delay`. Returns `true` if shutdown was requested in the meantime.
async fn wait_for_retry(delay: Duration, shutdown_rx: &mut ShutdownRx) -> bool {
    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => {
            info!("shutdown requested while waiting to reconnect");
            true
        }
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn config() -> ReconnectionConfig {
        ReconnectionConfig {
            enabled: true,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_retry_duration_ms: 5000,
        }
    }

    fn connection_reset() -> IndexerError {
        IndexerError::from((ErrorKind::StreamIoError, "connection reset"))
    }

    fn delay_ms(decision: RetryDecision) -> u128 {
        match decision {
            RetryDecision::RetryAfter(delay) => delay.as_millis(),
            RetryDecision::GiveUp(reason) => panic!("unexpected give up: {reason}"),
        }
    }

    #[test]
    fn delays_grow_exponentially_with_jitter() {
        let mut backoff = StreamBackoff::new(config());

        let first = delay_ms(backoff.on_failure(&connection_reset()));
        assert!((100..=130).contains(&first));

        let second = delay_ms(backoff.on_failure(&connection_reset()));
        assert!((200..=260).contains(&second));
        assert_eq!(backoff.failures(), 2);
    }

    #[test]
    fn delay_is_capped() {
        let backoff = StreamBackoff::new(ReconnectionConfig {
            initial_retry_delay_ms: 500,
            backoff_multiplier: 4.0,
            ..config()
        });

        assert!(backoff.delay_for(10).as_millis() <= 1300);
        assert!(backoff.delay_for(u32::MAX).as_millis() <= 1300);
    }

    #[test]
    fn connecting_ends_the_outage() {
        let mut backoff = StreamBackoff::new(config());
        assert!(backoff.on_connected().is_none());

        backoff.on_failure(&connection_reset());
        backoff.on_failure(&connection_reset());

        let outage = backoff.on_connected().unwrap();
        assert_eq!(outage.failures, 2);
        assert!(backoff.outage().is_none());

        let first = delay_ms(backoff.on_failure(&connection_reset()));
        assert!(first <= 130);
    }

    #[test]
    fn only_stream_errors_are_retried() {
        let mut backoff = StreamBackoff::new(config());

        let decision = backoff.on_failure(&IndexerError::from((
            ErrorKind::IndexConnectionFailed,
            "index unreachable",
        )));

        assert_eq!(decision, RetryDecision::GiveUp(GiveUpReason::NotRetryable));
        assert!(backoff.outage().is_none());
        assert!(matches!(
            backoff.on_failure(&IndexerError::from((
                ErrorKind::StreamConnectionFailed,
                "connection refused"
            ))),
            RetryDecision::RetryAfter(_)
        ));
    }

    #[test]
    fn disabled_reconnection_gives_up() {
        let mut backoff = StreamBackoff::new(ReconnectionConfig {
            enabled: false,
            ..config()
        });

        assert_eq!(
            backoff.on_failure(&connection_reset()),
            RetryDecision::GiveUp(GiveUpReason::Disabled)
        );
    }

    #[test]
    fn failure_after_the_window_gives_up() {
        let mut backoff = StreamBackoff::new(ReconnectionConfig {
            max_retry_duration_ms: 0,
            ..config()
        });

        assert!(matches!(
            backoff.on_failure(&connection_reset()),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(
            backoff.on_failure(&connection_reset()),
            RetryDecision::GiveUp(GiveUpReason::WindowExpired)
        );
    }
}
