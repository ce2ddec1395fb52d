//! Request pacing.
//!
//! The source pool does its own rate limiting, but bursty callers still burn
//! through identities. Everything here slows the harvester down on purpose:
//! randomized start jitter, a pause at every page boundary, cooldowns between
//! batches, and safety timeouts that return partial results instead of hanging.

use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

use crate::config::{PacingConfig, MAX_DELAY_SECS};
use crate::models::RawItem;

/// Inclusive range a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(secs_f64(min), secs_f64(max))
    }

    pub const ZERO: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Uniform sample from the range. Degenerate ranges return `min`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Pacing policy shared by topic search and reply expansion.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Upper bound on concurrent topic fetches per batch.
    pub max_batch_workers: usize,
    /// Delay before the first request of a topic search.
    pub initial_jitter: DelayRange,
    /// Items per page boundary pause.
    pub page_size: usize,
    pub page_pause: DelayRange,
    /// Sleep between batches (and between fetch passes).
    pub batch_cooldown: Duration,
    /// Sleep between successive reply-thread fetches.
    pub reply_gap: DelayRange,
    pub search_safety_timeout: Duration,
    pub reply_safety_timeout: Duration,
    /// Assumed worst case for the pool to recover once every identity is limited.
    pub rate_limit_recovery: Duration,
    pub recovery_buffer: Duration,
}

impl From<&PacingConfig> for Pacing {
    fn from(c: &PacingConfig) -> Self {
        Self {
            max_batch_workers: c.max_batch_workers.max(1),
            initial_jitter: DelayRange::from_secs_f64(
                c.initial_jitter_min_secs,
                c.initial_jitter_max_secs,
            ),
            page_size: c.page_size.max(1),
            page_pause: DelayRange::from_secs_f64(c.page_pause_min_secs, c.page_pause_max_secs),
            batch_cooldown: secs_f64(c.batch_cooldown_secs),
            reply_gap: DelayRange::from_secs_f64(c.reply_gap_min_secs, c.reply_gap_max_secs),
            search_safety_timeout: Duration::from_secs(c.search_safety_timeout_secs),
            reply_safety_timeout: Duration::from_secs(c.reply_safety_timeout_secs),
            rate_limit_recovery: Duration::from_secs(c.rate_limit_recovery_secs),
            recovery_buffer: Duration::from_secs(c.recovery_buffer_secs),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from(&PacingConfig::default())
    }
}

impl Pacing {
    /// No deliberate delays; timeouts and batch width keep their defaults.
    ///
    /// Meant for tests and local gateways that do no rate limiting.
    pub fn immediate() -> Self {
        Self {
            initial_jitter: DelayRange::ZERO,
            page_pause: DelayRange::ZERO,
            batch_cooldown: Duration::ZERO,
            reply_gap: DelayRange::ZERO,
            ..Self::default()
        }
    }

    /// Timeout to assume when every identity in the pool is rate-limited.
    pub fn widened_timeout(&self, soft: Duration) -> Duration {
        soft.max(self.rate_limit_recovery + self.recovery_buffer)
    }
}

/// Seconds to a `Duration`, clamped into `0..=MAX_DELAY_SECS`.
///
/// Negative and NaN inputs become zero.
fn secs_f64(secs: f64) -> Duration {
    let ceiling = Duration::from_secs_f64(MAX_DELAY_SECS);
    Duration::try_from_secs_f64(secs.max(0.0))
        .map(|d| d.min(ceiling))
        .unwrap_or(ceiling)
}

/// Items pulled from a pool stream, and whether the deadline cut it short.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub items: Vec<RawItem>,
    pub timed_out: bool,
}

/// Pull items until the stream ends or `deadline` elapses, pausing at every
/// page boundary.
///
/// A deadline hit keeps what was collected. A stream error discards it.
pub(crate) async fn drain_paced(
    mut stream: BoxStream<'_, anyhow::Result<RawItem>>,
    page_size: usize,
    page_pause: DelayRange,
    deadline: Duration,
    label: &str,
    worker: Option<usize>,
) -> anyhow::Result<Drained> {
    let mut items = Vec::new();

    let pull = async {
        while let Some(next) = stream.next().await {
            items.push(next?);
            if items.len() % page_size == 0 {
                let pause = page_pause.sample();
                debug!(
                    worker,
                    unit = label,
                    collected = items.len(),
                    pause_secs = pause.as_secs_f64(),
                    "page boundary pause"
                );
                tokio::time::sleep(pause).await;
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    let finished = tokio::time::timeout(deadline, pull).await;
    let timed_out = match finished {
        Ok(result) => {
            result?;
            false
        }
        Err(_) => true,
    };

    Ok(Drained { items, timed_out })
}
