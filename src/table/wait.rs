//! Bounded Waits
//!
//! Waiting on a counterpart (a commit, a reveal, a phase change) is a
//! polling loop with a caller-chosen interval and deadline. Waits never
//! mutate anything, so dropping the future cancels cleanly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::table::round::{PhaseView, RoundId};
use crate::table::service::{TableError, TableService};

/// Poll interval and deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between probes.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Wait errors.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    /// Deadline passed before the condition held.
    #[error("Timed out after {waited:?}")]
    Timeout {
        /// How long the wait ran.
        waited: Duration,
    },

    /// The probe itself failed.
    #[error(transparent)]
    Probe(E),
}

impl<E> WaitError<E> {
    /// Is this a deadline expiry?
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Poll `probe` until it yields a value or the deadline passes.
pub async fn wait_until<T, E, F, Fut>(config: WaitConfig, mut probe: F) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut probes = 0u32;

    loop {
        probes += 1;
        if let Some(value) = probe().await.map_err(WaitError::Probe)? {
            debug!(probes, elapsed = ?started.elapsed(), "Wait satisfied");
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(probes, timeout = ?config.timeout, "Wait timed out");
            return Err(WaitError::Timeout { waited: now - started });
        }
        tokio::time::sleep(config.interval.min(deadline - now)).await;
    }
}

/// Wait until the round's phase view satisfies `condition`.
pub async fn wait_for_phase<C>(
    service: &TableService,
    round: RoundId,
    config: WaitConfig,
    condition: C,
) -> Result<PhaseView, WaitError<TableError>>
where
    C: Fn(&PhaseView) -> bool,
{
    let condition = &condition;
    wait_until(config, move || async move {
        let view = service.get_phase(round).await?;
        Ok::<_, TableError>(condition(&view).then_some(view))
    })
    .await
}
