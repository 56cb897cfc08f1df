use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::db::Store;

/// Whether a source may be scraped again.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Scraped within the cooldown; the stored summary stands in for a run.
    Fresh {
        last_run_at: DateTime<Utc>,
        summary: serde_json::Value,
    },
    Stale,
}

impl GateDecision {
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

/// Per-source cooldown over the recorded scrape runs.
#[derive(Clone)]
pub struct CacheGate {
    store: Store,
    cooldown: Duration,
}

impl CacheGate {
    #[must_use]
    pub const fn new(store: Store, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn check(&self, source: &str, force: bool, now: DateTime<Utc>) -> Result<GateDecision> {
        if force {
            return Ok(GateDecision::Stale);
        }

        let run = self.store.get_scrape_run(source).await?;
        Ok(decide(run.map(|r| (r.last_run_at, r.summary)), self.cooldown, now))
    }
}

/// A run exactly `cooldown` old is already stale.
fn decide(
    last: Option<(DateTime<Utc>, serde_json::Value)>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> GateDecision {
    match last {
        Some((last_run_at, summary)) if now - last_run_at < cooldown => GateDecision::Fresh {
            last_run_at,
            summary,
        },
        _ => GateDecision::Stale,
    }
}
