use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::services::scrape::{ScrapeRequest, ScrapeService};

/// Periodic scrape of every source. Runs go through the cooldown like any
/// other request, so a tick right after a manual scrape is a cache hit.
pub struct Scheduler {
    scrape: ScrapeService,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(scrape: ScrapeService, config: SchedulerConfig) -> Self {
        Self {
            scrape,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let scrape = self.scrape.clone();
        let running = Arc::clone(&self.running);
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let scrape = scrape.clone();
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                scrape_all(&scrape).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.scrape_interval_minutes.max(1);
        info!("Scheduler running: scrape every {}m", interval_mins);

        let mut ticker = interval(Duration::from_secs(u64::from(interval_mins) * 60));

        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                break;
            }
            scrape_all(&self.scrape).await;
        }

        Ok(())
    }
}

async fn scrape_all(scrape: &ScrapeService) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "scrape_all", "Starting scheduled scrape");

    match scrape.run(ScrapeRequest::default()).await {
        Ok(outcome) => info!(
            event = "job_finished",
            job_name = "scrape_all",
            new_properties = outcome.new_properties,
            cached = outcome.cached,
            failed = outcome.failed,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduled scrape finished"
        ),
        Err(e) => {
            error!(event = "job_failed", job_name = "scrape_all", error = %e, "Scheduled scrape failed");
        }
    }
}
