//! Daily trigger for the digest pipeline.
//!
//! The trigger owns the failure policy: every error or panic of a run is
//! logged and swallowed, so the schedule keeps going. Overlapping triggers
//! are refused while a run is in flight.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use common::Config;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::pipeline::DigestGenerator;

/// What a trigger did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Disabled,
    AlreadyRunning,
    Completed { posts: usize },
    Failed,
}

/// Single-flight wrapper around [`DigestGenerator`].
#[derive(Debug)]
pub struct DailyDigestJob {
    running: Mutex<()>,
    dry_run: bool,
}

impl DailyDigestJob {
    pub fn new(dry_run: bool) -> Self {
        Self {
            running: Mutex::new(()),
            dry_run,
        }
    }

    /// Run once with the HTTP implementations described by `config`.
    pub async fn execute(&self, config: &Config) -> RunOutcome {
        if !config.digest.enabled {
            warn!("Daily digest is disabled, skipping");
            return RunOutcome::Disabled;
        }

        match DigestGenerator::from_config(config, self.dry_run) {
            Ok(generator) => self.execute_with(config, generator).await,
            Err(e) => {
                error!("Error generating daily digest: {:?}", e);
                RunOutcome::Failed
            }
        }
    }

    /// Run once with an already wired generator.
    pub async fn execute_with(&self, config: &Config, generator: DigestGenerator) -> RunOutcome {
        if !config.digest.enabled {
            warn!("Daily digest is disabled, skipping");
            return RunOutcome::Disabled;
        }

        let Ok(_guard) = self.running.try_lock() else {
            warn!("Daily digest run already in progress, skipping");
            return RunOutcome::AlreadyRunning;
        };

        info!("Daily digest run starting");
        let started = std::time::Instant::now();
        let config = config.clone();

        // Run on its own task so a panic is contained and reported like an error.
        let handle = tokio::spawn(async move { generator.generate_and_post(&config, Utc::now()).await });

        match handle.await {
            Ok(Ok(posts)) => {
                info!(posts, elapsed_ms = started.elapsed().as_millis() as u64, "Daily digest run finished");
                RunOutcome::Completed { posts }
            }
            Ok(Err(e)) => {
                error!("Error generating daily digest: {:?}", e);
                RunOutcome::Failed
            }
            Err(join_err) => {
                error!(%join_err, "Daily digest run panicked");
                RunOutcome::Failed
            }
        }
    }
}

/// Next occurrence of wall-clock `at` strictly after `now`, in `now`'s zone.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    // Local times skipped by a DST jump have no mapping; try the next day.
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        date = date + ChronoDuration::days(1);
    }

    now.clone() + ChronoDuration::days(1)
}
