use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::db::DbPool;
use crate::models::analytics::PageView;
use crate::models::post::Post;
use crate::models::settings::Setting;
use crate::rate_limit::RateLimiter;
use crate::security::auth;

/// Scheduled posts go out within a minute of their publish date.
const PUBLISH_INTERVAL_SECS: u64 = 60;
/// Session purge and rate-limit sweep cadence.
const MAINTENANCE_INTERVAL_SECS: u64 = 60 * 60;
/// Analytics retention enforcement cadence.
const RETENTION_INTERVAL_SECS: u64 = 24 * 60 * 60;

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let pool = rocket
            .state::<DbPool>()
            .expect("DbPool not found in managed state")
            .clone();
        let limiter = rocket
            .state::<Arc<RateLimiter>>()
            .expect("RateLimiter not found in managed state")
            .clone();

        // Scheduled publish task
        let p = pool.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(PUBLISH_INTERVAL_SECS)).await;
                match Post::publish_due(&p) {
                    Ok(promoted) => {
                        for (id, title) in &promoted {
                            log::info!("[task] Published scheduled post {} ({})", id, title);
                        }
                    }
                    Err(e) => log::error!("[task] Scheduled publish failed: {}", e),
                }
            }
        });

        // Session purge + rate limiter sweep
        let p = pool.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(MAINTENANCE_INTERVAL_SECS)).await;
                match auth::purge_expired_sessions(&p) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Purged {} expired sessions", count);
                        }
                    }
                    Err(e) => log::error!("[task] Session purge failed: {}", e),
                }
                limiter.sweep(Duration::from_secs(24 * 60 * 60));
            }
        });

        // Analytics retention task
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(RETENTION_INTERVAL_SECS)).await;
                let retention = Setting::get_i64_or(&pool, "analytics_retention_days", 90);
                match PageView::prune(&pool, retention) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!(
                                "[task] Pruned {} analytics records older than {} days",
                                count, retention
                            );
                        }
                    }
                    Err(e) => log::error!("[task] Analytics prune failed: {}", e),
                }
            }
        });

        log::info!("[task] Background tasks started");
    }
}
