use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::services::error::ServiceError;
use crate::services::publish_service::{PublishResult, PublishService, RetryPolicy};
use crate::services::token_service::TokenService;
use crate::state::AppState;

pub const STALE_PUBLISHING_REASON: &str = "publishing did not finish; check the platform before publishing again";

/// What one scheduler pass did
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub purged_states: u64,
    pub stale_failed: u64,
    pub claimed: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    pub tokens_refreshed: usize,
    pub token_failures: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.purged_states == 0
            && self.stale_failed == 0
            && self.claimed == 0
            && self.tokens_refreshed == 0
            && self.token_failures == 0
    }
}

pub struct Scheduler {
    state: AppState,
}

impl Scheduler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Purge stale OAuth states, fail abandoned publications, publish due posts,
    /// refresh expiring tokens
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, ServiceError> {
        let config = &self.state.config.scheduler;
        let mut report = TickReport {
            purged_states: self.state.store.purge_oauth_states(now).await?,
            ..TickReport::default()
        };

        // never retried automatically: the platform may already have the post
        let stale_before = now - chrono::Duration::seconds(config.publishing_timeout_secs);
        report.stale_failed = self
            .state
            .store
            .fail_stale_publishing(stale_before, STALE_PUBLISHING_REASON, now)
            .await?;
        if report.stale_failed > 0 {
            warn!("Failed {} post(s) stuck in publishing since before {}", report.stale_failed, stale_before);
        }

        let claimed = self.state.store.claim_due_posts(now, config.batch_size).await?;
        report.claimed = claimed.len();

        let publisher = PublishService::new(self.state.clone());
        let policy = RetryPolicy::from_config(config);
        let results: Vec<_> = stream::iter(claimed)
            .map(|post| {
                let publisher = &publisher;
                async move {
                    let id = post.id;
                    (id, publisher.publish_claimed(post, Some(policy)).await)
                }
            })
            .buffer_unordered(config.max_concurrency.max(1))
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok((_, PublishResult::Published)) => report.published += 1,
                Ok((_, PublishResult::Retrying)) => report.retried += 1,
                Ok((_, PublishResult::Failed)) => report.failed += 1,
                Err(e) => {
                    // left in Publishing, or already moved on; the stale sweep settles the former
                    error!("Could not record outcome of post {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        let refresh = TokenService::new(self.state.clone()).refresh_due_accounts(now).await?;
        report.tokens_refreshed = refresh.refreshed;
        report.token_failures = refresh.reauth_required + refresh.failed;

        if report.is_idle() {
            debug!("Scheduler tick: nothing to do");
        } else {
            info!(
                "Scheduler tick: {} claimed, {} published, {} retrying, {} failed, {} tokens refreshed",
                report.claimed, report.published, report.retried, report.failed, report.tokens_refreshed
            );
        }
        Ok(report)
    }

    /// Tick every `poll_interval_secs` until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.state.config.scheduler.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Scheduler started, polling every {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Scheduler tick failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::Post;
    use crate::database::MemoryStore;
    use crate::platforms::PlatformClients;
    use crate::services::media_service::LocalMediaStore;
    use crate::types::{Platform, PostKind, PostStatus};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn state() -> AppState {
        let config = AppConfig::development();
        let media = LocalMediaStore::open(std::env::temp_dir().join(format!("relay-sched-{}", Uuid::new_v4())))
            .await
            .unwrap();
        let platforms = PlatformClients::new(&config.platforms).unwrap();
        AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(media), platforms)
    }

    #[tokio::test]
    async fn idle_tick_reports_nothing() {
        let state = state().await;
        let report = Scheduler::new(state).tick(Utc::now()).await.unwrap();
        assert!(report.is_idle());
    }

    #[tokio::test]
    async fn post_without_account_fails_permanently() {
        let state = state().await;
        let now = Utc::now();
        let mut post = Post::new(Uuid::new_v4(), Uuid::new_v4(), Platform::Facebook, PostKind::Text, now);
        post.body = Some("orphan".into());
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(now - ChronoDuration::seconds(5));
        state.store.insert_post(&post).await.unwrap();

        let report = Scheduler::new(state.clone()).tick(now).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.failed, 1);

        let stored = state.store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.is_some());

        // a failed post is never claimed again
        let report = Scheduler::new(state).tick(now).await.unwrap();
        assert_eq!(report.claimed, 0);
    }

    #[tokio::test]
    async fn abandoned_publications_are_failed() {
        let state = state().await;
        let now = Utc::now();
        let mut post = Post::new(Uuid::new_v4(), Uuid::new_v4(), Platform::Facebook, PostKind::Text, now);
        post.body = Some("stuck".into());
        post.status = PostStatus::Publishing;
        post.updated_at = now - ChronoDuration::hours(1);
        state.store.insert_post(&post).await.unwrap();

        let report = Scheduler::new(state.clone()).tick(now).await.unwrap();
        assert_eq!(report.stale_failed, 1);
        assert_eq!(report.claimed, 0);
        assert!(!report.is_idle());

        let stored = state.store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some(STALE_PUBLISHING_REASON));
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let state = state().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(state).run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
