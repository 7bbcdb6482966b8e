//! Article publishing

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ServiceError, ServiceResult};
use crate::storage::ArticleRepository;

/// Outcome of one auto-publish sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: usize,
    /// Articles that were published concurrently by someone else
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ArticleService {
    articles: Arc<dyn ArticleRepository>,
}

impl ArticleService {
    pub fn new(articles: Arc<dyn ArticleRepository>) -> Self {
        Self { articles }
    }

    /// Publish one draft article and bump its category and tag counters.
    ///
    /// The status check and counter updates happen in one store transaction,
    /// so publishing twice increments the counters once.
    pub async fn publish(&self, id: i64) -> ServiceResult<()> {
        if self.articles.publish_article(id, Utc::now()).await? {
            info!(article_id = id, "Article published");
            Ok(())
        } else {
            Err(ServiceError::AlreadyPublished(id))
        }
    }

    /// Publish every draft whose scheduled time has passed.
    ///
    /// Per-article failures are logged and counted; the sweep carries on.
    pub async fn process_scheduled_publish(&self) -> ServiceResult<PublishReport> {
        let due = self.articles.pending_publish(Utc::now()).await?;
        let mut report = PublishReport::default();

        for article in &due {
            match self.publish(article.id).await {
                Ok(()) => report.published += 1,
                Err(ServiceError::AlreadyPublished(id)) => {
                    debug!(article_id = id, "Article already published, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(article_id = article.id, title = %article.title, error = %e, "Failed to publish scheduled article");
                    report.failed += 1;
                }
            }
        }

        if !due.is_empty() {
            info!(
                published = report.published,
                skipped = report.skipped,
                failed = report.failed,
                "Scheduled publish sweep finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, NewArticle};
    use crate::storage::SqliteStore;
    use chrono::Duration;

    async fn seeded() -> (Arc<SqliteStore>, ArticleService, i64, i64) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let category = store.create_category("rust").await.unwrap();
        let tag = store.create_tag("async").await.unwrap();
        let service = ArticleService::new(store.clone());
        (store, service, category.id, tag.id)
    }

    #[tokio::test]
    async fn test_publish_increments_counters_once() {
        let (store, service, category_id, tag_id) = seeded().await;
        let article = store
            .create_article(&NewArticle {
                title: "Hello".to_string(),
                slug: "hello".to_string(),
                category_id: Some(category_id),
                tag_ids: vec![tag_id],
                publish_at: None,
            })
            .await
            .unwrap();

        service.publish(article.id).await.unwrap();
        assert!(matches!(
            service.publish(article.id).await,
            Err(ServiceError::AlreadyPublished(_))
        ));

        let stored = store.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::Published);
        assert!(stored.publish_at.is_some());
        assert_eq!(store.get_category(category_id).await.unwrap().unwrap().article_count, 1);
        assert_eq!(store.get_tag(tag_id).await.unwrap().unwrap().article_count, 1);
    }

    #[tokio::test]
    async fn test_publish_unknown_article() {
        let (_store, service, _, _) = seeded().await;
        assert!(matches!(service.publish(999).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_publishes_only_due_drafts() {
        let (store, service, category_id, _) = seeded().await;
        let now = Utc::now();

        for (slug, at) in [
            ("past", Some(now - Duration::minutes(5))),
            ("older", Some(now - Duration::days(1))),
            ("future", Some(now + Duration::hours(1))),
            ("unscheduled", None),
        ] {
            store
                .create_article(&NewArticle {
                    title: slug.to_string(),
                    slug: slug.to_string(),
                    category_id: Some(category_id),
                    publish_at: at,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let report = service.process_scheduled_publish().await.unwrap();
        assert_eq!(report, PublishReport { published: 2, skipped: 0, failed: 0 });
        assert_eq!(store.get_category(category_id).await.unwrap().unwrap().article_count, 2);

        // Second sweep finds nothing left to do
        let report = service.process_scheduled_publish().await.unwrap();
        assert_eq!(report, PublishReport::default());
    }
}
