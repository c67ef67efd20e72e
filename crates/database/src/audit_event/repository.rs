use crate::{audit_event::model::AuditEvent, Database};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions};
use std::sync::Arc;
use utils::AppResult;

pub type DynAuditEventRepository = Arc<dyn AuditEventRepositoryTrait + Send + Sync>;

#[async_trait]
pub trait AuditEventRepositoryTrait {
    /// 追加一条审计事件。只在账本迁移持久化之后调用（post-commit）。
    async fn append(&self, event: AuditEvent) -> AppResult<()>;

    /// 某用户最近的审计事件（按时间倒序）
    async fn list_by_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<AuditEvent>>;
}

#[async_trait]
impl AuditEventRepositoryTrait for Database {
    async fn append(&self, event: AuditEvent) -> AppResult<()> {
        self.audit_events.insert_one(event, None).await?;

        Ok(())
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<AuditEvent>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();

        let cursor = self.audit_events.find(doc! { "user_id": user_id }, options).await?;
        let events = cursor.try_collect().await?;

        Ok(events)
    }
}
