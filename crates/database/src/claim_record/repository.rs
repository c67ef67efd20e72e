use crate::{
    claim_record::model::{ClaimRecord, ClaimStatus},
    Database,
};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use std::sync::Arc;
use utils::{AppError, AppResult};

pub type DynClaimRecordRepository = Arc<dyn ClaimRecordRepositoryTrait + Send + Sync>;

/// insert_pending的结果
#[derive(Debug, Clone)]
pub enum ClaimInsertOutcome {
    /// 本调用方赢得了该claim_id，允许继续执行入账流程
    Inserted,
    /// claim_id已存在，返回已有记录（幂等重放）
    Duplicate(ClaimRecord),
}

#[async_trait]
pub trait ClaimRecordRepositoryTrait {
    /// 以Pending态插入记录，靠claim_id唯一索引裁决并发竞争。
    /// 应用层锁在进程重启/重试场景下不可靠，幂等性必须锚定在存储层约束上。
    async fn insert_pending(&self, record: &ClaimRecord) -> AppResult<ClaimInsertOutcome>;

    async fn find_by_claim_id(&self, claim_id: &str) -> AppResult<Option<ClaimRecord>>;

    /// CAS Pending -> Applied，记录实际入账金额
    async fn mark_applied(&self, claim_id: &str, applied_amount: u64) -> AppResult<Option<ClaimRecord>>;

    /// CAS Pending -> Rejected，同样是终态并关闭幂等窗口
    async fn mark_rejected(&self, claim_id: &str, reason: &str) -> AppResult<Option<ClaimRecord>>;

    /// CAS接管一条疑似宿主崩溃的Pending记录。
    /// 过滤条件要求updated_at早于stale_before，接管方把updated_at刷新到当前时刻，
    /// 并发的多个接管者中恰好一个能赢——这是防止Pending永久卡死的恢复通道。
    async fn reclaim_stale_pending(&self, claim_id: &str, stale_before: u64) -> AppResult<Option<ClaimRecord>>;
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

#[async_trait]
impl ClaimRecordRepositoryTrait for Database {
    async fn insert_pending(&self, record: &ClaimRecord) -> AppResult<ClaimInsertOutcome> {
        match self.claim_records.insert_one(record, None).await {
            Ok(_) => Ok(ClaimInsertOutcome::Inserted),
            Err(e) if is_duplicate_key_error(&e) => {
                let existing = self
                    .claim_records
                    .find_one(doc! { "claim_id": &record.claim_id }, None)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(format!("Claim {} exists but could not be loaded.", record.claim_id))
                    })?;

                Ok(ClaimInsertOutcome::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_claim_id(&self, claim_id: &str) -> AppResult<Option<ClaimRecord>> {
        let record = self.claim_records.find_one(doc! { "claim_id": claim_id }, None).await?;

        Ok(record)
    }

    async fn mark_applied(&self, claim_id: &str, applied_amount: u64) -> AppResult<Option<ClaimRecord>> {
        let filter = doc! {
            "claim_id": claim_id,
            "status": ClaimStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": ClaimStatus::Applied.as_str(),
                "applied_amount": applied_amount as i64,
                "updated_at": Utc::now().timestamp(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let record = self.claim_records.find_one_and_update(filter, update, options).await?;

        Ok(record)
    }

    async fn mark_rejected(&self, claim_id: &str, reason: &str) -> AppResult<Option<ClaimRecord>> {
        let filter = doc! {
            "claim_id": claim_id,
            "status": ClaimStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": ClaimStatus::Rejected.as_str(),
                "reject_reason": reason,
                "updated_at": Utc::now().timestamp(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let record = self.claim_records.find_one_and_update(filter, update, options).await?;

        Ok(record)
    }

    async fn reclaim_stale_pending(&self, claim_id: &str, stale_before: u64) -> AppResult<Option<ClaimRecord>> {
        let filter = doc! {
            "claim_id": claim_id,
            "status": ClaimStatus::Pending.as_str(),
            "updated_at": { "$lt": stale_before as i64 },
        };
        // 刷新租约即宣告接管；第二个接管者的过滤条件不再命中
        let update = doc! {
            "$set": { "updated_at": Utc::now().timestamp() }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let record = self.claim_records.find_one_and_update(filter, update, options).await?;

        Ok(record)
    }
}
