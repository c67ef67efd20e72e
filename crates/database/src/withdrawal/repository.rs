use crate::{
    withdrawal::model::{WithdrawalRequest, WithdrawalStatus},
    Database,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use std::sync::Arc;
use utils::{AppError, AppResult};

pub type DynWithdrawalRepository = Arc<dyn WithdrawalRepositoryTrait + Send + Sync>;

/// 提现仓库
///
/// 每次状态迁移都是带前置状态过滤的find_one_and_update(即CAS)。
/// 返回None表示前置状态不匹配——要么已被并发方迁移，要么处于终态，
/// 由调用方读出当前状态后做幂等重放或报冲突。
#[async_trait]
pub trait WithdrawalRepositoryTrait {
    async fn insert_request(&self, request: &WithdrawalRequest) -> AppResult<()>;

    async fn find_by_id(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>>;

    /// CAS状态迁移，可附带一条审批备注（admin_notes仅追加）
    async fn transition(
        &self,
        withdrawal_id: &str,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        note: Option<&str>,
    ) -> AppResult<Option<WithdrawalRequest>>;

    /// CAS Processing -> Completed，记录tx_hash与完成时间
    async fn complete(&self, withdrawal_id: &str, tx_hash: &str) -> AppResult<Option<WithdrawalRequest>>;

    /// CAS Processing -> Failed，记录失败原因；
    /// 若交易已广播则必须带上tx_hash，确认超时的还要标记待对账
    async fn fail(
        &self,
        withdrawal_id: &str,
        reason: &str,
        tx_hash: Option<&str>,
        needs_reconciliation: bool,
    ) -> AppResult<Option<WithdrawalRequest>>;

    /// 所有待对账的Failed提现（已广播未确认）
    async fn list_needing_reconciliation(&self) -> AppResult<Vec<WithdrawalRequest>>;

    /// 对账任务已提醒，避免重复告警
    async fn mark_reconciliation_flagged(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>>;
}

#[async_trait]
impl WithdrawalRepositoryTrait for Database {
    async fn insert_request(&self, request: &WithdrawalRequest) -> AppResult<()> {
        self.withdrawals.insert_one(request, None).await?;

        Ok(())
    }

    async fn find_by_id(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>> {
        let request = self
            .withdrawals
            .find_one(doc! { "withdrawal_id": withdrawal_id }, None)
            .await?;

        Ok(request)
    }

    async fn transition(
        &self,
        withdrawal_id: &str,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        note: Option<&str>,
    ) -> AppResult<Option<WithdrawalRequest>> {
        if !from.can_transition_to(to) {
            return Err(AppError::BadRequest(format!(
                "illegal withdrawal transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let filter = doc! {
            "withdrawal_id": withdrawal_id,
            "status": from.as_str(),
        };
        let mut update = doc! { "$set": { "status": to.as_str() } };
        if let Some(note) = note {
            update.insert("$push", doc! { "admin_notes": note });
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let request = self.withdrawals.find_one_and_update(filter, update, options).await?;

        Ok(request)
    }

    async fn complete(&self, withdrawal_id: &str, tx_hash: &str) -> AppResult<Option<WithdrawalRequest>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! {
            "withdrawal_id": withdrawal_id,
            "status": WithdrawalStatus::Processing.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": WithdrawalStatus::Completed.as_str(),
                "tx_hash": tx_hash,
                "completed_at": now,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let request = self.withdrawals.find_one_and_update(filter, update, options).await?;

        Ok(request)
    }

    async fn fail(
        &self,
        withdrawal_id: &str,
        reason: &str,
        tx_hash: Option<&str>,
        needs_reconciliation: bool,
    ) -> AppResult<Option<WithdrawalRequest>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! {
            "withdrawal_id": withdrawal_id,
            "status": WithdrawalStatus::Processing.as_str(),
        };
        let mut set = doc! {
            "status": WithdrawalStatus::Failed.as_str(),
            "failure_reason": reason,
            "needs_reconciliation": needs_reconciliation,
            "completed_at": now,
        };
        if let Some(tx_hash) = tx_hash {
            set.insert("tx_hash", tx_hash);
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let request = self
            .withdrawals
            .find_one_and_update(filter, doc! { "$set": set }, options)
            .await?;

        Ok(request)
    }

    async fn list_needing_reconciliation(&self) -> AppResult<Vec<WithdrawalRequest>> {
        let filter = doc! {
            "status": WithdrawalStatus::Failed.as_str(),
            "needs_reconciliation": true,
            "reconciliation_flagged": false,
        };

        let cursor = self.withdrawals.find(filter, None).await?;
        let requests = cursor.try_collect().await?;

        Ok(requests)
    }

    async fn mark_reconciliation_flagged(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>> {
        let filter = doc! {
            "withdrawal_id": withdrawal_id,
            "needs_reconciliation": true,
        };
        let update = doc! { "$set": { "reconciliation_flagged": true } };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let request = self.withdrawals.find_one_and_update(filter, update, options).await?;

        Ok(request)
    }
}
