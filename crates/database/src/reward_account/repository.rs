use crate::{reward_account::model::RewardAccount, Database};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use std::sync::Arc;
use utils::{AppError, AppResult};

pub type DynRewardAccountRepository = Arc<dyn RewardAccountRepositoryTrait + Send + Sync>;

/// 账本仓库
///
/// 所有余额变更都是单条带条件的原子存储操作(filtered find_one_and_update + $inc)，
/// 不存在"读余额-判断-写回"的分步路径，因此在任意并发交错下不变量都成立。
#[async_trait]
pub trait RewardAccountRepositoryTrait {
    async fn find_account(&self, user_id: &str) -> AppResult<Option<RewardAccount>>;

    /// 查询账户，不存在则创建（首次注册时惰性建账）
    async fn get_or_create_account(&self, user_id: &str) -> AppResult<RewardAccount>;

    /// 绑定钱包地址
    async fn link_wallet(&self, user_id: &str, wallet_address: &str) -> AppResult<RewardAccount>;

    /// 入账一笔奖励: pending_amount与total_earned同步增加
    async fn credit_claim(&self, user_id: &str, amount: u64) -> AppResult<RewardAccount>;

    /// 预留提现金额: 原子扣减pending_amount，余额不足时返回None(不产生任何变更)
    async fn reserve_for_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>>;

    /// 结算完成: 已预留金额转入claimed_amount，并刷新提现信任信号
    async fn finalize_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>>;

    /// 补偿退款: 已预留金额退回pending_amount
    async fn refund_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>>;

    /// 记录审核通过的上传（信任信号）
    async fn record_approved_upload(&self, user_id: &str) -> AppResult<Option<RewardAccount>>;

    /// 记录一次异常标记（信任信号，负向）
    async fn flag_anomaly(&self, user_id: &str) -> AppResult<Option<RewardAccount>>;
}

#[async_trait]
impl RewardAccountRepositoryTrait for Database {
    async fn find_account(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        let account = self.reward_accounts.find_one(doc! { "user_id": user_id }, None).await?;

        Ok(account)
    }

    async fn get_or_create_account(&self, user_id: &str) -> AppResult<RewardAccount> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        // $setOnInsert: 已存在时是无操作，因此并发的首次访问只会建一个账户
        let update = doc! {
            "$setOnInsert": {
                "user_id": user_id,
                "pending_amount": 0i64,
                "claimed_amount": 0i64,
                "total_earned": 0i64,
                "wallet_address": null,
                "last_withdrawal_at": null,
                "account_created_at": now,
                "successful_withdrawals": 0i32,
                "approved_uploads": 0i32,
                "anomaly_flags": 0i32,
                "updated_at": now,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let account = self
            .reward_accounts
            .find_one_and_update(filter, update, options)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!("upsert returned no account for user {}", user_id))
            })?;

        Ok(account)
    }

    async fn link_wallet(&self, user_id: &str, wallet_address: &str) -> AppResult<RewardAccount> {
        self.get_or_create_account(user_id).await?;

        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! { "$set": { "wallet_address": wallet_address, "updated_at": now } };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self
            .reward_accounts
            .find_one_and_update(filter, update, options)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        Ok(account)
    }

    async fn credit_claim(&self, user_id: &str, amount: u64) -> AppResult<RewardAccount> {
        self.get_or_create_account(user_id).await?;

        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! {
            "$inc": { "pending_amount": amount as i64, "total_earned": amount as i64 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self
            .reward_accounts
            .find_one_and_update(filter, update, options)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        Ok(account)
    }

    async fn reserve_for_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let now = Utc::now().timestamp() as i64;
        // 余额守卫写进过滤器: 两个并发预留不可能都越过pending_amount
        let filter = doc! {
            "user_id": user_id,
            "pending_amount": { "$gte": amount as i64 },
        };
        let update = doc! {
            "$inc": { "pending_amount": -(amount as i64) },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self.reward_accounts.find_one_and_update(filter, update, options).await?;

        Ok(account)
    }

    async fn finalize_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! {
            "$inc": { "claimed_amount": amount as i64, "successful_withdrawals": 1i32 },
            "$set": { "last_withdrawal_at": now, "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self.reward_accounts.find_one_and_update(filter, update, options).await?;

        Ok(account)
    }

    async fn refund_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! {
            "$inc": { "pending_amount": amount as i64 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self.reward_accounts.find_one_and_update(filter, update, options).await?;

        Ok(account)
    }

    async fn record_approved_upload(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! {
            "$inc": { "approved_uploads": 1i32 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self.reward_accounts.find_one_and_update(filter, update, options).await?;

        Ok(account)
    }

    async fn flag_anomaly(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id };
        let update = doc! {
            "$inc": { "anomaly_flags": 1i32 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self.reward_accounts.find_one_and_update(filter, update, options).await?;

        Ok(account)
    }
}
