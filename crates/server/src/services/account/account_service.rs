use crate::services::trust::{self, TierPolicy, TrustTier};
use async_trait::async_trait;
use chrono::Utc;
use database::{
    cap_window::model::{day_window_key, window},
    reward_account::model::RewardAccount,
    DynCapWindowRepository, DynRewardAccountRepository,
};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use utils::{AppError, AppResult};
use utoipa::ToSchema;

pub type DynAccountService = Arc<dyn AccountServiceTrait + Send + Sync>;

/// 某个限额窗口的当前用量
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CapUsage {
    pub used: u64,
    pub ceiling: u64,
}

/// 账户状态视图：账本余额 + 实时信任评估 + 当日限额用量
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountStatus {
    pub user_id: String,
    pub pending_amount: u64,
    pub claimed_amount: u64,
    pub total_earned: u64,
    pub wallet_address: Option<String>,
    pub trust_score: u8,
    pub tier: TrustTier,
    pub can_withdraw: bool,
    pub daily_earn: CapUsage,
    pub daily_withdraw: CapUsage,
    pub withdrawal_cooldown_secs: u64,
}

#[async_trait]
pub trait AccountServiceTrait {
    /// 账户状态快照（信任分与等级按当前信号实时计算）
    async fn get_account_status(&self, user_id: &str) -> AppResult<AccountStatus>;

    /// 绑定钱包地址（地址必须是合法的Solana公钥）
    async fn link_wallet(&self, user_id: &str, wallet_address: &str) -> AppResult<RewardAccount>;

    /// 上传审核通过信号（正向信任信号，由内容审核系统回调）
    async fn record_approved_upload(&self, user_id: &str) -> AppResult<RewardAccount>;

    /// 异常标记信号（负向信任信号，由风控系统回调）
    async fn flag_anomaly(&self, user_id: &str) -> AppResult<RewardAccount>;
}

#[derive(Clone)]
pub struct AccountService {
    accounts: DynRewardAccountRepository,
    caps: DynCapWindowRepository,
}

impl AccountService {
    pub fn new(accounts: DynRewardAccountRepository, caps: DynCapWindowRepository) -> Self {
        Self { accounts, caps }
    }
}

#[async_trait]
impl AccountServiceTrait for AccountService {
    async fn get_account_status(&self, user_id: &str) -> AppResult<AccountStatus> {
        let account = self
            .accounts
            .find_account(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        let now = Utc::now();
        let assessment = trust::evaluate(&trust::TrustSignals::from_account(&account, now.timestamp() as u64));
        let policy = TierPolicy::for_tier(assessment.tier);

        let earn_key = day_window_key(window::EARN_DAY, now);
        let earn_used = self
            .caps
            .find_window(user_id, &earn_key)
            .await?
            .map(|w| w.consumed_amount)
            .unwrap_or(0);

        let withdraw_key = day_window_key(window::WITHDRAW_AMOUNT_DAY, now);
        let withdraw_used = self
            .caps
            .find_window(user_id, &withdraw_key)
            .await?
            .map(|w| w.consumed_amount)
            .unwrap_or(0);

        Ok(AccountStatus {
            user_id: account.user_id.clone(),
            pending_amount: account.pending_amount,
            claimed_amount: account.claimed_amount,
            total_earned: account.total_earned,
            wallet_address: account.wallet_address.clone(),
            trust_score: assessment.score,
            tier: assessment.tier,
            can_withdraw: assessment.can_withdraw,
            daily_earn: CapUsage {
                used: earn_used,
                ceiling: policy.daily_earn_ceiling,
            },
            daily_withdraw: CapUsage {
                used: withdraw_used,
                ceiling: policy.daily_withdraw_ceiling,
            },
            withdrawal_cooldown_secs: policy.withdrawal_cooldown_secs,
        })
    }

    async fn link_wallet(&self, user_id: &str, wallet_address: &str) -> AppResult<RewardAccount> {
        Pubkey::from_str(wallet_address)
            .map_err(|_| AppError::BadRequest(format!("invalid wallet address: {}", wallet_address)))?;

        let account = self.accounts.link_wallet(user_id, wallet_address).await?;

        Ok(account)
    }

    async fn record_approved_upload(&self, user_id: &str) -> AppResult<RewardAccount> {
        self.accounts.get_or_create_account(user_id).await?;

        let account = self
            .accounts
            .record_approved_upload(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        Ok(account)
    }

    async fn flag_anomaly(&self, user_id: &str) -> AppResult<RewardAccount> {
        self.accounts.get_or_create_account(user_id).await?;

        let account = self
            .accounts
            .flag_anomaly(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        Ok(account)
    }
}
