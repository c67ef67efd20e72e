use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 用户奖励账户模型（链下账本的权威余额）
///
/// 余额不变量:
/// - total_earned 单调不减
/// - claimed_amount 恰好等于所有已完成结算的金额之和
/// - pending_amount 永远 >= 0（由带条件的原子扣减保证）
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RewardAccount {
    /// 用户ID（唯一标识）
    pub user_id: String,
    /// 待提现余额（CAMLY最小单位）
    pub pending_amount: u64,
    /// 已结算到链上的累计金额
    pub claimed_amount: u64,
    /// 生命周期累计获得
    pub total_earned: u64,
    /// 绑定的钱包地址（未绑定时不可提现）
    pub wallet_address: Option<String>,
    /// 最近一次提现完成时间戳
    pub last_withdrawal_at: Option<u64>,
    /// 账户创建时间戳（信任信号：账龄）
    pub account_created_at: u64,
    /// 成功提现次数（信任信号）
    pub successful_withdrawals: u32,
    /// 审核通过的上传数（信任信号）
    pub approved_uploads: u32,
    /// 异常标记次数（信任信号，负向）
    pub anomaly_flags: u32,
    /// 更新时间戳
    pub updated_at: u64,
}

impl RewardAccount {
    pub fn new(user_id: String) -> Self {
        let now = Utc::now().timestamp() as u64;
        Self {
            user_id,
            pending_amount: 0,
            claimed_amount: 0,
            total_earned: 0,
            wallet_address: None,
            last_withdrawal_at: None,
            account_created_at: now,
            successful_withdrawals: 0,
            approved_uploads: 0,
            anomaly_flags: 0,
            updated_at: now,
        }
    }

    /// 账龄（天）
    pub fn account_age_days(&self, now: u64) -> u64 {
        now.saturating_sub(self.account_created_at) / 86_400
    }
}
