use database::reward_account::model::RewardAccount;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 允许提现的最低信任分
pub const MIN_WITHDRAW_SCORE: u8 = 30;

/// 账龄贡献上限（每天+1分）
const MAX_AGE_POINTS: i64 = 20;
/// 绑定钱包的一次性加分
const WALLET_LINKED_POINTS: i64 = 20;
/// 每次成功提现的加分：20, 17, 14, ... 递减到下限7
const WITHDRAWAL_POINTS_START: i64 = 20;
const WITHDRAWAL_POINTS_STEP: i64 = 3;
/// 每个审核通过上传的加分：15, 13, 11, ... 递减到下限7
const UPLOAD_POINTS_START: i64 = 15;
const UPLOAD_POINTS_STEP: i64 = 2;
/// 信号下限（递减序列不会低于此值）
const SIGNAL_POINTS_FLOOR: i64 = 7;
/// 每次异常标记的扣分
const ANOMALY_PENALTY: i64 = 15;

/// 信任等级（由信任分推导，Ord顺序即特权顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum TrustTier {
    Restricted,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Restricted => "Restricted",
            TrustTier::Bronze => "Bronze",
            TrustTier::Silver => "Silver",
            TrustTier::Gold => "Gold",
            TrustTier::Platinum => "Platinum",
        }
    }

    /// 分数 -> 等级: >=50 Platinum, >=40 Gold, >=30 Silver, >=20 Bronze, 否则 Restricted
    pub fn from_score(score: u8) -> Self {
        match score {
            50..=u8::MAX => TrustTier::Platinum,
            40..=49 => TrustTier::Gold,
            30..=39 => TrustTier::Silver,
            20..=29 => TrustTier::Bronze,
            _ => TrustTier::Restricted,
        }
    }
}

/// 信任信号快照（全部来自已持久化的账户字段，无隐藏状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustSignals {
    pub account_age_days: u64,
    pub wallet_linked: bool,
    pub successful_withdrawals: u32,
    pub approved_uploads: u32,
    pub anomaly_flags: u32,
}

impl TrustSignals {
    pub fn from_account(account: &RewardAccount, now: u64) -> Self {
        Self {
            account_age_days: account.account_age_days(now),
            wallet_linked: account.wallet_address.is_some(),
            successful_withdrawals: account.successful_withdrawals,
            approved_uploads: account.approved_uploads,
            anomaly_flags: account.anomaly_flags,
        }
    }
}

/// 评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustAssessment {
    pub score: u8,
    pub tier: TrustTier,
    pub can_withdraw: bool,
}

/// 递减加分序列之和: start, start-step, start-2*step, ... 不低于floor
fn diminishing_sum(count: u32, start: i64, step: i64, floor: i64) -> i64 {
    (0..count as i64).map(|i| (start - i * step).max(floor)).sum()
}

/// 计算信任评估
///
/// 纯函数：同一组信号必然得到同一结果，审计时可复现。
/// 缺失的信号按其最小贡献(0)计入，从不跳过。
pub fn evaluate(signals: &TrustSignals) -> TrustAssessment {
    let mut score: i64 = 0;

    score += (signals.account_age_days as i64).min(MAX_AGE_POINTS);
    if signals.wallet_linked {
        score += WALLET_LINKED_POINTS;
    }
    score += diminishing_sum(
        signals.successful_withdrawals,
        WITHDRAWAL_POINTS_START,
        WITHDRAWAL_POINTS_STEP,
        SIGNAL_POINTS_FLOOR,
    );
    score += diminishing_sum(
        signals.approved_uploads,
        UPLOAD_POINTS_START,
        UPLOAD_POINTS_STEP,
        SIGNAL_POINTS_FLOOR,
    );
    score -= signals.anomaly_flags as i64 * ANOMALY_PENALTY;

    let score = score.clamp(0, 100) as u8;
    let tier = TrustTier::from_score(score);
    // 未绑定钱包时无论分数多高都不可提现
    let can_withdraw = score >= MIN_WITHDRAW_SCORE && signals.wallet_linked;

    TrustAssessment {
        score,
        tier,
        can_withdraw,
    }
}
