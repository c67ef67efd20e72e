use crate::services::trust::evaluator::TrustTier;
use database::claim_record::model::ClaimActionType;

/// 每小时提现发起次数上限（与等级无关）
pub const MAX_WITHDRAWAL_ATTEMPTS_PER_HOUR: u32 = 3;

/// 等级对应的限额策略
///
/// 赚取侧超限采取截断(clamp)策略，提现侧超限整笔拒绝。
/// 冷却计时以上一次提现完成时间(last_withdrawal_at)为起点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// 每UTC日可入账的CAMLY上限
    pub daily_earn_ceiling: u64,
    /// 每UTC日可提现的CAMLY上限
    pub daily_withdraw_ceiling: u64,
    /// 两次提现完成之间的冷却（秒）
    pub withdrawal_cooldown_secs: u64,
}

impl TierPolicy {
    pub const fn for_tier(tier: TrustTier) -> Self {
        match tier {
            TrustTier::Restricted => Self {
                daily_earn_ceiling: 1_000,
                daily_withdraw_ceiling: 0,
                withdrawal_cooldown_secs: 7 * 24 * 3600,
            },
            TrustTier::Bronze => Self {
                daily_earn_ceiling: 5_000,
                daily_withdraw_ceiling: 50_000,
                withdrawal_cooldown_secs: 48 * 3600,
            },
            TrustTier::Silver => Self {
                daily_earn_ceiling: 10_000,
                daily_withdraw_ceiling: 100_000,
                withdrawal_cooldown_secs: 24 * 3600,
            },
            TrustTier::Gold => Self {
                daily_earn_ceiling: 20_000,
                daily_withdraw_ceiling: 200_000,
                withdrawal_cooldown_secs: 12 * 3600,
            },
            TrustTier::Platinum => Self {
                daily_earn_ceiling: 50_000,
                daily_withdraw_ceiling: 500_000,
                withdrawal_cooldown_secs: 6 * 3600,
            },
        }
    }
}

/// 各动作的最低信任等级
///
/// 上传奖励与推荐奖励是刷分重灾区，要求至少Bronze；
/// 其余动作（签到、首玩、里程碑等）对新账户开放，由每日上限兜底。
pub fn min_tier_for_action(action: ClaimActionType) -> TrustTier {
    match action {
        ClaimActionType::UploadBonus | ClaimActionType::Referral => TrustTier::Bronze,
        ClaimActionType::FirstPlay
        | ClaimActionType::Milestone
        | ClaimActionType::RoyaltyTick
        | ClaimActionType::DailyCheckin
        | ClaimActionType::Welcome => TrustTier::Restricted,
    }
}
