use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use validator::Validate;

/// 奖励动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimActionType {
    UploadBonus,
    FirstPlay,
    Milestone,
    RoyaltyTick,
    Referral,
    DailyCheckin,
    Welcome,
}

impl ClaimActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimActionType::UploadBonus => "upload_bonus",
            ClaimActionType::FirstPlay => "first_play",
            ClaimActionType::Milestone => "milestone",
            ClaimActionType::RoyaltyTick => "royalty_tick",
            ClaimActionType::Referral => "referral",
            ClaimActionType::DailyCheckin => "daily_checkin",
            ClaimActionType::Welcome => "welcome",
        }
    }
}

/// Claim状态机: Pending -> Applied | Rejected，终态后不再变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ClaimStatus {
    Pending,
    Applied,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Applied => "Applied",
            ClaimStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Applied | ClaimStatus::Rejected)
    }
}

/// 奖励领取记录（终态后不可变，永久保留作为审计痕迹）
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ClaimRecord {
    /// 幂等键: 由(user_id, action_type, external_ref_id)确定性推导
    pub claim_id: String,
    pub user_id: String,
    pub action_type: ClaimActionType,
    /// 调用方请求的金额
    pub requested_amount: u64,
    /// 实际入账金额（被上限截断时小于requested_amount）
    pub applied_amount: u64,
    pub status: ClaimStatus,
    /// 拒绝原因（仅Rejected态）
    pub reject_reason: Option<String>,
    pub created_at: u64,
    /// 宿主租约时间戳：Pending态下宿主最后一次推进流程的时间。
    /// 超过租约窗口仍未到终态的Pending视为宿主崩溃，可被重试方CAS接管
    pub updated_at: u64,
}

impl ClaimRecord {
    pub fn new_pending(
        user_id: String,
        action_type: ClaimActionType,
        external_ref_id: &str,
        requested_amount: u64,
    ) -> Self {
        let claim_id = Self::derive_claim_id(&user_id, action_type, external_ref_id);
        Self {
            claim_id,
            user_id,
            action_type,
            requested_amount,
            applied_amount: 0,
            status: ClaimStatus::Pending,
            reject_reason: None,
            created_at: Utc::now().timestamp() as u64,
            updated_at: Utc::now().timestamp() as u64,
        }
    }

    /// 确定性推导claim_id
    ///
    /// 同一(user_id, action_type, external_ref_id)必然得到同一id，
    /// 重放因ClaimRecord.claim_id唯一索引而变成no-op。
    pub fn derive_claim_id(user_id: &str, action_type: ClaimActionType, external_ref_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b":");
        hasher.update(action_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(external_ref_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// 里程碑的external_ref_id由阈值本身构成，
    /// 无论底层计数被重算多少次，每个里程碑至多触发一次
    pub fn milestone_ref(threshold: u64) -> String {
        format!("milestone-{}", threshold)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
