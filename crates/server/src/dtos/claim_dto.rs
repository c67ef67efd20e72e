use crate::services::claim::ClaimOutcome;
use database::claim_record::model::{ClaimActionType, ClaimStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 奖励领取请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, ToSchema)]
pub struct SubmitClaimDto {
    #[validate(length(min = 1))]
    pub user_id: String,
    pub action_type: ClaimActionType,
    /// 幂等引用（上传ID、游戏会话ID、里程碑阈值等）
    #[validate(length(min = 1))]
    pub external_ref_id: String,
    /// 请求入账的金额（CAMLY最小单位）
    #[validate(range(min = 1))]
    pub amount: u64,
}

/// 领取结果（重放时返回首次的终态）
#[derive(Clone, Serialize, Deserialize, Debug, ToSchema)]
pub struct ClaimResultDto {
    pub claim_id: String,
    pub status: ClaimStatus,
    pub requested_amount: u64,
    /// 实际入账金额（被每日上限截断时小于requested_amount）
    pub applied_amount: u64,
    pub reject_reason: Option<String>,
    /// 是否命中幂等重放
    pub replayed: bool,
}

impl From<ClaimOutcome> for ClaimResultDto {
    fn from(outcome: ClaimOutcome) -> Self {
        Self {
            claim_id: outcome.record.claim_id,
            status: outcome.record.status,
            requested_amount: outcome.record.requested_amount,
            applied_amount: outcome.record.applied_amount,
            reject_reason: outcome.record.reject_reason,
            replayed: outcome.replayed,
        }
    }
}
