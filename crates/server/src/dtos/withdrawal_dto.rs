use crate::services::settlement::SettlementOutcome;
use database::withdrawal::model::WithdrawalStatus;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 发起提现的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, ToSchema)]
pub struct RequestWithdrawalDto {
    #[validate(length(min = 1))]
    pub user_id: String,
    /// 提现金额（CAMLY最小单位）
    #[validate(range(min = 1))]
    pub amount: u64,
}

/// 审批请求体（approve/reject共用）
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Default, ToSchema)]
pub struct ReviewWithdrawalDto {
    /// 审批人（鉴权在上游网关完成，这里只做留痕）
    #[validate(length(min = 1, max = 64))]
    pub admin_id: String,
    /// 审批备注（追加到admin_notes）
    #[validate(length(max = 256))]
    pub note: Option<String>,
}

/// 结算结果
#[derive(Clone, Serialize, Deserialize, Debug, ToSchema)]
pub struct SettlementResultDto {
    pub withdrawal_id: String,
    pub user_id: String,
    pub status: WithdrawalStatus,
    pub amount: u64,
    pub tx_hash: Option<String>,
    pub failure_reason: Option<String>,
    /// 已广播未确认，待人工对账
    pub needs_reconciliation: bool,
    /// 是否命中终态重放
    pub replayed: bool,
}

impl From<SettlementOutcome> for SettlementResultDto {
    fn from(outcome: SettlementOutcome) -> Self {
        Self {
            withdrawal_id: outcome.request.withdrawal_id,
            user_id: outcome.request.user_id,
            status: outcome.request.status,
            amount: outcome.request.amount,
            tx_hash: outcome.request.tx_hash,
            failure_reason: outcome.request.failure_reason,
            needs_reconciliation: outcome.request.needs_reconciliation,
            replayed: outcome.replayed,
        }
    }
}
