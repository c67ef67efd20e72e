use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// 提现状态机
///
/// PendingApproval -> Approved -> Processing -> Completed
///                 \-> Rejected          \-> Failed
///
/// 资金只在 Approved -> Processing 时被预留，
/// Completed时转入claimed_amount，Failed时退回pending_amount。
/// Completed/Failed/Rejected均为永久终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WithdrawalStatus {
    PendingApproval,
    Approved,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::PendingApproval => "PendingApproval",
            WithdrawalStatus::Approved => "Approved",
            WithdrawalStatus::Processing => "Processing",
            WithdrawalStatus::Completed => "Completed",
            WithdrawalStatus::Failed => "Failed",
            WithdrawalStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Failed | WithdrawalStatus::Rejected
        )
    }

    /// 合法迁移表，除此之外的任何迁移都是非法的
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (Approved, Processing)
                | (Approved, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

/// 提现请求（状态机实体）
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct WithdrawalRequest {
    pub withdrawal_id: String,
    pub user_id: String,
    /// 目标钱包地址（创建时从账户快照，之后换绑不影响在途提现）
    pub wallet_address: String,
    pub amount: u64,
    pub status: WithdrawalStatus,
    /// 链上交易哈希；只要广播过就记录，即使未确认
    pub tx_hash: Option<String>,
    /// 失败原因（仅Failed态）
    pub failure_reason: Option<String>,
    /// 审批备注，仅追加
    pub admin_notes: Vec<String>,
    /// 已广播但确认超时的交易可能事后上链，需要人工对账
    pub needs_reconciliation: bool,
    /// 对账任务是否已提醒过（避免每日重复告警）
    pub reconciliation_flagged: bool,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl WithdrawalRequest {
    pub fn new(user_id: String, wallet_address: String, amount: u64) -> Self {
        Self {
            withdrawal_id: Uuid::new_v4().to_string(),
            user_id,
            wallet_address,
            amount,
            status: WithdrawalStatus::PendingApproval,
            tx_hash: None,
            failure_reason: None,
            admin_notes: Vec::new(),
            needs_reconciliation: false,
            reconciliation_flagged: false,
            created_at: Utc::now().timestamp() as u64,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
