use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 审计事件类型（claim与提现的每次终态迁移各记一条）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    ClaimApplied,
    ClaimRejected,
    WithdrawalRequested,
    WithdrawalApproved,
    WithdrawalRejected,
    WithdrawalCompleted,
    WithdrawalFailed,
    ReconciliationFlagged,
}

/// 审计事件（仅追加，终态提交后写入）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub user_id: String,
    pub kind: AuditKind,
    /// claim_id或withdrawal_id
    pub reference_id: String,
    pub amount: u64,
    pub tx_hash: Option<String>,
    /// 补充说明（拒绝/失败原因等）
    pub detail: Option<String>,
    pub created_at: u64,
}

impl AuditEvent {
    pub fn new(user_id: &str, kind: AuditKind, reference_id: &str, amount: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            reference_id: reference_id.to_string(),
            amount,
            tx_hash: None,
            detail: None,
            created_at: Utc::now().timestamp() as u64,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: Option<String>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
