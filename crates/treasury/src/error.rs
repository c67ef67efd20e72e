use thiserror::Error;

/// 链上操作错误
///
/// 除ConfirmationTimeout外，其余变体都保证交易未生效；
/// ConfirmationTimeout表示交易已广播但在超时窗口内未观察到确认，
/// 它可能事后仍然上链——这是整个系统唯一不可消除的风险点，
/// 必须携带签名交给人工对账，绝不能静默吞掉。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    #[error("insufficient gas in treasury wallet: {0}")]
    InsufficientGas(String),

    #[error("insufficient token balance in treasury wallet")]
    InsufficientTokenBalance,

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("confirmation timeout, signature: {signature}")]
    ConfirmationTimeout { signature: String },
}

impl ChainError {
    /// 已广播交易的签名（仅ConfirmationTimeout持有）
    pub fn broadcast_signature(&self) -> Option<&str> {
        match self {
            ChainError::ConfirmationTimeout { signature } => Some(signature),
            _ => None,
        }
    }

    /// 稳定的错误类别名，用于审计与通知
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::RpcUnavailable(_) => "RpcUnavailable",
            ChainError::InsufficientGas(_) => "InsufficientGas",
            ChainError::InsufficientTokenBalance => "InsufficientTokenBalance",
            ChainError::Reverted(_) => "Reverted",
            ChainError::ConfirmationTimeout { .. } => "ConfirmationTimeout",
        }
    }
}
