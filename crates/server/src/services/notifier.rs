use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// 通知事件类型（仅终态迁移会触发通知）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClaimApplied,
    ClaimRejected,
    WithdrawalCompleted,
    WithdrawalFailed,
    WithdrawalRejected,
}

/// 终态通知事件
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub kind: NotificationKind,
    pub amount: u64,
    pub tx_hash: Option<String>,
    pub detail: Option<String>,
}

impl NotificationEvent {
    pub fn new(user_id: &str, kind: NotificationKind, amount: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            amount,
            tx_hash: None,
            detail: None,
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

/// 通知出口
///
/// 投递与格式化不属于本引擎，这里只把事件丢进无界通道后立即返回。
/// emit永远不会失败——通知丢失绝不能反过来影响已提交的资金迁移。
#[derive(Clone)]
pub struct Notifier {
    tx: UnboundedSender<NotificationEvent>,
}

impl Notifier {
    /// 启动后台消费任务（生产路径：消费并记录日志，交给外部系统订阅）
    pub fn spawn() -> Self {
        let (notifier, mut rx) = Self::channel();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(payload) => info!("🔔 notify: {}", payload),
                    Err(e) => warn!("🔔 notify serialization failed: {}", e),
                }
            }
        });

        notifier
    }

    /// 裸通道构造（测试用：接收端由测试代码持有并断言）
    pub fn channel() -> (Self, UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 发出一个终态通知；通道已关闭时仅记录告警
    pub fn emit(&self, event: NotificationEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("🔔 notification dropped: {}", e);
        }
    }
}
