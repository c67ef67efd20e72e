// Timer: 每日定时执行
// - 扫描已广播但确认超时的Failed提现（链与账本唯一可能瞬时不一致的地方），
//   标记待人工对账并写入审计，绝不静默
use chrono::Utc;
use cron::Schedule;
use database::{
    audit_event::model::{AuditEvent, AuditKind},
    AuditEventRepositoryTrait, WithdrawalRepositoryTrait,
};
use server::services::Services;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::{task, time::sleep_until};
use tracing::{info, warn};

#[derive(Clone)]
pub struct Timer {
    pub time: String,
    pub services: Services,
}

impl Timer {
    // "59 59 23 * * *": 每天23:59:59执行
    pub fn new(time: Option<String>, services: Services) -> Self {
        match time {
            Some(time) => Timer { time, services },
            None => Timer {
                time: "59 59 23 * * *".to_string(),
                services,
            },
        }
    }

    pub async fn run(self: Arc<Self>) {
        info!("⏳ Timer action at {} everyday.", self.time);

        let schedule = Schedule::from_str(&self.time).unwrap(); // UTC

        loop {
            let now = Utc::now();
            let next_run_time = schedule.upcoming(Utc).next().unwrap();

            let duration_until_next_run = (next_run_time - now).to_std().unwrap_or(Duration::from_secs(0));

            sleep_until(tokio::time::Instant::now() + duration_until_next_run).await;

            task::spawn({
                let this = Arc::clone(&self);
                async move {
                    this.flag_pending_reconciliations().await;
                }
            })
            .await
            .unwrap();
        }
    }

    /// 对账扫描：把待对账的Failed提现逐条标记并告警。
    /// 标记后不再重复提醒（reconciliation_flagged），直到人工处理完毕。
    pub async fn flag_pending_reconciliations(&self) {
        let db = self.services.database.as_ref();

        let requests = match db.list_needing_reconciliation().await {
            Ok(requests) => requests,
            Err(e) => {
                warn!("🔴 reconciliation sweep failed: {}", e);
                return;
            }
        };

        if requests.is_empty() {
            info!("✅ reconciliation sweep: nothing to flag");
            return;
        }

        for request in requests {
            warn!(
                "⏱️ 待对账提现: id={}, user={}, amount={}, tx={:?}",
                request.withdrawal_id, request.user_id, request.amount, request.tx_hash
            );

            if let Err(e) = db.mark_reconciliation_flagged(&request.withdrawal_id).await {
                warn!("🔴 failed to flag withdrawal {}: {}", request.withdrawal_id, e);
                continue;
            }

            let event = AuditEvent::new(
                &request.user_id,
                AuditKind::ReconciliationFlagged,
                &request.withdrawal_id,
                request.amount,
            )
            .with_tx_hash(request.tx_hash.clone())
            .with_detail(request.failure_reason.clone().unwrap_or_default());

            if let Err(e) = db.append(event).await {
                warn!("🔴 failed to audit reconciliation flag: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cron_expression_parses() {
        let schedule = Schedule::from_str("59 59 23 * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }
}
