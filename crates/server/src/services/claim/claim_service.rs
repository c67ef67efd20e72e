use crate::services::{
    notifier::{NotificationEvent, NotificationKind, Notifier},
    trust::{self, TierPolicy},
};
use async_trait::async_trait;
use chrono::Utc;
use database::{
    audit_event::model::{AuditEvent, AuditKind},
    cap_window::model::{day_window_key, window},
    claim_record::model::{ClaimActionType, ClaimRecord},
    ClaimInsertOutcome, DynAuditEventRepository, DynCapWindowRepository, DynClaimRecordRepository,
    DynRewardAccountRepository,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use utils::{AppError, AppResult};

pub type DynClaimService = Arc<dyn ClaimServiceTrait + Send + Sync>;

/// Pending租约窗口：超过该时长仍未到终态的Pending视为宿主进程已崩溃
const PENDING_TAKEOVER_SECS: u64 = 60;
/// 撞上在途Pending时的等待重查节奏
const REPLAY_POLL_ATTEMPTS: u32 = 5;
const REPLAY_POLL_INTERVAL_MS: u64 = 100;

/// 一次奖励领取请求
#[derive(Debug, Clone)]
pub struct SubmitClaimCommand {
    pub user_id: String,
    pub action_type: ClaimActionType,
    /// 外部引用（上传ID、会话ID、里程碑阈值等），与user_id、action_type共同推导幂等键
    pub external_ref_id: String,
    pub amount: u64,
}

/// 领取结果；replayed=true表示命中幂等重放，返回的是首次的终态记录
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub record: ClaimRecord,
    pub replayed: bool,
}

#[async_trait]
pub trait ClaimServiceTrait {
    /// 端到端处理一次奖励领取：幂等裁决 -> 资格检查 -> 限额预留 -> 入账 -> 审计
    async fn submit_claim(&self, command: SubmitClaimCommand) -> AppResult<ClaimOutcome>;
}

#[derive(Clone)]
pub struct ClaimService {
    accounts: DynRewardAccountRepository,
    claims: DynClaimRecordRepository,
    caps: DynCapWindowRepository,
    audits: DynAuditEventRepository,
    notifier: Notifier,
}

impl ClaimService {
    pub fn new(
        accounts: DynRewardAccountRepository,
        claims: DynClaimRecordRepository,
        caps: DynCapWindowRepository,
        audits: DynAuditEventRepository,
        notifier: Notifier,
    ) -> Self {
        Self {
            accounts,
            claims,
            caps,
            audits,
            notifier,
        }
    }

    /// 以Rejected终态关闭claim并留下审计痕迹。
    /// 拒绝同样关闭幂等窗口：后续同claim_id的重试重放这次拒绝，不会重新尝试。
    async fn reject_claim(&self, record: &ClaimRecord, reason: &str) -> AppResult<ClaimOutcome> {
        let rejected = match self.claims.mark_rejected(&record.claim_id, reason).await? {
            Some(rejected) => rejected,
            // CAS失败说明并发方已先到达终态，重放既有结果
            None => {
                let existing = self.claims.find_by_claim_id(&record.claim_id).await?.ok_or_else(|| {
                    AppError::Conflict(format!("Claim {} vanished during rejection.", record.claim_id))
                })?;
                return Ok(ClaimOutcome {
                    record: existing,
                    replayed: true,
                });
            }
        };

        self.audits
            .append(
                AuditEvent::new(&rejected.user_id, AuditKind::ClaimRejected, &rejected.claim_id, 0).with_detail(reason),
            )
            .await?;
        self.notifier.emit(
            NotificationEvent::new(&rejected.user_id, NotificationKind::ClaimRejected, 0).with_detail(reason),
        );

        info!(
            "🔔 claim rejected: user={}, action={}, reason={}",
            rejected.user_id,
            rejected.action_type.as_str(),
            reason
        );

        Ok(ClaimOutcome {
            record: rejected,
            replayed: false,
        })
    }

    /// 撞上仍在处理中的同claim_id记录：短暂等待宿主落到终态并重放。
    /// 宿主迟迟不落地（进程死在insert_pending与终态CAS之间）时按租约CAS接管续跑，
    /// Pending不会成为永久卡死的状态。
    async fn resolve_in_flight_duplicate(&self, existing: ClaimRecord) -> AppResult<ClaimOutcome> {
        for _ in 0..REPLAY_POLL_ATTEMPTS {
            sleep(Duration::from_millis(REPLAY_POLL_INTERVAL_MS)).await;

            let current = self
                .claims
                .find_by_claim_id(&existing.claim_id)
                .await?
                .ok_or_else(|| AppError::Conflict(format!("Claim {} vanished while pending.", existing.claim_id)))?;
            if current.is_terminal() {
                return Ok(ClaimOutcome {
                    record: current,
                    replayed: true,
                });
            }
        }

        let stale_before = (Utc::now().timestamp() as u64).saturating_sub(PENDING_TAKEOVER_SECS);
        if let Some(reclaimed) = self.claims.reclaim_stale_pending(&existing.claim_id, stale_before).await? {
            warn!(
                "⚠️ 接管陈旧Pending claim: id={}, user={}",
                reclaimed.claim_id, reclaimed.user_id
            );
            return self.adjudicate(reclaimed).await;
        }

        // 宿主仍在租约内推进：尚无终态可重放，调用方稍后重试即命中重放
        Err(AppError::Conflict(format!(
            "Claim {} is still being processed.",
            existing.claim_id
        )))
    }

    /// 对一条Pending记录执行资格与限额裁决并推进到终态。
    /// 调用方必须已持有该记录的所有权（新插入成功或租约接管成功）。
    async fn adjudicate(&self, record: ClaimRecord) -> AppResult<ClaimOutcome> {
        let account = self.accounts.get_or_create_account(&record.user_id).await?;
        let now = Utc::now();
        let assessment = trust::evaluate(&trust::TrustSignals::from_account(&account, now.timestamp() as u64));

        let required = trust::min_tier_for_action(record.action_type);
        if assessment.tier < required {
            return self
                .reject_claim(
                    &record,
                    &format!(
                        "action {} requires tier {} (current: {})",
                        record.action_type.as_str(),
                        required.as_str(),
                        assessment.tier.as_str()
                    ),
                )
                .await;
        }

        // 赚取侧超限采取截断策略：granted可能小于请求金额
        let policy = TierPolicy::for_tier(assessment.tier);
        let earn_key = day_window_key(window::EARN_DAY, now);
        let granted = self
            .caps
            .reserve_up_to(&record.user_id, &earn_key, record.requested_amount, policy.daily_earn_ceiling)
            .await?;
        if granted == 0 {
            return self.reject_claim(&record, "daily earn cap exhausted").await;
        }

        // 签到去重放在额度预留之后：因限额被拒的签到不消耗当日唯一一次机会，
        // 重复签到被拒时归还刚预留的额度
        if record.action_type == ClaimActionType::DailyCheckin {
            let checkin_key = day_window_key(window::CHECKIN_DAY, now);
            if !self.caps.count_request(&record.user_id, &checkin_key, 1).await? {
                self.caps.release_cap(&record.user_id, &earn_key, granted).await?;
                return self.reject_claim(&record, "already checked in today").await;
            }
        }

        self.accounts.credit_claim(&record.user_id, granted).await?;

        let applied = self
            .claims
            .mark_applied(&record.claim_id, granted)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!(
                    "claim {} left pending state unexpectedly",
                    record.claim_id
                ))
            })?;

        // 审计与通知在账本提交之后（post-commit）
        self.audits
            .append(AuditEvent::new(
                &applied.user_id,
                AuditKind::ClaimApplied,
                &applied.claim_id,
                granted,
            ))
            .await?;
        self.notifier
            .emit(NotificationEvent::new(&applied.user_id, NotificationKind::ClaimApplied, granted));

        info!(
            "✅ claim applied: user={}, action={}, requested={}, applied={}",
            applied.user_id,
            applied.action_type.as_str(),
            applied.requested_amount,
            granted
        );

        Ok(ClaimOutcome {
            record: applied,
            replayed: false,
        })
    }
}

#[async_trait]
impl ClaimServiceTrait for ClaimService {
    async fn submit_claim(&self, command: SubmitClaimCommand) -> AppResult<ClaimOutcome> {
        if command.amount == 0 {
            return Err(AppError::BadRequest("claim amount must be positive".to_string()));
        }
        if command.external_ref_id.is_empty() {
            return Err(AppError::BadRequest("external_ref_id must not be empty".to_string()));
        }

        let record = ClaimRecord::new_pending(
            command.user_id.clone(),
            command.action_type,
            &command.external_ref_id,
            command.amount,
        );

        // 幂等裁决：唯一索引决定谁赢得这个claim_id
        match self.claims.insert_pending(&record).await? {
            ClaimInsertOutcome::Inserted => self.adjudicate(record).await,
            ClaimInsertOutcome::Duplicate(existing) => {
                if existing.is_terminal() {
                    return Ok(ClaimOutcome {
                        record: existing,
                        replayed: true,
                    });
                }
                self.resolve_in_flight_duplicate(existing).await
            }
        }
    }
}
