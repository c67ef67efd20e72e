use crate::services::{
    notifier::{NotificationEvent, NotificationKind, Notifier},
    trust::{self, TierPolicy, MAX_WITHDRAWAL_ATTEMPTS_PER_HOUR},
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use database::{
    audit_event::model::{AuditEvent, AuditKind},
    cap_window::model::{day_window_key, hour_window_key, window},
    withdrawal::model::{WithdrawalRequest, WithdrawalStatus},
    CapReserveOutcome, DynAuditEventRepository, DynCapWindowRepository, DynRewardAccountRepository,
    DynWithdrawalRepository,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use treasury::{ChainClientTrait, ChainError, DynChainClient, TxReceipt};
use utils::{AppError, AppResult};

pub type DynSettlementService = Arc<dyn SettlementServiceTrait + Send + Sync>;

/// 结算结果；replayed=true表示该提现已处于终态，返回的是既有结果
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub request: WithdrawalRequest,
    pub replayed: bool,
}

#[async_trait]
pub trait SettlementServiceTrait {
    /// 发起提现请求（校验资格、冷却、频次与每日限额，不动账本余额）
    async fn request_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<WithdrawalRequest>;

    /// 管理审批通过（外部信任边界，调用方已鉴权）；重复审批幂等重放
    async fn approve_withdrawal(&self, withdrawal_id: &str, admin_id: &str, note: Option<&str>)
        -> AppResult<WithdrawalRequest>;

    /// 管理审批拒绝；无账本效果
    async fn reject_withdrawal(&self, withdrawal_id: &str, admin_id: &str, note: Option<&str>)
        -> AppResult<WithdrawalRequest>;

    /// 执行一笔已审批的提现：预留 -> 链上转账 -> 完成/补偿退款。
    /// 链上失败不作为Err返回——补偿完成后返回Failed终态，留给管理员决定是否重试。
    async fn process_approved_withdrawal(&self, withdrawal_id: &str) -> AppResult<SettlementOutcome>;
}

/// 提现金额限额的window key按请求创建时刻推导：
/// 跨UTC日之后才终结的请求归还到当初消耗的那个窗口（旧窗口不再被预留读到）
fn amount_cap_key(request: &WithdrawalRequest) -> String {
    let at = Utc
        .timestamp_opt(request.created_at as i64, 0)
        .single()
        .unwrap_or_else(Utc::now);
    day_window_key(window::WITHDRAW_AMOUNT_DAY, at)
}

/// 签名密钥未配置/不可用时的占位实现：结算停摆，账本与Claim处理不受影响
pub struct DisabledChainClient;

#[async_trait]
impl ChainClientTrait for DisabledChainClient {
    async fn transfer(&self, _to_address: &str, _amount: u64) -> Result<TxReceipt, ChainError> {
        Err(ChainError::RpcUnavailable(
            "settlement disabled: treasury signing key not configured".to_string(),
        ))
    }

    async fn balance_of(&self, _owner_address: &str) -> Result<u64, ChainError> {
        Err(ChainError::RpcUnavailable(
            "settlement disabled: treasury signing key not configured".to_string(),
        ))
    }
}

pub struct SettlementService {
    accounts: DynRewardAccountRepository,
    withdrawals: DynWithdrawalRepository,
    caps: DynCapWindowRepository,
    audits: DynAuditEventRepository,
    chain: DynChainClient,
    /// 国库签名密钥的single-writer闸门：同一时刻只允许一笔提现在链上在途，
    /// 避免同一国库钱包的nonce冲突。只收窄链上调用，不覆盖任何存储操作。
    chain_gate: Mutex<()>,
    notifier: Notifier,
}

impl SettlementService {
    pub fn new(
        accounts: DynRewardAccountRepository,
        withdrawals: DynWithdrawalRepository,
        caps: DynCapWindowRepository,
        audits: DynAuditEventRepository,
        chain: DynChainClient,
        notifier: Notifier,
    ) -> Self {
        Self {
            accounts,
            withdrawals,
            caps,
            audits,
            chain,
            chain_gate: Mutex::new(()),
            notifier,
        }
    }

    /// 链上转账成功后的提交路径：账本先行，状态机随后
    async fn settle_success(&self, request: &WithdrawalRequest, receipt: &TxReceipt) -> AppResult<WithdrawalRequest> {
        self.accounts
            .finalize_withdrawal(&request.user_id, request.amount)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!(
                    "account {} vanished during finalization",
                    request.user_id
                ))
            })?;

        let completed = self
            .withdrawals
            .complete(&request.withdrawal_id, &receipt.signature)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!(
                    "withdrawal {} left Processing state unexpectedly",
                    request.withdrawal_id
                ))
            })?;

        self.audits
            .append(
                AuditEvent::new(
                    &completed.user_id,
                    AuditKind::WithdrawalCompleted,
                    &completed.withdrawal_id,
                    completed.amount,
                )
                .with_tx_hash(completed.tx_hash.clone()),
            )
            .await?;
        self.notifier.emit(
            NotificationEvent::new(&completed.user_id, NotificationKind::WithdrawalCompleted, completed.amount)
                .with_tx_hash(completed.tx_hash.clone()),
        );

        info!(
            "✅ withdrawal completed: id={}, user={}, amount={}, tx={}",
            completed.withdrawal_id, completed.user_id, completed.amount, receipt.signature
        );

        Ok(completed)
    }

    /// 链上转账失败后的补偿路径：先退款，后置Failed。
    /// 顺序不可颠倒——Failed是调用方可重试的信号，退款必须先于该信号可见。
    async fn settle_failure(&self, request: &WithdrawalRequest, err: ChainError) -> AppResult<WithdrawalRequest> {
        self.accounts
            .refund_withdrawal(&request.user_id, request.amount)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!(
                    "account {} vanished during refund",
                    request.user_id
                ))
            })?;

        // 确认超时的交易可能事后上链：签名必须记录，并标记待对账
        let needs_reconciliation = matches!(err, ChainError::ConfirmationTimeout { .. });
        let reason = format!("{}: {}", err.kind(), err);
        let failed = self
            .withdrawals
            .fail(
                &request.withdrawal_id,
                &reason,
                err.broadcast_signature(),
                needs_reconciliation,
            )
            .await?
            .ok_or_else(|| {
                AppError::InternalServerErrorWithContext(format!(
                    "withdrawal {} left Processing state unexpectedly",
                    request.withdrawal_id
                ))
            })?;

        // 未成行的提现不占当日额度
        self.caps
            .release_cap(&failed.user_id, &amount_cap_key(&failed), failed.amount)
            .await?;

        self.audits
            .append(
                AuditEvent::new(
                    &failed.user_id,
                    AuditKind::WithdrawalFailed,
                    &failed.withdrawal_id,
                    failed.amount,
                )
                .with_tx_hash(failed.tx_hash.clone())
                .with_detail(reason.clone()),
            )
            .await?;
        self.notifier.emit(
            NotificationEvent::new(&failed.user_id, NotificationKind::WithdrawalFailed, failed.amount)
                .with_tx_hash(failed.tx_hash.clone())
                .with_detail(err.kind()),
        );

        warn!(
            "🔴 withdrawal failed (refunded): id={}, user={}, amount={}, reason={}, needs_reconciliation={}",
            failed.withdrawal_id, failed.user_id, failed.amount, reason, needs_reconciliation
        );

        Ok(failed)
    }
}

#[async_trait]
impl SettlementServiceTrait for SettlementService {
    async fn request_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<WithdrawalRequest> {
        if amount == 0 {
            return Err(AppError::BadRequest("withdrawal amount must be positive".to_string()));
        }

        let account = self
            .accounts
            .find_account(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account of user {} not found.", user_id)))?;

        let wallet_address = account
            .wallet_address
            .clone()
            .ok_or_else(|| AppError::Eligibility("no wallet address linked".to_string()))?;

        let now = Utc::now();
        let assessment = trust::evaluate(&trust::TrustSignals::from_account(&account, now.timestamp() as u64));
        if !assessment.can_withdraw {
            return Err(AppError::Eligibility(format!(
                "trust score {} below withdrawal threshold",
                assessment.score
            )));
        }

        let policy = TierPolicy::for_tier(assessment.tier);
        if let Some(last) = account.last_withdrawal_at {
            let ready_at = last + policy.withdrawal_cooldown_secs;
            if (now.timestamp() as u64) < ready_at {
                return Err(AppError::Eligibility(format!(
                    "withdrawal cooldown active until {}",
                    ready_at
                )));
            }
        }

        // 频次窗口：每小时最多3次发起，与等级无关
        let count_key = hour_window_key(window::WITHDRAW_COUNT_HOUR, now);
        if !self
            .caps
            .count_request(user_id, &count_key, MAX_WITHDRAWAL_ATTEMPTS_PER_HOUR)
            .await?
        {
            return Err(AppError::Eligibility(
                "too many withdrawal attempts this hour".to_string(),
            ));
        }

        // 提现侧超限整笔拒绝，不截断
        let amount_key = day_window_key(window::WITHDRAW_AMOUNT_DAY, now);
        if let CapReserveOutcome::Exceeded { remaining } = self
            .caps
            .reserve_cap(user_id, &amount_key, amount, policy.daily_withdraw_ceiling)
            .await?
        {
            return Err(AppError::Eligibility(format!(
                "daily withdrawal cap exceeded ({} remaining)",
                remaining
            )));
        }

        // 预检余额；真正的预留发生在Approved -> Processing
        if account.pending_amount < amount {
            return Err(AppError::Eligibility(format!(
                "insufficient pending balance ({} < {})",
                account.pending_amount, amount
            )));
        }

        let request = WithdrawalRequest::new(user_id.to_string(), wallet_address, amount);
        self.withdrawals.insert_request(&request).await?;

        self.audits
            .append(AuditEvent::new(
                user_id,
                AuditKind::WithdrawalRequested,
                &request.withdrawal_id,
                amount,
            ))
            .await?;

        info!(
            "📡 withdrawal requested: id={}, user={}, amount={}",
            request.withdrawal_id, user_id, amount
        );

        Ok(request)
    }

    async fn approve_withdrawal(
        &self,
        withdrawal_id: &str,
        admin_id: &str,
        note: Option<&str>,
    ) -> AppResult<WithdrawalRequest> {
        // admin_notes里保留审批人，审计可追溯到具体管理员
        let entry = match note {
            Some(note) => format!("{}: {}", admin_id, note),
            None => format!("approved by {}", admin_id),
        };
        if let Some(approved) = self
            .withdrawals
            .transition(
                withdrawal_id,
                WithdrawalStatus::PendingApproval,
                WithdrawalStatus::Approved,
                Some(&entry),
            )
            .await?
        {
            self.audits
                .append(
                    AuditEvent::new(
                        &approved.user_id,
                        AuditKind::WithdrawalApproved,
                        withdrawal_id,
                        approved.amount,
                    )
                    .with_detail(entry),
                )
                .await?;

            return Ok(approved);
        }

        let current = self
            .withdrawals
            .find_by_id(withdrawal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found.", withdrawal_id)))?;

        // 重复审批是幂等重放；其余状态下的审批是非法操作
        if current.status == WithdrawalStatus::Approved {
            return Ok(current);
        }
        Err(AppError::Conflict(format!(
            "withdrawal {} is {} and cannot be approved",
            withdrawal_id,
            current.status.as_str()
        )))
    }

    async fn reject_withdrawal(
        &self,
        withdrawal_id: &str,
        admin_id: &str,
        note: Option<&str>,
    ) -> AppResult<WithdrawalRequest> {
        let entry = match note {
            Some(note) => format!("{}: {}", admin_id, note),
            None => format!("rejected by {}", admin_id),
        };
        if let Some(rejected) = self
            .withdrawals
            .transition(
                withdrawal_id,
                WithdrawalStatus::PendingApproval,
                WithdrawalStatus::Rejected,
                Some(&entry),
            )
            .await?
        {
            // 被拒的请求归还当日提现额度
            self.caps
                .release_cap(&rejected.user_id, &amount_cap_key(&rejected), rejected.amount)
                .await?;

            self.audits
                .append(
                    AuditEvent::new(
                        &rejected.user_id,
                        AuditKind::WithdrawalRejected,
                        withdrawal_id,
                        rejected.amount,
                    )
                    .with_detail(entry),
                )
                .await?;
            self.notifier.emit(NotificationEvent::new(
                &rejected.user_id,
                NotificationKind::WithdrawalRejected,
                rejected.amount,
            ));

            return Ok(rejected);
        }

        let current = self
            .withdrawals
            .find_by_id(withdrawal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found.", withdrawal_id)))?;

        if current.status == WithdrawalStatus::Rejected {
            return Ok(current);
        }
        Err(AppError::Conflict(format!(
            "withdrawal {} is {} and cannot be rejected",
            withdrawal_id,
            current.status.as_str()
        )))
    }

    async fn process_approved_withdrawal(&self, withdrawal_id: &str) -> AppResult<SettlementOutcome> {
        // CAS Approved -> Processing 在任何副作用之前裁决所有权：
        // 并发的两次process里只有一个能赢，输家按当前状态重放或报冲突
        let claimed = self
            .withdrawals
            .transition(withdrawal_id, WithdrawalStatus::Approved, WithdrawalStatus::Processing, None)
            .await?;

        let request = match claimed {
            Some(request) => request,
            None => {
                let current = self
                    .withdrawals
                    .find_by_id(withdrawal_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found.", withdrawal_id)))?;

                if current.is_terminal() {
                    return Ok(SettlementOutcome {
                        request: current,
                        replayed: true,
                    });
                }
                if current.status == WithdrawalStatus::Processing {
                    return Err(AppError::Conflict(format!(
                        "withdrawal {} is already being processed",
                        withdrawal_id
                    )));
                }
                return Err(AppError::Eligibility(format!(
                    "withdrawal {} has not been approved",
                    withdrawal_id
                )));
            }
        };

        // 资金预留：失败时未产生任何账本变更，无需退款，且绝不触达链
        if self
            .accounts
            .reserve_for_withdrawal(&request.user_id, request.amount)
            .await?
            .is_none()
        {
            let reason = "InsufficientBalance: pending balance below requested amount";
            let failed = self
                .withdrawals
                .fail(&request.withdrawal_id, reason, None, false)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerErrorWithContext(format!(
                        "withdrawal {} left Processing state unexpectedly",
                        request.withdrawal_id
                    ))
                })?;

            self.caps
                .release_cap(&failed.user_id, &amount_cap_key(&failed), failed.amount)
                .await?;

            self.audits
                .append(
                    AuditEvent::new(
                        &failed.user_id,
                        AuditKind::WithdrawalFailed,
                        &failed.withdrawal_id,
                        failed.amount,
                    )
                    .with_detail(reason),
                )
                .await?;
            self.notifier.emit(
                NotificationEvent::new(&failed.user_id, NotificationKind::WithdrawalFailed, failed.amount)
                    .with_detail("InsufficientBalance"),
            );

            warn!(
                "🔴 withdrawal failed before chain: id={}, user={}, reason={}",
                failed.withdrawal_id, failed.user_id, reason
            );

            return Ok(SettlementOutcome {
                request: failed,
                replayed: false,
            });
        }

        // 闸门只包住链上调用本身，存储操作保持完全并发
        let transfer_result = {
            let _guard = self.chain_gate.lock().await;
            self.chain.transfer(&request.wallet_address, request.amount).await
        };

        let settled = match transfer_result {
            Ok(receipt) => self.settle_success(&request, &receipt).await?,
            Err(err) => self.settle_failure(&request, err).await?,
        };

        Ok(SettlementOutcome {
            request: settled,
            replayed: false,
        })
    }
}
