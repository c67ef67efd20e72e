//! 服务层测试的内存实现：用与Mongo条件更新等价的语义模拟各仓库，
//! 让编排逻辑（幂等、限额、状态机、补偿）可以在无数据库环境下验证。

use async_trait::async_trait;
use chrono::Utc;
use database::{
    audit_event::model::AuditEvent,
    cap_window::model::CapWindow,
    claim_record::model::{ClaimRecord, ClaimStatus},
    reward_account::model::RewardAccount,
    withdrawal::model::{WithdrawalRequest, WithdrawalStatus},
    AuditEventRepositoryTrait, CapReserveOutcome, CapWindowRepositoryTrait, ClaimInsertOutcome,
    ClaimRecordRepositoryTrait, RewardAccountRepositoryTrait, WithdrawalRepositoryTrait,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};
use treasury::{ChainClientTrait, ChainError, TxReceipt};
use utils::{AppError, AppResult};

#[derive(Default)]
pub struct MemoryRepo {
    accounts: Mutex<HashMap<String, RewardAccount>>,
    claims: Mutex<HashMap<String, ClaimRecord>>,
    withdrawals: Mutex<HashMap<String, WithdrawalRequest>>,
    windows: Mutex<HashMap<(String, String), CapWindow>>,
    audits: Mutex<Vec<AuditEvent>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, account: RewardAccount) {
        self.accounts.lock().unwrap().insert(account.user_id.clone(), account);
    }

    pub fn account(&self, user_id: &str) -> RewardAccount {
        self.accounts.lock().unwrap().get(user_id).cloned().expect("account seeded")
    }

    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.audits.lock().unwrap().clone()
    }

    fn new_window(user_id: &str, window_key: &str) -> CapWindow {
        let now = Utc::now().timestamp() as u64;
        CapWindow {
            user_id: user_id.to_string(),
            window_key: window_key.to_string(),
            consumed_amount: 0,
            request_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl RewardAccountRepositoryTrait for MemoryRepo {
    async fn find_account(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        Ok(self.accounts.lock().unwrap().get(user_id).cloned())
    }

    async fn get_or_create_account(&self, user_id: &str) -> AppResult<RewardAccount> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(user_id.to_string())
            .or_insert_with(|| RewardAccount::new(user_id.to_string()));
        Ok(account.clone())
    }

    async fn link_wallet(&self, user_id: &str, wallet_address: &str) -> AppResult<RewardAccount> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(user_id.to_string())
            .or_insert_with(|| RewardAccount::new(user_id.to_string()));
        account.wallet_address = Some(wallet_address.to_string());
        Ok(account.clone())
    }

    async fn credit_claim(&self, user_id: &str, amount: u64) -> AppResult<RewardAccount> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(user_id.to_string())
            .or_insert_with(|| RewardAccount::new(user_id.to_string()));
        account.pending_amount += amount;
        account.total_earned += amount;
        Ok(account.clone())
    }

    async fn reserve_for_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(account) if account.pending_amount >= amount => {
                account.pending_amount -= amount;
                Ok(Some(account.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn finalize_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(account) => {
                account.claimed_amount += amount;
                account.successful_withdrawals += 1;
                account.last_withdrawal_at = Some(Utc::now().timestamp() as u64);
                Ok(Some(account.clone()))
            }
            None => Ok(None),
        }
    }

    async fn refund_withdrawal(&self, user_id: &str, amount: u64) -> AppResult<Option<RewardAccount>> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(account) => {
                account.pending_amount += amount;
                Ok(Some(account.clone()))
            }
            None => Ok(None),
        }
    }

    async fn record_approved_upload(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(account) => {
                account.approved_uploads += 1;
                Ok(Some(account.clone()))
            }
            None => Ok(None),
        }
    }

    async fn flag_anomaly(&self, user_id: &str) -> AppResult<Option<RewardAccount>> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(account) => {
                account.anomaly_flags += 1;
                Ok(Some(account.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ClaimRecordRepositoryTrait for MemoryRepo {
    async fn insert_pending(&self, record: &ClaimRecord) -> AppResult<ClaimInsertOutcome> {
        let mut claims = self.claims.lock().unwrap();
        if let Some(existing) = claims.get(&record.claim_id) {
            return Ok(ClaimInsertOutcome::Duplicate(existing.clone()));
        }
        claims.insert(record.claim_id.clone(), record.clone());
        Ok(ClaimInsertOutcome::Inserted)
    }

    async fn find_by_claim_id(&self, claim_id: &str) -> AppResult<Option<ClaimRecord>> {
        Ok(self.claims.lock().unwrap().get(claim_id).cloned())
    }

    async fn mark_applied(&self, claim_id: &str, applied_amount: u64) -> AppResult<Option<ClaimRecord>> {
        let mut claims = self.claims.lock().unwrap();
        match claims.get_mut(claim_id) {
            Some(record) if record.status == ClaimStatus::Pending => {
                record.status = ClaimStatus::Applied;
                record.applied_amount = applied_amount;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_rejected(&self, claim_id: &str, reason: &str) -> AppResult<Option<ClaimRecord>> {
        let mut claims = self.claims.lock().unwrap();
        match claims.get_mut(claim_id) {
            Some(record) if record.status == ClaimStatus::Pending => {
                record.status = ClaimStatus::Rejected;
                record.reject_reason = Some(reason.to_string());
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reclaim_stale_pending(&self, claim_id: &str, stale_before: u64) -> AppResult<Option<ClaimRecord>> {
        let mut claims = self.claims.lock().unwrap();
        match claims.get_mut(claim_id) {
            Some(record) if record.status == ClaimStatus::Pending && record.updated_at < stale_before => {
                record.updated_at = Utc::now().timestamp() as u64;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl WithdrawalRepositoryTrait for MemoryRepo {
    async fn insert_request(&self, request: &WithdrawalRequest) -> AppResult<()> {
        self.withdrawals
            .lock()
            .unwrap()
            .insert(request.withdrawal_id.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>> {
        Ok(self.withdrawals.lock().unwrap().get(withdrawal_id).cloned())
    }

    async fn transition(
        &self,
        withdrawal_id: &str,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        note: Option<&str>,
    ) -> AppResult<Option<WithdrawalRequest>> {
        if !from.can_transition_to(to) {
            return Err(AppError::BadRequest(format!(
                "illegal withdrawal transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let mut withdrawals = self.withdrawals.lock().unwrap();
        match withdrawals.get_mut(withdrawal_id) {
            Some(request) if request.status == from => {
                request.status = to;
                if let Some(note) = note {
                    request.admin_notes.push(note.to_string());
                }
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete(&self, withdrawal_id: &str, tx_hash: &str) -> AppResult<Option<WithdrawalRequest>> {
        let mut withdrawals = self.withdrawals.lock().unwrap();
        match withdrawals.get_mut(withdrawal_id) {
            Some(request) if request.status == WithdrawalStatus::Processing => {
                request.status = WithdrawalStatus::Completed;
                request.tx_hash = Some(tx_hash.to_string());
                request.completed_at = Some(Utc::now().timestamp() as u64);
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fail(
        &self,
        withdrawal_id: &str,
        reason: &str,
        tx_hash: Option<&str>,
        needs_reconciliation: bool,
    ) -> AppResult<Option<WithdrawalRequest>> {
        let mut withdrawals = self.withdrawals.lock().unwrap();
        match withdrawals.get_mut(withdrawal_id) {
            Some(request) if request.status == WithdrawalStatus::Processing => {
                request.status = WithdrawalStatus::Failed;
                request.failure_reason = Some(reason.to_string());
                if let Some(tx_hash) = tx_hash {
                    request.tx_hash = Some(tx_hash.to_string());
                }
                request.needs_reconciliation = needs_reconciliation;
                request.completed_at = Some(Utc::now().timestamp() as u64);
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_needing_reconciliation(&self) -> AppResult<Vec<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.lock().unwrap();
        Ok(withdrawals
            .values()
            .filter(|r| r.status == WithdrawalStatus::Failed && r.needs_reconciliation && !r.reconciliation_flagged)
            .cloned()
            .collect())
    }

    async fn mark_reconciliation_flagged(&self, withdrawal_id: &str) -> AppResult<Option<WithdrawalRequest>> {
        let mut withdrawals = self.withdrawals.lock().unwrap();
        match withdrawals.get_mut(withdrawal_id) {
            Some(request) if request.needs_reconciliation => {
                request.reconciliation_flagged = true;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CapWindowRepositoryTrait for MemoryRepo {
    async fn reserve_cap(
        &self,
        user_id: &str,
        window_key: &str,
        amount: u64,
        ceiling: u64,
    ) -> AppResult<CapReserveOutcome> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry((user_id.to_string(), window_key.to_string()))
            .or_insert_with(|| Self::new_window(user_id, window_key));

        if window.consumed_amount + amount <= ceiling {
            window.consumed_amount += amount;
            Ok(CapReserveOutcome::Reserved {
                remaining: ceiling - window.consumed_amount,
            })
        } else {
            Ok(CapReserveOutcome::Exceeded {
                remaining: ceiling.saturating_sub(window.consumed_amount),
            })
        }
    }

    async fn reserve_up_to(&self, user_id: &str, window_key: &str, requested: u64, ceiling: u64) -> AppResult<u64> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry((user_id.to_string(), window_key.to_string()))
            .or_insert_with(|| Self::new_window(user_id, window_key));

        let grant = requested.min(ceiling.saturating_sub(window.consumed_amount));
        window.consumed_amount += grant;
        Ok(grant)
    }

    async fn count_request(&self, user_id: &str, window_key: &str, max_requests: u32) -> AppResult<bool> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry((user_id.to_string(), window_key.to_string()))
            .or_insert_with(|| Self::new_window(user_id, window_key));

        if window.request_count < max_requests {
            window.request_count += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_cap(&self, user_id: &str, window_key: &str, amount: u64) -> AppResult<()> {
        let mut windows = self.windows.lock().unwrap();
        if let Some(window) = windows.get_mut(&(user_id.to_string(), window_key.to_string())) {
            if window.consumed_amount >= amount {
                window.consumed_amount -= amount;
            }
        }
        Ok(())
    }

    async fn find_window(&self, user_id: &str, window_key: &str) -> AppResult<Option<CapWindow>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), window_key.to_string()))
            .cloned())
    }
}

#[async_trait]
impl AuditEventRepositoryTrait for MemoryRepo {
    async fn append(&self, event: AuditEvent) -> AppResult<()> {
        self.audits.lock().unwrap().push(event);
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<AuditEvent>> {
        let audits = self.audits.lock().unwrap();
        Ok(audits
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// 脚本化的链客户端：按FIFO回放预置结果，默认返回确认成功
pub struct MockChainClient {
    responses: Mutex<VecDeque<Result<TxReceipt, ChainError>>>,
    calls: AtomicU32,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn push(&self, response: Result<TxReceipt, ChainError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClientTrait for MockChainClient {
    async fn transfer(&self, _to_address: &str, amount: u64) -> Result<TxReceipt, ChainError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(TxReceipt {
                signature: format!("MockSig{}x{}", call, amount),
                slot: 42,
            }),
        }
    }

    async fn balance_of(&self, _owner_address: &str) -> Result<u64, ChainError> {
        Ok(0)
    }
}
