use super::*;
use crate::services::{notifier::Notifier, test_support::MemoryRepo};
use chrono::Utc;
use database::{
    cap_window::model::{day_window_key, window},
    claim_record::model::{ClaimActionType, ClaimRecord, ClaimStatus},
    reward_account::model::RewardAccount,
    CapWindowRepositoryTrait, ClaimRecordRepositoryTrait, RewardAccountRepositoryTrait,
};
use std::sync::Arc;

const WALLET: &str = "So11111111111111111111111111111111111111112";

fn service(repo: &Arc<MemoryRepo>) -> ClaimService {
    let (notifier, _rx) = Notifier::channel();
    ClaimService::new(repo.clone(), repo.clone(), repo.clone(), repo.clone(), notifier)
}

/// 账龄20天+已绑定钱包 = 40分Gold（每日入账上限20_000）
fn gold_account(user_id: &str) -> RewardAccount {
    let now = Utc::now().timestamp() as u64;
    let mut account = RewardAccount::new(user_id.to_string());
    account.account_created_at = now - 20 * 86_400;
    account.wallet_address = Some(WALLET.to_string());
    account
}

fn claim(user_id: &str, action: ClaimActionType, ref_id: &str, amount: u64) -> SubmitClaimCommand {
    SubmitClaimCommand {
        user_id: user_id.to_string(),
        action_type: action,
        external_ref_id: ref_id.to_string(),
        amount,
    }
}

#[tokio::test]
async fn test_claim_applies_and_credits_ledger() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 500))
        .await
        .unwrap();

    assert!(!outcome.replayed);
    assert_eq!(outcome.record.status, ClaimStatus::Applied);
    assert_eq!(outcome.record.applied_amount, 500);

    let account = repo.account("u1");
    assert_eq!(account.pending_amount, 500);
    assert_eq!(account.total_earned, 500);
    assert_eq!(repo.audit_log().len(), 1);
}

#[tokio::test]
async fn test_duplicate_claim_replays_original() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let command = claim("u1", ClaimActionType::Welcome, "signup-u1", 500);

    let first = svc.submit_claim(command.clone()).await.unwrap();
    let second = svc.submit_claim(command).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.record.claim_id, first.record.claim_id);
    assert_eq!(second.record.applied_amount, 500);
    // 重放不产生第二次入账
    assert_eq!(repo.account("u1").total_earned, 500);
}

#[tokio::test]
async fn test_concurrent_duplicate_claims_credit_once() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let command = claim("u1", ClaimActionType::FirstPlay, "game-42", 300);

    let (a, b) = tokio::join!(svc.submit_claim(command.clone()), svc.submit_claim(command));

    // 两个并发调用都拿到同一个终态：赢家入账一次，输家等到终态后重放
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.record.status, ClaimStatus::Applied);
    assert_eq!(b.record.status, ClaimStatus::Applied);
    assert_eq!(a.record.claim_id, b.record.claim_id);
    assert_eq!([a.replayed, b.replayed].iter().filter(|r| **r).count(), 1);
    assert_eq!(repo.account("u1").total_earned, 300);
}

#[tokio::test]
async fn test_stale_pending_claim_recovers_on_retry() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let command = claim("u1", ClaimActionType::Welcome, "signup-u1", 500);

    // 宿主进程死在insert_pending与终态CAS之间：留下一条租约早已过期的Pending
    let mut stranded = ClaimRecord::new_pending("u1".to_string(), ClaimActionType::Welcome, "signup-u1", 500);
    stranded.updated_at = Utc::now().timestamp() as u64 - 300;
    repo.insert_pending(&stranded).await.unwrap();

    let retry = svc.submit_claim(command.clone()).await.unwrap();

    // 重试接管续跑而不是永久409
    assert!(!retry.replayed);
    assert_eq!(retry.record.status, ClaimStatus::Applied);
    assert_eq!(retry.record.applied_amount, 500);
    assert_eq!(repo.account("u1").total_earned, 500);

    // 接管后的终态照常关闭幂等窗口
    let again = svc.submit_claim(command).await.unwrap();
    assert!(again.replayed);
    assert_eq!(repo.account("u1").total_earned, 500);
}

#[tokio::test]
async fn test_fresh_pending_claim_is_not_taken_over() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    // 租约还新鲜的Pending说明宿主仍在推进，等待后仍未落地则拒绝接管
    let stranded = ClaimRecord::new_pending("u1".to_string(), ClaimActionType::Welcome, "signup-u1", 500);
    repo.insert_pending(&stranded).await.unwrap();

    let result = svc.submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 500)).await;

    assert!(matches!(result, Err(utils::AppError::Conflict(_))));
    // 账本未被动过
    assert!(repo.find_account("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_earn_cap_clamps_amount() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    // 新账户是Restricted，每日入账上限1_000：请求1_500只入账1_000
    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 1_500))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, ClaimStatus::Applied);
    assert_eq!(outcome.record.requested_amount, 1_500);
    assert_eq!(outcome.record.applied_amount, 1_000);
    assert_eq!(repo.account("u1").pending_amount, 1_000);
}

#[tokio::test]
async fn test_exhausted_earn_cap_rejects() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    svc.submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 1_000))
        .await
        .unwrap();

    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::FirstPlay, "game-1", 200))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, ClaimStatus::Rejected);
    assert!(outcome.record.reject_reason.as_deref().unwrap().contains("cap"));
    assert_eq!(repo.account("u1").pending_amount, 1_000);
}

#[tokio::test]
async fn test_daily_checkin_once_per_day() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    // 同一UTC日内两次签到携带不同的external_ref_id，第二次仍被拒绝
    let first = svc
        .submit_claim(claim("u1", ClaimActionType::DailyCheckin, "session-1", 50))
        .await
        .unwrap();
    let second = svc
        .submit_claim(claim("u1", ClaimActionType::DailyCheckin, "session-2", 50))
        .await
        .unwrap();

    assert_eq!(first.record.status, ClaimStatus::Applied);
    assert_eq!(second.record.status, ClaimStatus::Rejected);
    assert!(second.record.reject_reason.as_deref().unwrap().contains("checked in"));
    assert_eq!(repo.account("u1").total_earned, 50);

    // 被拒的第二次签到归还了刚预留的入账额度
    let earn_key = day_window_key(window::EARN_DAY, Utc::now());
    let earn_window = repo.find_window("u1", &earn_key).await.unwrap().unwrap();
    assert_eq!(earn_window.consumed_amount, 50);
}

#[tokio::test]
async fn test_capped_checkin_does_not_burn_the_day() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    // Restricted每日入账上限1_000，先耗尽
    svc.submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 1_000))
        .await
        .unwrap();

    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::DailyCheckin, "session-1", 50))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, ClaimStatus::Rejected);
    assert!(outcome.record.reject_reason.as_deref().unwrap().contains("cap"));

    // 因限额被拒不消耗当日唯一一次签到机会
    let checkin_key = day_window_key(window::CHECKIN_DAY, Utc::now());
    let consumed = repo
        .find_window("u1", &checkin_key)
        .await
        .unwrap()
        .map(|w| w.request_count)
        .unwrap_or(0);
    assert_eq!(consumed, 0);
}

#[tokio::test]
async fn test_milestone_fires_at_most_once() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let milestone = ClaimRecord::milestone_ref(100);

    let first = svc
        .submit_claim(claim("u1", ClaimActionType::Milestone, &milestone, 400))
        .await
        .unwrap();
    // 底层计数被重算后再次触发同一阈值
    let second = svc
        .submit_claim(claim("u1", ClaimActionType::Milestone, &milestone, 400))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(repo.account("u1").total_earned, 400);
}

#[tokio::test]
async fn test_action_below_tier_is_rejected() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    // 新账户Restricted，upload_bonus要求Bronze
    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::UploadBonus, "upload-9", 800))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, ClaimStatus::Rejected);
    assert!(outcome.record.reject_reason.as_deref().unwrap().contains("requires tier"));
    assert_eq!(repo.account("u1").total_earned, 0);
}

#[tokio::test]
async fn test_gold_tier_can_claim_upload_bonus() {
    let repo = Arc::new(MemoryRepo::new());
    repo.seed_account(gold_account("u1"));
    let svc = service(&repo);

    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::UploadBonus, "upload-9", 800))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, ClaimStatus::Applied);
    assert_eq!(outcome.record.applied_amount, 800);
}

#[tokio::test]
async fn test_zero_amount_has_no_side_effect() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let command = claim("u1", ClaimActionType::Welcome, "signup-u1", 0);
    let claim_id = ClaimRecord::derive_claim_id("u1", ClaimActionType::Welcome, "signup-u1");

    let result = svc.submit_claim(command).await;

    assert!(matches!(result, Err(utils::AppError::BadRequest(_))));
    assert!(repo.find_by_claim_id(&claim_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejection_closes_idempotency_window() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);
    let command = claim("u1", ClaimActionType::UploadBonus, "upload-9", 800);

    let first = svc.submit_claim(command.clone()).await.unwrap();
    assert_eq!(first.record.status, ClaimStatus::Rejected);

    // 账户后续升级到Gold也不会让旧claim翻案：重试重放当初的拒绝
    repo.seed_account(gold_account("u1"));
    let retry = svc.submit_claim(command).await.unwrap();

    assert!(retry.replayed);
    assert_eq!(retry.record.status, ClaimStatus::Rejected);
    assert_eq!(repo.account("u1").total_earned, 0);
}

#[tokio::test]
async fn test_applied_amount_visible_through_repository() {
    let repo = Arc::new(MemoryRepo::new());
    let svc = service(&repo);

    let outcome = svc
        .submit_claim(claim("u1", ClaimActionType::Welcome, "signup-u1", 700))
        .await
        .unwrap();

    let stored = repo.find_by_claim_id(&outcome.record.claim_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Applied);
    assert_eq!(stored.applied_amount, 700);

    let account = repo.find_account("u1").await.unwrap().unwrap();
    assert_eq!(account.pending_amount, 700);
}
