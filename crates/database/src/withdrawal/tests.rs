use super::model::{WithdrawalRequest, WithdrawalStatus};

#[test]
fn test_new_request_starts_pending_approval() {
    let request = WithdrawalRequest::new("user_1".to_string(), "FA1RJD...".to_string(), 100_000);

    assert_eq!(request.status, WithdrawalStatus::PendingApproval);
    assert!(request.tx_hash.is_none());
    assert!(request.admin_notes.is_empty());
    assert!(!request.needs_reconciliation);
    assert!(!request.is_terminal());
}

#[test]
fn test_withdrawal_ids_are_unique() {
    let a = WithdrawalRequest::new("user_1".to_string(), "addr".to_string(), 1);
    let b = WithdrawalRequest::new("user_1".to_string(), "addr".to_string(), 1);

    assert_ne!(a.withdrawal_id, b.withdrawal_id);
}

#[test]
fn test_legal_transitions() {
    use WithdrawalStatus::*;

    assert!(PendingApproval.can_transition_to(Approved));
    assert!(PendingApproval.can_transition_to(Rejected));
    assert!(Approved.can_transition_to(Processing));
    // 预留失败时的补偿分支
    assert!(Approved.can_transition_to(Failed));
    assert!(Processing.can_transition_to(Completed));
    assert!(Processing.can_transition_to(Failed));
}

#[test]
fn test_illegal_transitions() {
    use WithdrawalStatus::*;

    // 终态永久不可迁出
    for terminal in [Completed, Failed, Rejected] {
        for next in [PendingApproval, Approved, Processing, Completed, Failed, Rejected] {
            assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
        }
    }
    // 不允许跳过审批或预留
    assert!(!PendingApproval.can_transition_to(Processing));
    assert!(!PendingApproval.can_transition_to(Completed));
    assert!(!Approved.can_transition_to(Completed));
    // 不允许回退
    assert!(!Processing.can_transition_to(Approved));
    assert!(!Approved.can_transition_to(PendingApproval));
}

#[test]
fn test_terminality() {
    use WithdrawalStatus::*;

    assert!(Completed.is_terminal());
    assert!(Failed.is_terminal());
    assert!(Rejected.is_terminal());
    assert!(!PendingApproval.is_terminal());
    assert!(!Approved.is_terminal());
    assert!(!Processing.is_terminal());
}

#[test]
fn test_status_wire_names_match_as_str() {
    // CAS过滤器里用as_str字符串，必须与serde序列化保持一致
    let json = serde_json::to_string(&WithdrawalStatus::PendingApproval).unwrap();
    assert_eq!(json, "\"PendingApproval\"");
    assert_eq!(WithdrawalStatus::PendingApproval.as_str(), "PendingApproval");
}
