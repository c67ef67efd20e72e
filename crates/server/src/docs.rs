use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CAMLY Reward Engine API",
        description = "基于 Rust 和 Axum 的奖励累积与提现结算引擎 API 文档",
        version = "1.0.0",
        contact(
            name = "API Support",
            email = "support@camly.world"
        )
    ),
    paths(
        // System health check
        crate::api::health,
        // Claim endpoints
        crate::api::claim_controller::submit_claim,
        // Withdrawal endpoints
        crate::api::withdrawal_controller::request_withdrawal,
        crate::api::withdrawal_controller::get_withdrawal,
        crate::api::withdrawal_controller::approve_withdrawal,
        crate::api::withdrawal_controller::reject_withdrawal,
        crate::api::withdrawal_controller::process_withdrawal,
        // Account endpoints
        crate::api::account_controller::get_account_status,
        crate::api::account_controller::link_wallet,
        crate::api::account_controller::record_approved_upload,
        crate::api::account_controller::flag_anomaly,
    ),
    components(
        schemas(
            // Database models
            database::reward_account::model::RewardAccount,
            database::claim_record::model::ClaimRecord,
            database::claim_record::model::ClaimActionType,
            database::claim_record::model::ClaimStatus,
            database::withdrawal::model::WithdrawalRequest,
            database::withdrawal::model::WithdrawalStatus,
            database::cap_window::model::CapWindow,
            database::audit_event::model::AuditEvent,
            database::audit_event::model::AuditKind,
            // DTOs
            crate::dtos::claim_dto::SubmitClaimDto,
            crate::dtos::claim_dto::ClaimResultDto,
            crate::dtos::withdrawal_dto::RequestWithdrawalDto,
            crate::dtos::withdrawal_dto::ReviewWithdrawalDto,
            crate::dtos::withdrawal_dto::SettlementResultDto,
            crate::dtos::account_dto::LinkWalletDto,
            // Views
            crate::services::account::AccountStatus,
            crate::services::account::CapUsage,
            crate::services::trust::TrustTier,
        )
    ),
    tags(
        (name = "系统状态", description = "健康检查"),
        (name = "奖励领取", description = "幂等的奖励入账"),
        (name = "提现结算", description = "审批与链上结算"),
        (name = "账户", description = "账户视图与信任信号")
    )
)]
pub struct ApiDoc;
