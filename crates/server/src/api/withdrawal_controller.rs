use crate::{
    dtos::withdrawal_dto::{RequestWithdrawalDto, ReviewWithdrawalDto, SettlementResultDto},
    extractors::validation_extractor::ValidationExtractor,
    services::Services,
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Json, Router,
};
use database::{withdrawal::model::WithdrawalRequest, WithdrawalRepositoryTrait};
use utils::{AppError, AppResult};

pub struct WithdrawalController;
impl WithdrawalController {
    pub fn app() -> Router {
        Router::new()
            .route("/", post(request_withdrawal))
            .route("/:withdrawal_id", get(get_withdrawal))
            .route("/:withdrawal_id/approve", post(approve_withdrawal))
            .route("/:withdrawal_id/reject", post(reject_withdrawal))
            .route("/:withdrawal_id/process", post(process_withdrawal))
    }
}

/// 发起提现请求
///
/// 校验信任分、冷却期、每小时频次与每日限额；不动账本余额。
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/",
    request_body = RequestWithdrawalDto,
    responses(
        (status = 200, description = "已创建，等待审批", body = WithdrawalRequest),
        (status = 403, description = "资格不足（信任分/冷却/限额）"),
        (status = 422, description = "请求体校验失败")
    ),
    tag = "提现结算"
)]
pub async fn request_withdrawal(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<RequestWithdrawalDto>,
) -> AppResult<Json<WithdrawalRequest>> {
    let request = services.settlement.request_withdrawal(&req.user_id, req.amount).await?;

    Ok(Json(request))
}

/// 查询提现请求
#[utoipa::path(
    get,
    path = "/api/v1/withdrawals/{withdrawal_id}",
    params(("withdrawal_id" = String, Path, description = "提现ID")),
    responses(
        (status = 200, description = "提现详情", body = WithdrawalRequest),
        (status = 404, description = "提现不存在")
    ),
    tag = "提现结算"
)]
pub async fn get_withdrawal(
    Extension(services): Extension<Services>,
    Path(withdrawal_id): Path<String>,
) -> AppResult<Json<WithdrawalRequest>> {
    match services.database.find_by_id(&withdrawal_id).await? {
        Some(request) => Ok(Json(request)),
        None => Err(AppError::NotFound(format!("Withdrawal {} not found.", withdrawal_id))),
    }
}

/// 审批通过（管理端，调用方已鉴权）
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{withdrawal_id}/approve",
    params(("withdrawal_id" = String, Path, description = "提现ID")),
    request_body = ReviewWithdrawalDto,
    responses(
        (status = 200, description = "已批准（重复审批幂等）", body = WithdrawalRequest),
        (status = 409, description = "当前状态不可审批")
    ),
    tag = "提现结算"
)]
pub async fn approve_withdrawal(
    Extension(services): Extension<Services>,
    Path(withdrawal_id): Path<String>,
    ValidationExtractor(req): ValidationExtractor<ReviewWithdrawalDto>,
) -> AppResult<Json<WithdrawalRequest>> {
    let request = services
        .settlement
        .approve_withdrawal(&withdrawal_id, &req.admin_id, req.note.as_deref())
        .await?;

    Ok(Json(request))
}

/// 审批拒绝（管理端，无账本效果）
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{withdrawal_id}/reject",
    params(("withdrawal_id" = String, Path, description = "提现ID")),
    request_body = ReviewWithdrawalDto,
    responses(
        (status = 200, description = "已拒绝", body = WithdrawalRequest),
        (status = 409, description = "当前状态不可拒绝")
    ),
    tag = "提现结算"
)]
pub async fn reject_withdrawal(
    Extension(services): Extension<Services>,
    Path(withdrawal_id): Path<String>,
    ValidationExtractor(req): ValidationExtractor<ReviewWithdrawalDto>,
) -> AppResult<Json<WithdrawalRequest>> {
    let request = services
        .settlement
        .reject_withdrawal(&withdrawal_id, &req.admin_id, req.note.as_deref())
        .await?;

    Ok(Json(request))
}

/// 执行一笔已审批的提现
///
/// 预留 -> 链上转账 -> 完成；任何链上失败都在补偿退款后返回Failed终态。
/// 对终态提现的重复调用是幂等重放（replayed=true），不会二次结算。
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{withdrawal_id}/process",
    params(("withdrawal_id" = String, Path, description = "提现ID")),
    responses(
        (status = 200, description = "结算终态（含幂等重放）", body = SettlementResultDto),
        (status = 403, description = "尚未审批"),
        (status = 409, description = "正在被并发处理")
    ),
    tag = "提现结算"
)]
pub async fn process_withdrawal(
    Extension(services): Extension<Services>,
    Path(withdrawal_id): Path<String>,
) -> AppResult<Json<SettlementResultDto>> {
    let outcome = services.settlement.process_approved_withdrawal(&withdrawal_id).await?;

    Ok(Json(outcome.into()))
}
