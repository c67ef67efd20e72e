use crate::{
    dtos::account_dto::LinkWalletDto,
    extractors::validation_extractor::ValidationExtractor,
    services::{account::AccountStatus, Services},
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Json, Router,
};
use database::reward_account::model::RewardAccount;
use utils::AppResult;

pub struct AccountController;
impl AccountController {
    pub fn app() -> Router {
        Router::new()
            .route("/:user_id", get(get_account_status))
            .route("/:user_id/wallet", post(link_wallet))
            .route("/:user_id/signals/upload-approved", post(record_approved_upload))
            .route("/:user_id/signals/anomaly", post(flag_anomaly))
    }
}

/// 账户状态快照
///
/// 账本余额 + 实时信任评估 + 当日限额用量
#[utoipa::path(
    get,
    path = "/api/v1/account/{user_id}",
    params(("user_id" = String, Path, description = "用户ID")),
    responses(
        (status = 200, description = "账户状态", body = AccountStatus),
        (status = 404, description = "账户不存在")
    ),
    tag = "账户"
)]
pub async fn get_account_status(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> AppResult<Json<AccountStatus>> {
    let status = services.account.get_account_status(&user_id).await?;

    Ok(Json(status))
}

/// 绑定钱包地址
#[utoipa::path(
    post,
    path = "/api/v1/account/{user_id}/wallet",
    params(("user_id" = String, Path, description = "用户ID")),
    request_body = LinkWalletDto,
    responses(
        (status = 200, description = "已绑定", body = RewardAccount),
        (status = 422, description = "地址非法")
    ),
    tag = "账户"
)]
pub async fn link_wallet(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
    ValidationExtractor(req): ValidationExtractor<LinkWalletDto>,
) -> AppResult<Json<RewardAccount>> {
    let account = services.account.link_wallet(&user_id, &req.wallet_address).await?;

    Ok(Json(account))
}

/// 上传审核通过信号（内容审核系统回调，正向信任信号）
#[utoipa::path(
    post,
    path = "/api/v1/account/{user_id}/signals/upload-approved",
    params(("user_id" = String, Path, description = "用户ID")),
    responses(
        (status = 200, description = "已记录", body = RewardAccount)
    ),
    tag = "账户"
)]
pub async fn record_approved_upload(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RewardAccount>> {
    let account = services.account.record_approved_upload(&user_id).await?;

    Ok(Json(account))
}

/// 异常标记信号（风控系统回调，负向信任信号）
#[utoipa::path(
    post,
    path = "/api/v1/account/{user_id}/signals/anomaly",
    params(("user_id" = String, Path, description = "用户ID")),
    responses(
        (status = 200, description = "已记录", body = RewardAccount)
    ),
    tag = "账户"
)]
pub async fn flag_anomaly(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RewardAccount>> {
    let account = services.account.flag_anomaly(&user_id).await?;

    Ok(Json(account))
}
