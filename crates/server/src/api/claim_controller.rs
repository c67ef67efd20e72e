use crate::{
    dtos::claim_dto::{ClaimResultDto, SubmitClaimDto},
    extractors::validation_extractor::ValidationExtractor,
    services::{claim::SubmitClaimCommand, Services},
};
use axum::{routing::post, Extension, Json, Router};
use utils::AppResult;

pub struct ClaimController;
impl ClaimController {
    pub fn app() -> Router {
        Router::new().route("/", post(submit_claim))
    }
}

/// 提交一次奖励领取
///
/// 幂等：同一(user_id, action_type, external_ref_id)的重试返回首次的终态。
/// 被每日上限截断时按截断后的金额入账；资格不足时记录为Rejected并返回200。
#[utoipa::path(
    post,
    path = "/api/v1/claims/",
    request_body = SubmitClaimDto,
    responses(
        (status = 200, description = "领取终态（含幂等重放）", body = ClaimResultDto),
        (status = 409, description = "同一claim仍在处理中"),
        (status = 422, description = "请求体校验失败")
    ),
    tag = "奖励领取"
)]
pub async fn submit_claim(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<SubmitClaimDto>,
) -> AppResult<Json<ClaimResultDto>> {
    let outcome = services
        .claim
        .submit_claim(SubmitClaimCommand {
            user_id: req.user_id,
            action_type: req.action_type,
            external_ref_id: req.external_ref_id,
            amount: req.amount,
        })
        .await?;

    Ok(Json(outcome.into()))
}
