use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 绑定钱包的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, ToSchema)]
pub struct LinkWalletDto {
    /// Solana钱包地址（base58）
    #[validate(length(min = 32, max = 44))]
    pub wallet_address: String,
}
