use crate::error::ChainError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use utils::AppConfig;

/// 单笔交易费的最低预算(lamports)，低于此值视为国库gas不足
const MIN_FEE_LAMPORTS: u64 = 10_000;

/// 确认轮询间隔
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 链上转账回执
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub signature: String,
    pub slot: u64,
}

pub type DynChainClient = Arc<dyn ChainClientTrait + Send + Sync>;

/// Chain Client契约
///
/// 这是一个刻意收窄的边界：没有任何业务逻辑（不查上限、不碰账本），
/// 使签名私钥的影响面最小化。结算服务是它唯一的持有者。
#[async_trait]
pub trait ChainClientTrait {
    /// 从国库向目标地址转出amount个CAMLY（最小单位），
    /// 至少观察到1次确认后才返回Ok
    async fn transfer(&self, to_address: &str, amount: u64) -> Result<TxReceipt, ChainError>;

    /// 查询某地址的CAMLY余额
    async fn balance_of(&self, owner_address: &str) -> Result<u64, ChainError>;
}

/// 国库客户端：RPC节点 + 国库签名密钥的薄封装
///
/// 密钥与nonce顺序由本结构独占；调用方（结算服务）负责把对transfer的
/// 调用串行化成single-writer，避免同一国库钱包的nonce冲突。
pub struct TreasuryClient {
    rpc_client: RpcClient,
    treasury: Keypair,
    camly_mint: Pubkey,
    confirm_timeout: Duration,
}

impl TreasuryClient {
    pub fn new(rpc_url: &str, private_key: &str, camly_mint: &str, confirm_timeout: Duration) -> Result<Self> {
        let rpc_client = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        let key_bytes = bs58::decode(private_key)
            .into_vec()
            .map_err(|e| anyhow!("treasury private key is not valid base58: {}", e))?;
        let treasury =
            Keypair::from_bytes(&key_bytes).map_err(|e| anyhow!("invalid treasury private key: {}", e))?;
        let camly_mint = camly_mint
            .parse::<Pubkey>()
            .map_err(|e| anyhow!("invalid CAMLY mint address: {}", e))?;

        Ok(Self {
            rpc_client,
            treasury,
            camly_mint,
            confirm_timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let private_key = config
            .treasury_private_key
            .as_deref()
            .ok_or_else(|| anyhow!("TREASURY_PRIVATE_KEY is not configured"))?;

        Self::new(
            &config.rpc_url,
            private_key,
            &config.camly_mint,
            Duration::from_secs(config.confirm_timeout_secs),
        )
    }

    pub fn treasury_address(&self) -> Pubkey {
        self.treasury.pubkey()
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError> {
        let balance = self
            .rpc_client
            .get_token_account_balance(token_account)
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;

        balance
            .amount
            .parse::<u64>()
            .map_err(|e| ChainError::RpcUnavailable(format!("malformed token amount: {}", e)))
    }

    /// 轮询签名状态直到观察到>=1次确认或超时。
    /// 超时不等于失败：交易可能事后上链，签名必须交还调用方记录。
    async fn await_confirmation(&self, signature: &Signature) -> Result<u64, ChainError> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;

        loop {
            let statuses = self
                .rpc_client
                .get_signature_statuses(&[*signature])
                .await
                .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;

            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(ChainError::Reverted(err.to_string()));
                }
                // confirmations == None 表示已rooted
                let confirmed = match status.confirmations {
                    None => true,
                    Some(n) => n >= 1,
                };
                if confirmed {
                    return Ok(status.slot);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!("⏱️ 确认超时: signature={}", signature);
                return Err(ChainError::ConfirmationTimeout {
                    signature: signature.to_string(),
                });
            }

            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

fn classify_send_error(err: solana_client::client_error::ClientError) -> ChainError {
    match err.get_transaction_error() {
        Some(tx_err) => ChainError::Reverted(tx_err.to_string()),
        None => ChainError::RpcUnavailable(err.to_string()),
    }
}

#[async_trait]
impl ChainClientTrait for TreasuryClient {
    async fn transfer(&self, to_address: &str, amount: u64) -> Result<TxReceipt, ChainError> {
        let recipient = to_address
            .parse::<Pubkey>()
            .map_err(|_| ChainError::Reverted(format!("invalid recipient address: {}", to_address)))?;

        // 预检1: 国库gas
        let lamports = self
            .rpc_client
            .get_balance(&self.treasury.pubkey())
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;
        if lamports < MIN_FEE_LAMPORTS {
            return Err(ChainError::InsufficientGas(format!(
                "treasury has {} lamports, needs at least {}",
                lamports, MIN_FEE_LAMPORTS
            )));
        }

        // 预检2: 国库代币余额
        let treasury_ata = get_associated_token_address(&self.treasury.pubkey(), &self.camly_mint);
        let token_balance = self.token_balance(&treasury_ata).await?;
        if token_balance < amount {
            return Err(ChainError::InsufficientTokenBalance);
        }

        let recipient_ata = get_associated_token_address(&recipient, &self.camly_mint);
        let instructions = vec![
            // 接收方ATA不存在时自动创建，已存在时是no-op
            create_associated_token_account_idempotent(
                &self.treasury.pubkey(),
                &recipient,
                &self.camly_mint,
                &spl_token::id(),
            ),
            spl_token::instruction::transfer(
                &spl_token::id(),
                &treasury_ata,
                &recipient_ata,
                &self.treasury.pubkey(),
                &[],
                amount,
            )
            .map_err(|e| ChainError::Reverted(e.to_string()))?,
        ];

        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;

        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.treasury.pubkey()),
            &[&self.treasury],
            blockhash,
        );

        let signature = self
            .rpc_client
            .send_transaction(&transaction)
            .await
            .map_err(classify_send_error)?;

        info!("📡 转账已广播: to={}, amount={}, signature={}", to_address, amount, signature);

        let slot = self.await_confirmation(&signature).await?;

        info!("✅ 转账已确认: signature={}, slot={}", signature, slot);

        Ok(TxReceipt {
            signature: signature.to_string(),
            slot,
        })
    }

    async fn balance_of(&self, owner_address: &str) -> Result<u64, ChainError> {
        let owner = owner_address
            .parse::<Pubkey>()
            .map_err(|_| ChainError::Reverted(format!("invalid address: {}", owner_address)))?;

        let ata = get_associated_token_address(&owner, &self.camly_mint);
        self.token_balance(&ata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "CAMLYt5HQz7CdtDqCSFsD2fskqYMHRg24WVmzVTS8LTo";

    #[test]
    fn test_new_rejects_malformed_private_key() {
        // 非base58字符
        let result = TreasuryClient::new("http://localhost:8899", "not-a-key!!", MINT, Duration::from_secs(1));
        assert!(result.is_err());

        // base58合法但不是64字节密钥
        let result = TreasuryClient::new("http://localhost:8899", "abc", MINT, Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_new_accepts_wellformed_key() {
        let keypair = Keypair::new();
        let encoded = keypair.to_base58_string();

        let client = TreasuryClient::new("http://localhost:8899", &encoded, MINT, Duration::from_secs(1)).unwrap();
        assert_eq!(client.treasury_address(), keypair.pubkey());
    }
}
