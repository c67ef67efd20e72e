////////////////////////////////////////////////////////////////////////
//
// 服务层分工:
// - trust:      纯函数的信任评估与等级策略（无IO）
// - claim:      奖励领取的端到端编排（幂等 -> 资格 -> 限额 -> 入账）
// - settlement: 提现状态机 + 链上结算 + 补偿退款
// - account:    账户视图与信任信号回调
// - notifier:   终态通知出口（fire-and-forget）
//
//////////////////////////////////////////////////////////////////////

pub mod account;
pub mod claim;
pub mod notifier;
pub mod settlement;
pub mod trust;

#[cfg(test)]
pub mod test_support;

use account::{AccountService, DynAccountService};
use claim::{ClaimService, DynClaimService};
use database::Database;
use notifier::Notifier;
use settlement::{DisabledChainClient, DynSettlementService, SettlementService};
use std::sync::Arc;
use tracing::{info, warn};
use treasury::{DynChainClient, TreasuryClient};
use utils::AppConfig;

#[derive(Clone)]
pub struct Services {
    pub claim: DynClaimService,
    pub settlement: DynSettlementService,
    pub account: DynAccountService,
    pub database: Arc<Database>,
}

impl Services {
    pub fn new(db: Database, config: Arc<AppConfig>) -> Self {
        let database = Arc::new(db);
        let notifier = Notifier::spawn();

        // 签名密钥不可用只停摆结算，账本与Claim处理照常运转
        let chain: DynChainClient = match TreasuryClient::from_config(&config) {
            Ok(client) => {
                info!("🧠 treasury client ready: address={}", client.treasury_address());
                Arc::new(client)
            }
            Err(e) => {
                warn!("⚠️ settlement disabled, treasury client unavailable: {}", e);
                Arc::new(DisabledChainClient)
            }
        };

        let claim = Arc::new(ClaimService::new(
            database.clone(),
            database.clone(),
            database.clone(),
            database.clone(),
            notifier.clone(),
        )) as DynClaimService;

        let settlement = Arc::new(SettlementService::new(
            database.clone(),
            database.clone(),
            database.clone(),
            database.clone(),
            chain,
            notifier.clone(),
        )) as DynSettlementService;

        let account = Arc::new(AccountService::new(database.clone(), database.clone())) as DynAccountService;

        info!("🧠 Services initialized");

        Self {
            claim,
            settlement,
            account,
            database,
        }
    }
}
