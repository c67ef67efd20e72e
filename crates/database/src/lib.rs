////////////////////////////////////////////////////////////////////////
//
// 1. 每个Domain(Entity)单独一个文件夹
// 2. 每个Domain由两部分组成:
//    - model: 定义Schema
//    - repository: 实际的数据库底层操作
//
//////////////////////////////////////////////////////////////////////

use mongodb::{Client, Collection, IndexModel};
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use std::sync::Arc;
use tracing::info;
use utils::{AppConfig, AppResult};

pub mod audit_event;
pub mod cap_window;
pub mod claim_record;
pub mod reward_account;
pub mod withdrawal;

use audit_event::model::AuditEvent;
use cap_window::model::CapWindow;
use claim_record::model::ClaimRecord;
use reward_account::model::RewardAccount;
use withdrawal::model::WithdrawalRequest;

#[derive(Clone, Debug)]
pub struct Database {
    pub reward_accounts: Collection<RewardAccount>,
    pub claim_records: Collection<ClaimRecord>,
    pub withdrawals: Collection<WithdrawalRequest>,
    pub cap_windows: Collection<CapWindow>,
    pub audit_events: Collection<AuditEvent>,
}

impl Database {
    pub async fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let db: mongodb::Database = client.database(&config.mongo_db);

        let reward_accounts = db.collection("RewardAccount");
        let claim_records = db.collection("ClaimRecord");
        let withdrawals = db.collection("WithdrawalRequest");
        let cap_windows = db.collection("CapWindow");
        let audit_events = db.collection("AuditEvent");

        info!("🧱 database({:#}) connected.", &config.mongo_db);

        Ok(Database {
            reward_accounts,
            claim_records,
            withdrawals,
            cap_windows,
            audit_events,
        })
    }

    /// 初始化全部索引
    ///
    /// 唯一索引是幂等性与资金安全的基石，必须在服务启动前建立:
    /// - ClaimRecord.claim_id: 同一claim只能有一条记录(重复insert触发E11000)
    /// - CapWindow.(user_id, window_key): 同一窗口只有一个计数文档
    pub async fn init_indexes(&self) -> AppResult<()> {
        info!("🔧 初始化数据库索引...");

        self.reward_accounts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name("user_id_unique".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.claim_records
            .create_indexes(
                vec![
                    IndexModel::builder()
                        .keys(doc! { "claim_id": 1 })
                        .options(
                            IndexOptions::builder()
                                .unique(true)
                                .name("claim_id_unique".to_string())
                                .build(),
                        )
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "user_id": 1, "created_at": -1 })
                        .options(IndexOptions::builder().name("user_created_desc".to_string()).build())
                        .build(),
                ],
                None,
            )
            .await?;

        self.withdrawals
            .create_indexes(
                vec![
                    IndexModel::builder()
                        .keys(doc! { "withdrawal_id": 1 })
                        .options(
                            IndexOptions::builder()
                                .unique(true)
                                .name("withdrawal_id_unique".to_string())
                                .build(),
                        )
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "status": 1, "needs_reconciliation": 1 })
                        .options(IndexOptions::builder().name("status_reconciliation".to_string()).build())
                        .build(),
                ],
                None,
            )
            .await?;

        self.cap_windows
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "window_key": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name("user_window_unique".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.audit_events
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "created_at": -1 })
                    .options(IndexOptions::builder().name("audit_user_created".to_string()).build())
                    .build(),
                None,
            )
            .await?;

        info!("✅ 数据库索引初始化完成");
        Ok(())
    }
}

// Re-export repositories and frequently used items
pub use audit_event::repository::{AuditEventRepositoryTrait, DynAuditEventRepository};
pub use cap_window::repository::{CapReserveOutcome, CapWindowRepositoryTrait, DynCapWindowRepository};
pub use claim_record::repository::{ClaimInsertOutcome, ClaimRecordRepositoryTrait, DynClaimRecordRepository};
pub use reward_account::repository::{DynRewardAccountRepository, RewardAccountRepositoryTrait};
pub use withdrawal::repository::{DynWithdrawalRepository, WithdrawalRepositoryTrait};
