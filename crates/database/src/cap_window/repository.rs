use crate::{cap_window::model::CapWindow, Database};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use std::sync::Arc;
use utils::AppResult;

pub type DynCapWindowRepository = Arc<dyn CapWindowRepositoryTrait + Send + Sync>;

/// 限额预留的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapReserveOutcome {
    /// 预留成功，remaining为本窗口剩余额度
    Reserved { remaining: u64 },
    /// 超出上限，未发生任何消耗
    Exceeded { remaining: u64 },
}

/// 限额窗口仓库
///
/// 预留必须是compare-and-increment而不是读后写：
/// 上限守卫写进$inc的过滤器里，并发的N个预留里只有总量不超限的子集能成功。
#[async_trait]
pub trait CapWindowRepositoryTrait {
    /// 原子预留amount，超限时整笔拒绝
    async fn reserve_cap(&self, user_id: &str, window_key: &str, amount: u64, ceiling: u64)
        -> AppResult<CapReserveOutcome>;

    /// 原子预留不超过requested的额度（赚取侧的截断策略），返回实际授予量（可能为0）
    async fn reserve_up_to(&self, user_id: &str, window_key: &str, requested: u64, ceiling: u64) -> AppResult<u64>;

    /// 原子计数一次请求，达到max_requests后返回false
    async fn count_request(&self, user_id: &str, window_key: &str, max_requests: u32) -> AppResult<bool>;

    /// 归还此前预留的额度（拒绝/失败的补偿路径）。
    /// 窗口已滚动或余量不足时是无操作——旧窗口不会再被任何预留读到。
    async fn release_cap(&self, user_id: &str, window_key: &str, amount: u64) -> AppResult<()>;

    async fn find_window(&self, user_id: &str, window_key: &str) -> AppResult<Option<CapWindow>>;
}

impl Database {
    /// 惰性建窗：新window_key首次被触达时upsert出零值文档。
    /// $setOnInsert对已存在的文档是无操作，并发首访只会建一个。
    async fn ensure_window(&self, user_id: &str, window_key: &str) -> AppResult<()> {
        let now = Utc::now().timestamp() as i64;
        let filter = doc! { "user_id": user_id, "window_key": window_key };
        let update = doc! {
            "$setOnInsert": {
                "user_id": user_id,
                "window_key": window_key,
                "consumed_amount": 0i64,
                "request_count": 0i32,
                "created_at": now,
                "updated_at": now,
            }
        };
        let options = UpdateOptions::builder().upsert(true).build();

        self.cap_windows.update_one(filter, update, options).await?;

        Ok(())
    }
}

#[async_trait]
impl CapWindowRepositoryTrait for Database {
    async fn reserve_cap(
        &self,
        user_id: &str,
        window_key: &str,
        amount: u64,
        ceiling: u64,
    ) -> AppResult<CapReserveOutcome> {
        self.ensure_window(user_id, window_key).await?;

        if amount > ceiling {
            let window = self.find_window(user_id, window_key).await?;
            let consumed = window.map(|w| w.consumed_amount).unwrap_or(0);
            return Ok(CapReserveOutcome::Exceeded {
                remaining: ceiling.saturating_sub(consumed),
            });
        }

        let now = Utc::now().timestamp() as i64;
        let filter = doc! {
            "user_id": user_id,
            "window_key": window_key,
            "consumed_amount": { "$lte": (ceiling - amount) as i64 },
        };
        let update = doc! {
            "$inc": { "consumed_amount": amount as i64 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        match self.cap_windows.find_one_and_update(filter, update, options).await? {
            Some(window) => Ok(CapReserveOutcome::Reserved {
                remaining: ceiling.saturating_sub(window.consumed_amount),
            }),
            None => {
                let window = self.find_window(user_id, window_key).await?;
                let consumed = window.map(|w| w.consumed_amount).unwrap_or(0);
                Ok(CapReserveOutcome::Exceeded {
                    remaining: ceiling.saturating_sub(consumed),
                })
            }
        }
    }

    async fn reserve_up_to(&self, user_id: &str, window_key: &str, requested: u64, ceiling: u64) -> AppResult<u64> {
        self.ensure_window(user_id, window_key).await?;

        // 竞争者可能在读与条件写之间抢占额度，条件写失败就按新余量重试
        for _ in 0..3 {
            let window = self.find_window(user_id, window_key).await?;
            let consumed = window.map(|w| w.consumed_amount).unwrap_or(0);
            let remaining = ceiling.saturating_sub(consumed);
            let grant = requested.min(remaining);
            if grant == 0 {
                return Ok(0);
            }

            let now = Utc::now().timestamp() as i64;
            let filter = doc! {
                "user_id": user_id,
                "window_key": window_key,
                "consumed_amount": { "$lte": (ceiling - grant) as i64 },
            };
            let update = doc! {
                "$inc": { "consumed_amount": grant as i64 },
                "$set": { "updated_at": now },
            };
            let options = FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build();

            if self
                .cap_windows
                .find_one_and_update(filter, update, options)
                .await?
                .is_some()
            {
                return Ok(grant);
            }
        }

        Ok(0)
    }

    async fn count_request(&self, user_id: &str, window_key: &str, max_requests: u32) -> AppResult<bool> {
        self.ensure_window(user_id, window_key).await?;

        let now = Utc::now().timestamp() as i64;
        let filter = doc! {
            "user_id": user_id,
            "window_key": window_key,
            "request_count": { "$lt": max_requests as i32 },
        };
        let update = doc! {
            "$inc": { "request_count": 1i32 },
            "$set": { "updated_at": now },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let allowed = self
            .cap_windows
            .find_one_and_update(filter, update, options)
            .await?
            .is_some();

        Ok(allowed)
    }

    async fn release_cap(&self, user_id: &str, window_key: &str, amount: u64) -> AppResult<()> {
        let now = Utc::now().timestamp() as i64;
        // consumed_amount下限守卫写进过滤器，归还永远不会把计数减成负数
        let filter = doc! {
            "user_id": user_id,
            "window_key": window_key,
            "consumed_amount": { "$gte": amount as i64 },
        };
        let update = doc! {
            "$inc": { "consumed_amount": -(amount as i64) },
            "$set": { "updated_at": now },
        };

        self.cap_windows.update_one(filter, update, None).await?;

        Ok(())
    }

    async fn find_window(&self, user_id: &str, window_key: &str) -> AppResult<Option<CapWindow>> {
        let window = self
            .cap_windows
            .find_one(doc! { "user_id": user_id, "window_key": window_key }, None)
            .await?;

        Ok(window)
    }
}
