use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 限额窗口计数器（每用户、每窗口一个文档）
///
/// 窗口过期完全靠key比较惰性识别：新的UTC日/小时产生新的window_key，
/// 首次访问时upsert出新文档即完成"重置"。不依赖任何后台清扫任务，
/// 后台清扫与并发写之间的丢失更新在这里结构上不可能发生。
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CapWindow {
    pub user_id: String,
    /// 形如 "earn:2026-08-27"、"wd-cnt:2026-08-27T13"
    pub window_key: String,
    /// 本窗口已消耗的金额
    pub consumed_amount: u64,
    /// 本窗口已发起的请求次数
    pub request_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

/// 日粒度窗口key（UTC）
pub fn day_window_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}:{}", prefix, at.format("%Y-%m-%d"))
}

/// 小时粒度窗口key（UTC）
pub fn hour_window_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}:{}", prefix, at.format("%Y-%m-%dT%H"))
}

/// 窗口key前缀
pub mod window {
    /// 每日获得奖励金额上限
    pub const EARN_DAY: &str = "earn";
    /// 每日提现金额上限
    pub const WITHDRAW_AMOUNT_DAY: &str = "wd-amt";
    /// 每小时提现发起次数上限
    pub const WITHDRAW_COUNT_HOUR: &str = "wd-cnt";
    /// 每日签到去重
    pub const CHECKIN_DAY: &str = "checkin";
}
