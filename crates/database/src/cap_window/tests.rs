use super::model::{day_window_key, hour_window_key, window};
use chrono::{TimeZone, Utc};

#[test]
fn test_day_window_key_format() {
    let at = Utc.with_ymd_and_hms(2026, 8, 27, 13, 45, 9).unwrap();

    assert_eq!(day_window_key(window::EARN_DAY, at), "earn:2026-08-27");
    assert_eq!(day_window_key(window::WITHDRAW_AMOUNT_DAY, at), "wd-amt:2026-08-27");
    assert_eq!(day_window_key(window::CHECKIN_DAY, at), "checkin:2026-08-27");
}

#[test]
fn test_hour_window_key_format() {
    let at = Utc.with_ymd_and_hms(2026, 8, 27, 13, 45, 9).unwrap();

    assert_eq!(hour_window_key(window::WITHDRAW_COUNT_HOUR, at), "wd-cnt:2026-08-27T13");
}

#[test]
fn test_same_day_same_key() {
    let morning = Utc.with_ymd_and_hms(2026, 8, 27, 0, 0, 0).unwrap();
    let night = Utc.with_ymd_and_hms(2026, 8, 27, 23, 59, 59).unwrap();

    assert_eq!(day_window_key("earn", morning), day_window_key("earn", night));
}

#[test]
fn test_utc_day_boundary_rolls_key() {
    // 窗口重置只靠key变化，必须精确发生在UTC零点
    let before = Utc.with_ymd_and_hms(2026, 8, 27, 23, 59, 59).unwrap();
    let after = Utc.with_ymd_and_hms(2026, 8, 28, 0, 0, 0).unwrap();

    assert_ne!(day_window_key("earn", before), day_window_key("earn", after));
}

#[test]
fn test_hour_boundary_rolls_key() {
    let before = Utc.with_ymd_and_hms(2026, 8, 27, 13, 59, 59).unwrap();
    let after = Utc.with_ymd_and_hms(2026, 8, 27, 14, 0, 0).unwrap();

    assert_ne!(hour_window_key("wd-cnt", before), hour_window_key("wd-cnt", after));
}
