use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 当前窗口内的计数
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub reset_at: DateTime<Utc>,
}

impl WindowCount {
    /// 距离窗口结束的秒数，向上取整，至少为 1
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            1
        } else {
            (millis as u64).div_ceil(1000).max(1)
        }
    }
}
