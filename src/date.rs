//! HTTP-date 生成 (RFC 9110 Section 5.6.7)
//!
//! Date ヘッダーと Cookie の expires 属性に使う IMF-fixdate を生成する。
//!
//! ```rust
//! use shiguredo_httpd::date::HttpDate;
//!
//! let date = HttpDate::from_unix_secs(784111777);
//! assert_eq!(date.to_string(), "Sun, 06 Nov 1994 08:49:37 GMT");
//! ```

use core::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// HTTP-date (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDate {
    /// 曜日 (0 = 日曜)
    weekday: u8,
    day: u8,
    month: u8,
    year: i32,
    hour: u8,
    minute: u8,
    second: u8,
}

impl HttpDate {
    /// 現在時刻
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// `SystemTime` から作成
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self::from_unix_secs(secs)
    }

    /// 現在から `days` 日後 (負数なら前)
    pub fn days_from_now(days: i64) -> Self {
        let offset = Duration::from_secs(days.unsigned_abs() * 86_400);
        let now = SystemTime::now();
        let time = if days >= 0 {
            now + offset
        } else {
            now.checked_sub(offset).unwrap_or(UNIX_EPOCH)
        };
        Self::from_system_time(time)
    }

    /// UNIX 時刻 (秒) から作成
    pub fn from_unix_secs(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        Self {
            // 1970-01-01 は木曜日
            weekday: (days + 4).rem_euclid(7) as u8,
            day,
            month,
            year,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

/// 1970-01-01 からの日数を (年, 月, 日) へ変換
fn civil_from_days(days: i64) -> (i32, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year as i32, month, day)
}

impl fmt::Display for HttpDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
            DAY_NAMES[self.weekday as usize],
            self.day,
            MONTH_NAMES[(self.month - 1) as usize],
            self.year,
            self.hour,
            self.minute,
            self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(
            HttpDate::from_unix_secs(0).to_string(),
            "Thu, 01 Jan 1970 00:00:00 GMT"
        );
    }

    #[test]
    fn test_known_dates() {
        assert_eq!(
            HttpDate::from_unix_secs(784_111_777).to_string(),
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
        // 閏日
        assert_eq!(
            HttpDate::from_unix_secs(951_782_400).to_string(),
            "Tue, 29 Feb 2000 00:00:00 GMT"
        );
    }

    #[test]
    fn test_before_epoch() {
        assert_eq!(
            HttpDate::from_unix_secs(-1).to_string(),
            "Wed, 31 Dec 1969 23:59:59 GMT"
        );
    }

    #[test]
    fn test_from_system_time() {
        let time = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(
            HttpDate::from_system_time(time),
            HttpDate::from_unix_secs(784_111_777)
        );
    }

    #[test]
    fn test_days_from_now() {
        let past = HttpDate::days_from_now(-30);
        let future = HttpDate::days_from_now(30);
        assert!(past.year() <= future.year());
    }
}
