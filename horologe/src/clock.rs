use std::ffi::CString;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// strftime output buffer, including the trailing NUL.
pub const FORMAT_BUF: usize = 64;

/// A tick landing this close to the next second is shown as that second.
const ROUND_UP_WITHIN: Duration = Duration::from_millis(100);

pub fn now() -> i64 {
    round_timestamp(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default())
}

pub fn round_timestamp(since_epoch: Duration) -> i64 {
    let secs = since_epoch.as_secs() as i64;
    if Duration::from_secs(1) - Duration::from_nanos(since_epoch.subsec_nanos() as u64) <= ROUND_UP_WITHIN {
        secs + 1
    } else {
        secs
    }
}

/// Formats `timestamp` in local time with a strftime template.
///
/// Panics when the result does not fit in `FORMAT_BUF`; templates are fixed at
/// startup, so an overflow is a sizing bug rather than a runtime condition.
pub fn format(timestamp: i64, template: &str) -> String {
    if template.is_empty() {
        return String::new();
    }
    let Ok(c_template) = CString::new(template) else {
        panic!("time format {template:?} contains a NUL byte");
    };
    let t = timestamp as libc::time_t;
    let mut tm = unsafe { std::mem::zeroed::<libc::tm>() };
    unsafe { libc::localtime_r(&t, &mut tm) };
    let mut buf = [0u8; FORMAT_BUF];
    let len = unsafe {
        libc::strftime(buf.as_mut_ptr() as *mut libc::c_char, buf.len(), c_template.as_ptr(), &tm)
    };
    assert!(len > 0, "time format {template:?} overflowed {FORMAT_BUF} bytes");
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_only_near_the_next_second() {
        assert_eq!(round_timestamp(Duration::new(100, 0)), 100);
        assert_eq!(round_timestamp(Duration::new(100, 899_999_999)), 100);
        assert_eq!(round_timestamp(Duration::new(100, 900_000_000)), 101);
        assert_eq!(round_timestamp(Duration::new(100, 999_000_000)), 101);
    }

    #[test]
    fn formats_with_strftime() {
        // 2023-11-14T22:13:20Z is 2023 in every timezone
        assert_eq!(format(1_700_000_000, "%Y"), "2023");
        assert_eq!(format(1_700_000_000, "year %Y%%"), "year 2023%");
    }

    #[test]
    fn empty_template_formats_to_nothing() {
        assert_eq!(format(0, ""), "");
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn overflow_is_fatal() {
        format(1_700_000_000, &"%Y".repeat(20));
    }

    #[test]
    fn default_templates_fit() {
        let s = format(1_700_000_000, "%A, %B %d");
        assert!(!s.is_empty() && s.len() < FORMAT_BUF);
        assert_eq!(format(1_700_000_000, "%T").len(), 8);
    }
}
