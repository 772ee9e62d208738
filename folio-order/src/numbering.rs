use chrono::{DateTime, Utc};
use rand::Rng;

/// Produces candidate order numbers. Uniqueness is enforced by the store.
pub trait OrderNumberSource: Send + Sync {
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String;
}

/// `PREFIX` + `yyMMddHHmm` + random suffix in 10..=99
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampNumbers;

impl OrderNumberSource for TimestampNumbers {
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let suffix: u8 = rand::thread_rng().gen_range(10..=99);
        format_order_number(prefix, now, suffix)
    }
}

pub fn format_order_number(prefix: &str, now: DateTime<Utc>, suffix: u8) -> String {
    format!("{}{}{}", prefix, now.format("%y%m%d%H%M"), suffix)
}
