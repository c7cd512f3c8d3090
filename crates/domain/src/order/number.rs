//! Human-readable order numbers.

use chrono::{DateTime, Utc};
use rand::Rng;

/// `ORD-` followed by the last eight digits of the millisecond timestamp and
/// three random digits.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(100_000_000);
    let suffix: u32 = rand::rng().random_range(0..1000);
    format!("ORD-{millis:08}{suffix:03}")
}
