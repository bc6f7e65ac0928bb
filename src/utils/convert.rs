use chrono::DateTime;
use chrono::Utc;

/// Width of the timestamp prefix in a reading key
pub const TIMESTAMP_PREFIX_LEN: usize = 8;

pub const fn safe_kv(num: u64) -> [u8; TIMESTAMP_PREFIX_LEN] {
    num.to_be_bytes()
}

/// Big-endian millisecond prefix. Pre-epoch instants clamp to zero so byte
/// order always follows time order.
pub fn timestamp_to_key_prefix(ts: &DateTime<Utc>) -> [u8; TIMESTAMP_PREFIX_LEN] {
    safe_kv(ts.timestamp_millis().max(0) as u64)
}

/// `timestamp_ms (8 bytes, big-endian) ++ id`
///
/// Keys sort by timestamp first; the id suffix keeps readings that share a
/// millisecond distinct.
pub fn reading_key(
    ts: &DateTime<Utc>,
    id: &str,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(TIMESTAMP_PREFIX_LEN + id.len());
    key.extend_from_slice(&timestamp_to_key_prefix(ts));
    key.extend_from_slice(id.as_bytes());
    key
}

