use crate::models::make_temp_id;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

static FALLBACK: AtomicU64 = AtomicU64::new(1);

pub(crate) fn random_u64() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        // Uniqueness within one page is all temp ids need.
        Err(_) => FALLBACK.fetch_add(1, Ordering::Relaxed),
    }
}

/// Fresh id for an optimistic placeholder.
pub(crate) fn new_temp_id() -> String {
    make_temp_id(now_ms().max(0) as u64, random_u64() % 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::is_temp_id;

    #[test]
    fn test_new_temp_ids_are_distinct() {
        let a = new_temp_id();
        let b = new_temp_id();
        assert!(is_temp_id(&a));
        assert!(is_temp_id(&b));
        assert_ne!(a, b);
    }
}
