//! Identifier generation.
//!
//! Injected into the merge engine so a merge is reproducible in tests.

use rand::Rng;

pub trait IdGenerator {
    /// Produce a fresh identifier. Callers check it against ids in use and ask
    /// again on collision.
    fn next_id(&mut self, prefix: &str) -> String;
}

/// Production ids: `<prefix>-<base36 ms timestamp>-<base36 random suffix>`.
#[derive(Debug, Default)]
pub struct TimestampIds;

impl IdGenerator for TimestampIds {
    fn next_id(&mut self, prefix: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let suffix: u64 = rand::thread_rng().gen_range(0..36u64.pow(6));
        format!("{prefix}-{}-{:0>6}", to_base36(millis), to_base36(suffix))
    }
}

/// Deterministic ids: `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let mut ids = SequentialIds::new();
        assert_eq!(ids.next_id("space"), "space-1");
        assert_eq!(ids.next_id("dock"), "dock-2");
    }

    #[test]
    fn test_timestamp_ids_shape() {
        let mut ids = TimestampIds;
        let id = ids.next_id("sticker");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sticker");
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
