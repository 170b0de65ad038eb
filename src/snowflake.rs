use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// Aura epoch: 2025-01-01T00:00:00Z
const EPOCH: u64 = 1_735_689_600_000;
const SEQUENCE_BITS: u32 = 22;

/// (last timestamp, next sequence)
static CLOCK: Mutex<(u64, u64)> = Mutex::new((0, 0));

/// Identifier of one control-channel connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH)
        .saturating_sub(EPOCH)
}

/// Time-ordered id: milliseconds since the aura epoch, then 22 bits of sequence.
pub fn next_connection_id() -> ConnectionId {
    let mut clock = CLOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (last, seq) = *clock;
    let now = now_ms();

    let (timestamp, seq) = if now > last {
        (now, 0)
    } else if seq < (1 << SEQUENCE_BITS) {
        (last, seq)
    } else {
        // Sequence overflow, borrow the next millisecond
        (last + 1, 0)
    };

    *clock = (timestamp, seq + 1);
    ConnectionId((timestamp << SEQUENCE_BITS) | seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_unique_ids() {
        let a = next_connection_id();
        let b = next_connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_numeric() {
        let id = next_connection_id();
        assert_eq!(id.to_string().parse::<u64>().unwrap(), id.as_u64());
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| next_connection_id()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<ConnectionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total, "connection ids must never repeat");
    }
}
