//! Deploy revision markers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_REV: AtomicU64 = AtomicU64::new(0);

/// A fresh deploy revision: nanoseconds since the epoch, zero-padded so
/// revisions also sort lexically. Strictly increasing within a process.
pub fn next_deploy_rev() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mut last = LAST_REV.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_REV.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return format!("{next:020}"),
            Err(actual) => last = actual,
        }
    }
}
