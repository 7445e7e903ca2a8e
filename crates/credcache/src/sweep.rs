//! Expiry sweeper
//!
//! Runs before every fetch. Removal always applies in memory; persisting it
//! is best effort and a failed save is logged, not returned.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::store::KeyStore;

/// Drop every record with `expires_at <= now` and persist the removal.
/// Returns the number of records removed.
pub fn sweep(store: &mut KeyStore, now: DateTime<Utc>) -> usize {
    let cutoff = now.timestamp_millis();
    let removed = store.remove_where(|r| r.expires_at <= cutoff);

    if removed > 0 {
        debug!(removed, "swept expired credentials");
        if let Err(e) = store.save() {
            error!(
                path = %store.path().display(),
                error = %e,
                "failed to persist expiry sweep, continuing in memory"
            );
        }
    }

    removed
}
