use chrono::{DateTime, Utc};

/// What a single target tracker should do with a change reported by
/// another source (§4.7 "source-of-truth rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// The source is strictly newer than the target (or the target has
    /// never been synced) — push the change.
    Propagate,
    /// The target is strictly newer — it will win when it next reports its
    /// own change, so leave it alone this round.
    Skip,
}

/// Decide whether `source`'s reported timestamp should overwrite a target
/// whose own last-known modification time is `target_modified_at` (`None`
/// if the target has no counterpart yet). Ties favor the source that
/// produced the current event (§4.7: "ties favor the source that produced
/// the current event").
pub fn decide(source_modified_at: DateTime<Utc>, target_modified_at: Option<DateTime<Utc>>) -> SyncDirection {
    match target_modified_at {
        None => SyncDirection::Propagate,
        Some(target) if target > source_modified_at => SyncDirection::Skip,
        Some(_) => SyncDirection::Propagate,
    }
}
