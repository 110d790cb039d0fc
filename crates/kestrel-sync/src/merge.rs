//! Reconciling a freshly fetched window with the resident sequence.
//!
//! Both sequences are newest first. The merge is append-only at the head:
//! confirmed entries already resident are never reordered, replaced or
//! dropped, which keeps repeated ticks over the same window idempotent.

use kestrel_types::models::MessageEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The resident sequence holds no confirmed entry to anchor on.
    NoAnchor,
    /// The anchor is not inside the fetched window; nothing merged.
    AnchorMissing,
    /// Nothing newer than the anchor was fetched.
    UpToDate,
    /// `added` fetched entries now precede the anchor. `superseded`
    /// provisional entries that sat ahead of it were replaced.
    Merged { added: usize, superseded: usize },
}

impl MergeOutcome {
    pub fn added(&self) -> usize {
        match self {
            Self::Merged { added, .. } => *added,
            _ => 0,
        }
    }
}

/// Merge `updated` into `current` in place.
///
/// The anchor is the newest non-pending entry of `current`. Every entry of
/// `updated` strictly newer than the anchor's position in `updated` is
/// spliced in ahead of `current[anchor..]`, which is kept verbatim. If the
/// anchor is absent from `updated`, `current` is left alone: the window may
/// have moved past it and replacing the tail would lose entries.
pub fn merge_window(current: &mut Vec<MessageEntry>, updated: Vec<MessageEntry>) -> MergeOutcome {
    let Some(anchor) = current.iter().position(|m| !m.is_pending()) else {
        return MergeOutcome::NoAnchor;
    };
    let anchor_ts = current[anchor].timestamp_nanos;

    let Some(pos) = updated.iter().position(|m| m.timestamp_nanos == anchor_ts) else {
        return MergeOutcome::AnchorMissing;
    };
    if pos == 0 {
        return MergeOutcome::UpToDate;
    }

    let tail = current.split_off(anchor);
    let superseded = current.len();
    let mut merged: Vec<MessageEntry> = updated.into_iter().take(pos).collect();
    merged.extend(tail);
    *current = merged;

    MergeOutcome::Merged {
        added: pos,
        superseded,
    }
}

/// Install a freshly loaded window as the resident sequence, keeping any
/// provisional entry newer than the window's head.
pub fn replace_window(current: &mut Vec<MessageEntry>, fetched: Vec<MessageEntry>) {
    let head = fetched.first().map(|m| m.timestamp_nanos);
    let mut window: Vec<MessageEntry> = current
        .drain(..)
        .filter(|m| m.is_pending() && head.is_none_or(|ts| m.timestamp_nanos > ts))
        .collect();
    window.extend(fetched);
    *current = window;
}

/// Newest first with strictly decreasing timestamps.
pub fn is_strictly_newest_first(messages: &[MessageEntry]) -> bool {
    messages
        .windows(2)
        .all(|pair| pair[0].timestamp_nanos > pair[1].timestamp_nanos)
}
