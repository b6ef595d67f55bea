//! Deterministic, idempotent merge of a sorted snapshot with an incoming
//! change batch.

use std::cmp::Ordering;
use std::collections::HashMap;

use eddy_types::{DeliveryStatus, Message};

/// Canonical total order for one room's messages.
///
/// Confirmed entries order by `seq` ascending; unconfirmed entries order
/// among themselves by `created_at` ascending and sort after every
/// confirmed entry. Remaining ties break on `id`, lexically, so the order
/// is deterministic for any input.
///
/// The class split must not consult the wall clock: seq is the
/// authoritative ordering unit and may disagree with `created_at` (clock
/// skew, edits), and mixing the two keys would make the relation cyclic —
/// not a total order — so sorting could reorder confirmed entries or
/// panic. A pending message is the newest thing in the room by
/// construction, so placing the pending class last loses nothing.
pub fn canonical_cmp(a: &Message, b: &Message) -> Ordering {
    let primary = match (a.seq, b.seq) {
        (Some(sa), Some(sb)) => sa.cmp(&sb),
        (None, None) => a.created_at.cmp(&b.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Fold one incoming batch into an existing snapshot.
///
/// Pure and total: never mutates its inputs, never fails for well-formed
/// input, and re-applying an already-applied batch is a no-op
/// (`merge(merge(s, b), b) == merge(s, b)`).
///
/// Remote data wins over an optimistic placeholder holding the same id,
/// with one exception: a locally-set `Failed` status survives unless the
/// incoming copy is itself a confirmed (seq-carrying) write. Absence of an
/// id from the batch never removes anything — deletions are explicit.
/// Duplicate ids inside one batch: the later occurrence wins.
pub fn merge(existing: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = existing.to_vec();
    let mut index: HashMap<&str, usize> =
        existing.iter().enumerate().map(|(i, m)| (m.id.as_str(), i)).collect();

    for item in incoming {
        match index.get(item.id.as_str()) {
            Some(&i) => {
                let current = &merged[i];
                if current.status == DeliveryStatus::Failed && !item.is_confirmed() {
                    continue;
                }
                merged[i] = item.clone();
            }
            None => {
                merged.push(item.clone());
                // Safe to borrow the id from `incoming`: later duplicates in
                // the same batch must hit the overwrite arm.
                index.insert(item.id.as_str(), merged.len() - 1);
            }
        }
    }

    merged.sort_by(canonical_cmp);
    merged
}
