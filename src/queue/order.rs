/*!
 * Queue Ordering
 *
 * Prefixed entries first, ascending by key; the rest by filename. Ties fall
 * back to modification time, then filename, then full path, so the order is
 * total.
 */

use super::types::QueueEntry;
use std::cmp::Ordering;

pub fn compare(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    let primary = match (a.key, b.key) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name.cmp(&b.file_name),
    };
    primary
        .then_with(|| a.modified.cmp(&b.modified))
        .then_with(|| a.file_name.cmp(&b.file_name))
        .then_with(|| a.path.cmp(&b.path))
}

pub fn sort_entries(entries: &mut [QueueEntry]) {
    entries.sort_by(compare);
}
