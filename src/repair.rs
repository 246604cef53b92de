//! Title repair
//!
//! Older runs stored titles with HTML entities left encoded (`&amp;`,
//! `&#39;`). This pass decodes them in place. It is idempotent: a second run
//! finds nothing to change.

use crate::crawler::decode_entities;
use crate::storage::{BookStore, StorageResult};

/// Decodes entity-encoded titles in the store
///
/// Returns the number of titles rewritten.
pub fn repair_titles(store: &dyn BookStore) -> StorageResult<usize> {
    let candidates = store.titles_with_entities()?;
    tracing::info!("{} stored titles contain entities", candidates.len());

    let mut repaired = 0;
    for (book_id, title) in candidates {
        let decoded = decode_entities(&title);
        if decoded == title {
            continue;
        }

        tracing::debug!("Book {}: '{}' -> '{}'", book_id, title, decoded);
        store.update_book_title(book_id, &decoded)?;
        repaired += 1;
    }

    Ok(repaired)
}
