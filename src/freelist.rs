//! The free-list: an on-disk stack of released page ids,
//! itself stored as a page chain rooted at the engine root's third
//! versioned link. Each page's body is an array of `i32` entries:
//! entry 0 is the live count `n`, entries `1..=n` are released ids.
//!
//! `release_single` always extends backwards rather than compacting:
//! once the chain start is reached and is full, the page being
//! released becomes the new start. `reassign_released` mirrors this on
//! the way out, reclaiming an emptied non-head page as a reassignable
//! id in its own right.

use std::collections::HashSet;

use crate::errors::{Result, StreamDbError};
use crate::link::{Revision, VersionedLink};
use crate::page::{Page, BODY_LEN, CHAIN_START};
use crate::storage::PagedStorage;
use crate::stream::BackingStream;

const ENTRY_BYTES: usize = 4;
const MAX_ENTRIES: usize = BODY_LEN / ENTRY_BYTES - 1;

/// Reserved ids that must never be pushed onto the free-list.
fn is_reserved(page_id: i32) -> bool {
    (0..3).contains(&page_id)
}

fn read_count(page: &Page) -> i32 {
    i32::from_be_bytes(page.body[0..4].try_into().unwrap())
}

fn write_count(page: &mut Page, count: i32) {
    page.body[0..4].copy_from_slice(&count.to_be_bytes());
    let used_bytes = ENTRY_BYTES * (1 + count.max(0) as usize);
    page.data_length = used_bytes as i32;
}

fn read_entry(page: &Page, index: i32) -> i32 {
    let start = index as usize * ENTRY_BYTES;
    i32::from_be_bytes(page.body[start..start + ENTRY_BYTES].try_into().unwrap())
}

fn write_entry(page: &mut Page, index: i32, value: i32) {
    let start = index as usize * ENTRY_BYTES;
    page.body[start..start + ENTRY_BYTES].copy_from_slice(&value.to_be_bytes());
}

/// Releases one page id onto the free-list chain rooted at `link`.
pub fn release_single(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    link: &VersionedLink,
    page_id: i32,
) -> Result<()> {
    if is_reserved(page_id) {
        return Ok(());
    }

    let Some(mut head_id) = link.try_get(Revision::Newest) else {
        // Establishing the free-list costs exactly one dedicated
        // bookkeeping page, allocated directly (bypassing reuse, since
        // there is no free-list yet to reuse from). `page_id` itself is
        // not spent on infrastructure — it becomes this head's first
        // entry, same as any other push, so it stays reassignable.
        let new_head = storage.allocate_block(stream, &[], 1)?[0];
        let mut head = Page::empty(new_head);
        head.prev_page_id = CHAIN_START;
        write_entry(&mut head, 1, page_id);
        write_count(&mut head, 1);
        storage.commit_page(stream, &head)?;
        link.write_new(new_head);
        log::debug!("free-list initialised with bookkeeping page {new_head}, first entry {page_id}");
        return Ok(());
    };

    loop {
        let mut page = storage.read_page(stream, head_id)?;
        let count = read_count(&page);
        if count < MAX_ENTRIES as i32 {
            write_entry(&mut page, count + 1, page_id);
            write_count(&mut page, count + 1);
            storage.commit_page(stream, &page)?;
            log::debug!("page {page_id} pushed onto free-list page {head_id}");
            return Ok(());
        }
        if page.prev_page_id == CHAIN_START {
            let mut released = Page::empty(page_id);
            released.prev_page_id = CHAIN_START;
            write_count(&mut released, 0);
            storage.commit_page(stream, &released)?;
            // `page` is the chain's absolute start; splice the newly
            // released page in behind it. The chain's head (the link
            // itself) is untouched — we only extended its oldest end,
            // so every already-full page between the head and the old
            // start stays reachable.
            page.prev_page_id = page_id;
            storage.commit_page(stream, &page)?;
            log::debug!("free-list extended backwards with page {page_id}");
            return Ok(());
        }
        head_id = page.prev_page_id;
    }
}

/// Releases every page in the chain ending at `end_id`, following
/// `prev_page_id` back to the start. Detects cycles with an in-memory
/// visited set.
pub fn release_chain(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    link: &VersionedLink,
    end_id: i32,
) -> Result<()> {
    let mut visited = HashSet::new();
    let mut current = end_id;
    loop {
        if !visited.insert(current) {
            return Err(StreamDbError::ChainCycle { end_id, at_id: current });
        }
        let page = storage.read_page(stream, current)?;
        let prev = page.prev_page_id;
        release_single(storage, stream, link, current)?;
        if prev == CHAIN_START {
            return Ok(());
        }
        current = prev;
    }
}

/// Allocates `n` page ids, draining the free-list first and extending
/// the stream for the rest. Combines [`reassign_released`] with
/// [`PagedStorage::allocate_block`] the way every engine-level caller
/// needs to.
pub fn allocate_ids(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    link: &VersionedLink,
    n: usize,
) -> Result<Vec<i32>> {
    let mut block = vec![0i32; n];
    let filled = reassign_released(storage, stream, link, &mut block)?;
    block.truncate(filled);
    storage.allocate_block(stream, &block, n)
}

/// Fills `block` (a slice of page-id slots to populate) from the
/// free-list, walking from its oldest end towards the head. Returns the
/// number of slots filled; the remainder must be satisfied by
/// extending the stream.
pub fn reassign_released(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    link: &VersionedLink,
    block: &mut [i32],
) -> Result<usize> {
    if block.is_empty() {
        return Ok(0);
    }
    let Some(head_id) = link.try_get(Revision::Newest) else {
        return Ok(0);
    };

    let chain = oldest_first_chain(storage, stream, head_id)?;
    let mut filled = 0;
    let mut index = 0usize;

    while filled < block.len() && index < chain.len() {
        let current_id = chain[index];
        let mut page = storage.read_page(stream, current_id)?;
        let count = read_count(&page);

        if count == 0 {
            if current_id == head_id {
                break;
            }
            block[filled] = current_id;
            filled += 1;
            let succ_id = chain[index + 1];
            let mut succ = storage.read_page(stream, succ_id)?;
            succ.prev_page_id = CHAIN_START;
            storage.commit_page(stream, &succ)?;
            index += 1;
            continue;
        }

        let value = read_entry(&page, count);
        write_count(&mut page, count - 1);
        storage.commit_page(stream, &page)?;
        block[filled] = value;
        filled += 1;
    }

    log::debug!("reassigned {filled} page ids from free-list");
    Ok(filled)
}

/// Walks the free-list chain from `head_id` backwards, returning page
/// ids in oldest-first order.
fn oldest_first_chain(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    head_id: i32,
) -> Result<Vec<i32>> {
    let mut ids = Vec::new();
    let mut visited = HashSet::new();
    let mut current = head_id;
    loop {
        if !visited.insert(current) {
            return Err(StreamDbError::ChainCycle { end_id: head_id, at_id: current });
        }
        ids.push(current);
        let page = storage.read_page(stream, current)?;
        if page.prev_page_id == CHAIN_START {
            break;
        }
        current = page.prev_page_id;
    }
    ids.reverse();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::storage::HEADER_SIZE;

    fn setup() -> (PagedStorage, VersionedLink) {
        (PagedStorage::new(Box::new(Cursor::new(vec![0u8; HEADER_SIZE as usize]))), VersionedLink::new())
    }

    #[test]
    fn reserved_ids_are_never_released() {
        let (storage, link) = setup();
        let mut stream = storage.lock();
        release_single(&storage, &mut **stream, &link, 0).unwrap();
        assert_eq!(link.try_get(Revision::Newest), None);
    }

    #[test]
    fn release_then_reassign_round_trips_a_single_id() {
        let (storage, link) = setup();
        let mut stream = storage.lock();
        let ids = storage.allocate_block(&mut **stream, &[], 1).unwrap();
        release_single(&storage, &mut **stream, &link, ids[0]).unwrap();

        let mut block = [0i32; 1];
        let filled = reassign_released(&storage, &mut **stream, &link, &mut block).unwrap();
        assert_eq!(filled, 1);
        assert_eq!(block[0], ids[0]);
    }

    #[test]
    fn release_many_then_reassign_all_preserves_ids() {
        let (storage, link) = setup();
        let mut stream = storage.lock();
        let ids = storage.allocate_block(&mut **stream, &[], 50).unwrap();
        for &id in &ids {
            release_single(&storage, &mut **stream, &link, id).unwrap();
        }
        let mut block = vec![0i32; 50];
        let filled = reassign_released(&storage, &mut **stream, &link, &mut block).unwrap();
        assert_eq!(filled, 50);
        let mut expected = ids.clone();
        expected.sort_unstable();
        let mut got = block.clone();
        got.sort_unstable();
        assert_eq!(expected, got);
    }

    #[test]
    fn release_spanning_multiple_full_pages_preserves_every_id() {
        // Push past a single page's capacity so release_single must
        // extend the free-list chain backwards at least once, exercising
        // the multi-page splice rather than the single-page fast path.
        let (storage, link) = setup();
        let mut stream = storage.lock();
        let count = MAX_ENTRIES + 25;
        let ids = storage.allocate_block(&mut **stream, &[], count).unwrap();
        for &id in &ids {
            release_single(&storage, &mut **stream, &link, id).unwrap();
        }
        let mut block = vec![0i32; count];
        let filled = reassign_released(&storage, &mut **stream, &link, &mut block).unwrap();
        assert_eq!(filled, count);
        let mut expected = ids.clone();
        expected.sort_unstable();
        let mut got = block.clone();
        got.sort_unstable();
        assert_eq!(expected, got);
    }

    #[test]
    fn release_chain_detects_cycles() {
        let (storage, link) = setup();
        let mut stream = storage.lock();
        let ids = storage.allocate_block(&mut **stream, &[], 2).unwrap();
        let mut p0 = storage.read_page(&mut **stream, ids[0]).unwrap();
        p0.prev_page_id = ids[1];
        storage.commit_page(&mut **stream, &p0).unwrap();
        let mut p1 = storage.read_page(&mut **stream, ids[1]).unwrap();
        p1.prev_page_id = ids[0];
        storage.commit_page(&mut **stream, &p1).unwrap();

        let result = release_chain(&storage, &mut **stream, &link, ids[0]);
        assert!(matches!(result, Err(StreamDbError::ChainCycle { .. })));
    }

    #[test]
    fn reassign_on_empty_free_list_fills_nothing() {
        let (storage, link) = setup();
        let mut stream = storage.lock();
        let mut block = [0i32; 4];
        let filled = reassign_released(&storage, &mut **stream, &link, &mut block).unwrap();
        assert_eq!(filled, 0);
    }
}
