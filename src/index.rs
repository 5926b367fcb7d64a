//! The document index: an append-only chain of pages,
//! each holding an implicit binary search tree of 126 `(doc_id, link)`
//! entries keyed by [`SerialId`] order with an unstored `NEUTRAL` root.

use std::cmp::Ordering;

use crate::errors::Result;
use crate::link::{Revision, VersionedLink};
use crate::page::{Page, CHAIN_START};
use crate::serial::SerialId;
use crate::storage::PagedStorage;
use crate::stream::BackingStream;

pub const ENTRIES_PER_PAGE: usize = 126;
const ENTRY_LEN: usize = 16 + crate::link::ENCODED_LEN;
const USED_BYTES: usize = ENTRIES_PER_PAGE * ENTRY_LEN;

/// One page's worth of the implicit tree: 126 `(doc_id, link)` slots.
/// An entry with `doc_id == SerialId::ZERO` is empty.
pub struct IndexPage {
    pub page_id: i32,
    pub prev_page_id: i32,
    entries: Vec<(SerialId, VersionedLink)>,
}

impl IndexPage {
    #[must_use]
    pub fn empty(page_id: i32) -> Self {
        let entries = (0..ENTRIES_PER_PAGE).map(|_| (SerialId::ZERO, VersionedLink::new())).collect();
        Self { page_id, prev_page_id: CHAIN_START, entries }
    }

    #[must_use]
    pub fn decode(page: &Page) -> Self {
        let mut entries = Vec::with_capacity(ENTRIES_PER_PAGE);
        for i in 0..ENTRIES_PER_PAGE {
            let start = i * ENTRY_LEN;
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(&page.body[start..start + 16]);
            let mut link_bytes = [0u8; crate::link::ENCODED_LEN];
            link_bytes.copy_from_slice(&page.body[start + 16..start + ENTRY_LEN]);
            entries.push((SerialId::from_bytes(id_bytes), VersionedLink::decode(&link_bytes)));
        }
        Self { page_id: page.page_id, prev_page_id: page.prev_page_id, entries }
    }

    #[must_use]
    pub fn encode(&self) -> Page {
        let mut page = Page::empty(self.page_id);
        page.prev_page_id = self.prev_page_id;
        for (i, (doc_id, link)) in self.entries.iter().enumerate() {
            let start = i * ENTRY_LEN;
            page.body[start..start + 16].copy_from_slice(doc_id.as_bytes());
            page.body[start + 16..start + ENTRY_LEN].copy_from_slice(&link.encode());
        }
        page.data_length = USED_BYTES as i32;
        page
    }

    /// Per-page implicit-tree search. Returns the index
    /// of a matching entry, the index of an empty slot where `key`
    /// could be inserted, or `-1` if the walk ran off the tree.
    ///
    /// # Panics
    /// Panics after 7 iterations without resolving — an invariant the
    /// fixed 126-entry, depth-7 layout guarantees cannot happen.
    #[must_use]
    pub fn find(&self, key: SerialId) -> i32 {
        let mut cmp = SerialId::NEUTRAL;
        let mut left = 0i32;
        let mut right = 1i32;
        let mut current = -1i32;
        for _ in 0..7 {
            current = match cmp.cmp(&key) {
                Ordering::Equal => return current,
                Ordering::Less => left,
                Ordering::Greater => right,
            };
            left = 2 * current + 2;
            right = 2 * current + 3;
            if current >= ENTRIES_PER_PAGE as i32 {
                return -1;
            }
            let (entry_id, _) = &self.entries[current as usize];
            if *entry_id == SerialId::ZERO {
                return current;
            }
            cmp = *entry_id;
        }
        unreachable!("index page find exceeded the fixed depth-7 bound");
    }

    fn entry(&self, index: i32) -> &(SerialId, VersionedLink) {
        &self.entries[index as usize]
    }

    fn set_entry(&mut self, index: i32, doc_id: SerialId, link: VersionedLink) {
        self.entries[index as usize] = (doc_id, link);
    }
}

fn next_page(storage: &PagedStorage, stream: &mut dyn BackingStream, current: i32) -> Result<Option<i32>> {
    let page = storage.read_page(stream, current)?;
    Ok(if page.prev_page_id == CHAIN_START { None } else { Some(page.prev_page_id) })
}

/// Binds `doc_id` to `page_id`, returning the displaced page id from
/// the versioned link that got updated, or `-1` if none.
pub fn bind_document(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    index_link: &VersionedLink,
    free_list_link: &VersionedLink,
    doc_id: SerialId,
    page_id: i32,
) -> Result<i32> {
    // Pass 1: existing entry anywhere in the chain gets updated in place.
    let mut current = index_link.try_get(Revision::Newest);
    while let Some(id) = current {
        let page = storage.read_page(stream, id)?;
        let mut index_page = IndexPage::decode(&page);
        let slot = index_page.find(doc_id);
        if slot >= 0 && index_page.entry(slot).0 == doc_id {
            let expired = index_page.entry(slot).1.write_new(page_id);
            storage.commit_page(stream, &index_page.encode())?;
            return Ok(expired);
        }
        current = next_page(storage, stream, id)?;
    }

    // Pass 2: first page along the chain with a free slot for this key.
    let mut current = index_link.try_get(Revision::Newest);
    while let Some(id) = current {
        let page = storage.read_page(stream, id)?;
        let mut index_page = IndexPage::decode(&page);
        let slot = index_page.find(doc_id);
        if slot >= 0 {
            let link = VersionedLink::new();
            link.write_new(page_id);
            index_page.set_entry(slot, doc_id, link);
            storage.commit_page(stream, &index_page.encode())?;
            return Ok(-1);
        }
        current = next_page(storage, stream, id)?;
    }

    // Pass 3: no room anywhere, allocate a fresh page and extend the chain.
    let prior_head = index_link.try_get(Revision::Newest);
    let new_ids = crate::freelist::allocate_ids(storage, stream, free_list_link, 1)?;
    let new_id = new_ids[0];
    let mut index_page = IndexPage::empty(new_id);
    index_page.prev_page_id = prior_head.unwrap_or(CHAIN_START);
    let slot = index_page.find(doc_id);
    debug_assert!(slot >= 0, "a freshly allocated index page always has room for the first entry");
    let link = VersionedLink::new();
    link.write_new(page_id);
    index_page.set_entry(slot, doc_id, link);
    storage.commit_page(stream, &index_page.encode())?;
    // The chain is append-only: any displaced value from this write is
    // never freed.
    index_link.write_new(new_id);
    Ok(-1)
}

/// Looks up the newest page id bound to `doc_id`, walking the chain
/// from the head and skipping to the previous page on a tree miss or
/// an unresolved gap.
pub fn lookup_document(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    index_link: &VersionedLink,
    doc_id: SerialId,
) -> Result<Option<i32>> {
    let mut current = index_link.try_get(Revision::Newest);
    while let Some(id) = current {
        let page = storage.read_page(stream, id)?;
        let index_page = IndexPage::decode(&page);
        let slot = index_page.find(doc_id);
        if slot >= 0 {
            let (entry_id, link) = index_page.entry(slot);
            if *entry_id == doc_id {
                if let Some(target) = link.try_get(Revision::Newest) {
                    return Ok(Some(target));
                }
            }
        }
        current = next_page(storage, stream, id)?;
    }
    Ok(None)
}

/// Clears (without shrinking) the first matching entry's link,
/// resetting both its slots to uninitialised.
pub fn remove_document(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    index_link: &VersionedLink,
    doc_id: SerialId,
) -> Result<bool> {
    let mut current = index_link.try_get(Revision::Newest);
    while let Some(id) = current {
        let page = storage.read_page(stream, id)?;
        let mut index_page = IndexPage::decode(&page);
        let slot = index_page.find(doc_id);
        if slot >= 0 && index_page.entry(slot).0 == doc_id {
            index_page.set_entry(slot, doc_id, VersionedLink::new());
            storage.commit_page(stream, &index_page.encode())?;
            return Ok(true);
        }
        current = next_page(storage, stream, id)?;
    }
    Ok(false)
}
