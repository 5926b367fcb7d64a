//! Page-chain streams: a chain of pages linked backwards via
//! `prev_page_id`, presented to callers as one logical forward byte
//! stream, plus the writer that lays a byte sequence out as a fresh
//! chain.

use std::io::{self, Read, Seek, SeekFrom};

use crate::errors::Result;
use crate::page::{Page, BODY_LEN, CHAIN_START};
use crate::storage::PagedStorage;
use crate::stream::BackingStream;

/// Writes `reader`'s remaining bytes as a new page chain, returning the
/// end page id. Holds the caller's stream lock for the whole operation.
/// `free_list` is the engine root's free-list link, drained first
/// before the stream is extended with fresh pages.
pub fn write_stream(
    storage: &PagedStorage,
    stream: &mut dyn BackingStream,
    free_list: &crate::link::VersionedLink,
    reader: &mut dyn Read,
) -> Result<i32> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let n = bytes.len().div_ceil(BODY_LEN).max(1);
    let ids = crate::freelist::allocate_ids(storage, stream, free_list, n)?;

    let mut prev = CHAIN_START;
    for (i, id) in ids.iter().enumerate() {
        let start = i * BODY_LEN;
        let end = (start + BODY_LEN).min(bytes.len());
        let mut page = Page::empty(*id);
        page.fill(&bytes[start..end]);
        page.prev_page_id = prev;
        storage.commit_page(stream, &page)?;
        prev = *id;
    }
    log::debug!("wrote stream of {} bytes across {n} pages, end id {}", bytes.len(), ids[n - 1]);
    Ok(ids[n - 1])
}

/// A read-only, seekable view over the logical bytes of a page chain.
pub struct ChainReader {
    pages: Vec<Page>,
    page_starts: Vec<u64>,
    total_len: u64,
    pos: u64,
}

impl ChainReader {
    /// Walks backwards from `end_id`, validating CRCs, and reverses the
    /// result into forward order.
    pub fn open(storage: &PagedStorage, stream: &mut dyn BackingStream, end_id: i32) -> Result<Self> {
        let mut pages = Vec::new();
        let mut current = end_id;
        loop {
            let page = storage.read_page(stream, current)?;
            let prev = page.prev_page_id;
            pages.push(page);
            if prev == CHAIN_START {
                break;
            }
            current = prev;
        }
        pages.reverse();

        let mut page_starts = Vec::with_capacity(pages.len());
        let mut total_len = 0u64;
        for page in &pages {
            page_starts.push(total_len);
            total_len += page.data_length as u64;
        }

        Ok(Self { pages, page_starts, total_len, pos: 0 })
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.total_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    fn locate(&self, pos: u64) -> Option<(usize, usize)> {
        if pos >= self.total_len {
            return None;
        }
        let page_index = (pos / BODY_LEN as u64) as usize;
        let offset_in_page = (pos % BODY_LEN as u64) as usize;
        Some((page_index, offset_in_page))
    }
}

impl Read for ChainReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some((mut page_index, mut offset)) = self.locate(self.pos) else {
            return Ok(0);
        };
        let mut written = 0;
        while written < buf.len() && page_index < self.pages.len() {
            let page = &self.pages[page_index];
            let available = page.data()[offset..].len();
            if available == 0 {
                page_index += 1;
                offset = 0;
                continue;
            }
            let take = available.min(buf.len() - written);
            buf[written..written + take].copy_from_slice(&page.data()[offset..offset + take]);
            written += take;
            offset += take;
            self.pos += take as u64;
        }
        Ok(written)
    }
}

impl Seek for ChainReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => self.total_len as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}
