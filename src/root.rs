//! The engine root: the fixed header at offset 0 of the backing
//! stream, naming the document-index chain, the path-trie chain, and
//! the free-list chain.

use crate::errors::{Result, StreamDbError};
use crate::link::VersionedLink;
use crate::storage::PagedStorage;
use crate::stream::BackingStream;

pub const MAGIC: [u8; 8] = [0x55, 0xAA, 0xFE, 0xED, 0xFA, 0xCE, 0xDA, 0x7A];

/// Bytes actually occupied by the header's meaningful content: the
/// magic number plus three 10-byte versioned links. `PagedStorage`'s
/// `HEADER_SIZE` may reserve more for padding/alignment.
pub const HEADER_BYTES_USED: usize = 8 + 3 * crate::link::ENCODED_LEN;

pub struct EngineRoot {
    pub index_chain: VersionedLink,
    pub path_trie_chain: VersionedLink,
    pub free_list_chain: VersionedLink,
}

impl EngineRoot {
    /// Opens or initialises the root header: a zero-length stream is
    /// initialised fresh; otherwise the magic number is verified.
    pub fn open(storage: &PagedStorage, stream: &mut dyn BackingStream) -> Result<Self> {
        let len = PagedStorage::stream_len(stream)?;
        if len == 0 {
            let root = Self {
                index_chain: VersionedLink::new(),
                path_trie_chain: VersionedLink::new(),
                free_list_chain: VersionedLink::new(),
            };
            root.persist(stream)?;
            log::debug!("engine root initialised on an empty stream");
            return Ok(root);
        }
        if len < crate::storage::HEADER_SIZE {
            return Err(StreamDbError::StreamTooShort);
        }
        let header = PagedStorage::read_header(stream, HEADER_BYTES_USED)?;
        if header[0..8] != MAGIC {
            return Err(StreamDbError::NotAStreamDb);
        }
        let index_chain = VersionedLink::decode(header[8..18].try_into().unwrap());
        let path_trie_chain = VersionedLink::decode(header[18..28].try_into().unwrap());
        let free_list_chain = VersionedLink::decode(header[28..38].try_into().unwrap());
        log::debug!("engine root opened from existing stream of {len} bytes");
        Ok(Self { index_chain, path_trie_chain, free_list_chain })
    }

    /// Writes the full header (magic + all three links, zero-padded out
    /// to `HEADER_SIZE`) back to the stream. Called after every
    /// root-link mutation while the caller still holds the stream lock.
    /// Writing the reserved width (not just the 38 bytes of meaningful
    /// content) keeps a freshly-initialised, never-mutated-again stream
    /// reopenable: `open`'s length check requires `HEADER_SIZE` bytes.
    pub fn persist(&self, stream: &mut dyn BackingStream) -> Result<()> {
        let mut bytes = vec![0u8; crate::storage::HEADER_SIZE as usize];
        bytes[0..8].copy_from_slice(&MAGIC);
        bytes[8..18].copy_from_slice(&self.index_chain.encode());
        bytes[18..28].copy_from_slice(&self.path_trie_chain.encode());
        bytes[28..38].copy_from_slice(&self.free_list_chain.encode());
        PagedStorage::write_header(stream, &bytes)
    }
}
