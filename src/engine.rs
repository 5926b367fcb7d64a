//! The engine façade: the crate's only public entry point. Every
//! mutating method here acquires the storage-wide stream lock for its
//! whole critical section and flushes before releasing it.

use std::io::Read;

use crate::chain::{self, ChainReader};
use crate::errors::{Result, StreamDbError};
use crate::index;
use crate::page::CHAIN_START;
use crate::root::EngineRoot;
use crate::serial::SerialId;
use crate::storage::PagedStorage;
use crate::stream::BackingStream;
use crate::trie::PathTrie;

pub struct Engine {
    storage: PagedStorage,
    root: EngineRoot,
}

impl Engine {
    /// Opens (or initialises, for an empty stream) an engine over
    /// `stream`.
    pub fn new(stream: Box<dyn BackingStream>) -> Result<Self> {
        let storage = PagedStorage::new(stream);
        let root = {
            let mut locked = storage.lock();
            EngineRoot::open(&storage, &mut **locked)?
        };
        Ok(Self { storage, root })
    }

    /// Skip CRC validation on page reads for the lifetime of this
    /// engine instance. Never affects writes.
    pub fn set_quick_mode(&self, enabled: bool) {
        self.storage.set_quick_mode(enabled);
    }

    /// Binds `doc_id` to `page_id` in the document index, returning the
    /// page id displaced from the versioned link that was updated, or
    /// `-1` if none.
    pub fn bind_index(&self, doc_id: SerialId, page_id: i32) -> Result<i32> {
        if page_id < 0 {
            return Err(StreamDbError::InvalidArgument(format!("negative page id {page_id}")));
        }
        let mut stream = self.storage.lock();
        let expired = index::bind_document(
            &self.storage,
            &mut **stream,
            &self.root.index_chain,
            &self.root.free_list_chain,
            doc_id,
            page_id,
        )?;
        self.root.persist(&mut **stream)?;
        Ok(expired)
    }

    /// Removes `doc_id`'s document-index entry, if any. Does not
    /// shrink the chain.
    pub fn unbind_index(&self, doc_id: SerialId) -> Result<bool> {
        let mut stream = self.storage.lock();
        let removed = index::remove_document(&self.storage, &mut **stream, &self.root.index_chain, doc_id)?;
        self.root.persist(&mut **stream)?;
        Ok(removed)
    }

    /// The newest page id bound to `doc_id`, or `None` if unbound.
    pub fn get_document_head(&self, doc_id: SerialId) -> Result<Option<i32>> {
        let mut stream = self.storage.lock();
        index::lookup_document(&self.storage, &mut **stream, &self.root.index_chain, doc_id)
    }

    fn load_path_trie(&self, stream: &mut dyn BackingStream) -> Result<PathTrie> {
        let Some(end_id) = self.root.path_trie_chain.try_get(crate::link::Revision::Newest) else {
            return Ok(PathTrie::new());
        };
        let mut reader = ChainReader::open(&self.storage, stream, end_id)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        PathTrie::decode(&bytes)
    }

    /// Binds `path` to `doc_id` in the path trie: loads the trie,
    /// inserts, re-serialises it as a brand-new chain, and retires the
    /// previous chain.
    pub fn bind_path(&self, path: &str, doc_id: SerialId) -> Result<Option<SerialId>> {
        if path.is_empty() {
            return Err(StreamDbError::InvalidArgument("path must not be empty".into()));
        }
        let mut stream = self.storage.lock();
        let mut trie = self.load_path_trie(&mut **stream)?;
        let previous = trie.add(path, doc_id);
        let encoded = trie.encode();
        let new_end_id =
            chain::write_stream(&self.storage, &mut **stream, &self.root.free_list_chain, &mut &encoded[..])?;
        let displaced = self.root.path_trie_chain.write_new(new_end_id);
        if displaced != CHAIN_START {
            crate::freelist::release_chain(&self.storage, &mut **stream, &self.root.free_list_chain, displaced)?;
        }
        self.root.persist(&mut **stream)?;
        Ok(previous)
    }

    /// Symmetric to [`Engine::bind_path`]: deletes, rewrites, releases.
    /// A no-op if no trie has ever been written.
    pub fn unbind_path(&self, path: &str) -> Result<Option<SerialId>> {
        if path.is_empty() {
            return Err(StreamDbError::InvalidArgument("path must not be empty".into()));
        }
        let mut stream = self.storage.lock();
        if self.root.path_trie_chain.try_get(crate::link::Revision::Newest).is_none() {
            return Ok(None);
        }
        let mut trie = self.load_path_trie(&mut **stream)?;
        let previous = trie.delete(path);
        let encoded = trie.encode();
        let new_end_id =
            chain::write_stream(&self.storage, &mut **stream, &self.root.free_list_chain, &mut &encoded[..])?;
        let displaced = self.root.path_trie_chain.write_new(new_end_id);
        if displaced != CHAIN_START {
            crate::freelist::release_chain(&self.storage, &mut **stream, &self.root.free_list_chain, displaced)?;
        }
        self.root.persist(&mut **stream)?;
        Ok(previous)
    }

    pub fn get_document_id_by_path(&self, path: &str) -> Result<Option<SerialId>> {
        let mut stream = self.storage.lock();
        let trie = self.load_path_trie(&mut **stream)?;
        Ok(trie.get(path))
    }

    pub fn search_paths(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stream = self.storage.lock();
        let trie = self.load_path_trie(&mut **stream)?;
        Ok(trie.search(prefix))
    }

    pub fn paths_for_document(&self, doc_id: SerialId) -> Result<Vec<String>> {
        let mut stream = self.storage.lock();
        let trie = self.load_path_trie(&mut **stream)?;
        Ok(trie.paths_for(doc_id))
    }

    /// Writes `reader`'s remaining bytes as a new page chain, returning
    /// the end page id.
    pub fn write_stream(&self, reader: &mut dyn Read) -> Result<i32> {
        let mut stream = self.storage.lock();
        let end_id = chain::write_stream(&self.storage, &mut **stream, &self.root.free_list_chain, reader)?;
        self.root.persist(&mut **stream)?;
        Ok(end_id)
    }

    /// Opens a read-only view over the chain ending at `end_page_id`.
    pub fn get_stream(&self, end_page_id: i32) -> Result<ChainReader> {
        let mut stream = self.storage.lock();
        ChainReader::open(&self.storage, &mut **stream, end_page_id)
    }

    /// Releases every page in the chain ending at `end_page_id` back to
    /// the free-list.
    pub fn release_chain(&self, end_page_id: i32) -> Result<()> {
        let mut stream = self.storage.lock();
        crate::freelist::release_chain(&self.storage, &mut **stream, &self.root.free_list_chain, end_page_id)?;
        self.root.persist(&mut **stream)?;
        Ok(())
    }

    /// Current length of the backing stream, in bytes. Useful for
    /// monitoring storage growth and free-list reuse.
    pub fn stream_len(&self) -> Result<u64> {
        let mut stream = self.storage.lock();
        PagedStorage::stream_len(&mut **stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fresh_engine() -> Engine {
        Engine::new(Box::new(Cursor::new(Vec::new()))).unwrap()
    }

    #[test]
    fn bind_and_read_back_document_head() {
        let engine = fresh_engine();
        let doc = SerialId::new();
        let expired = engine.bind_index(doc, 5).unwrap();
        assert_eq!(expired, -1);
        assert_eq!(engine.get_document_head(doc).unwrap(), Some(5));
    }

    #[test]
    fn unbind_index_clears_the_entry() {
        let engine = fresh_engine();
        let doc = SerialId::new();
        engine.bind_index(doc, 5).unwrap();
        assert!(engine.unbind_index(doc).unwrap());
        assert_eq!(engine.get_document_head(doc).unwrap(), None);
    }

    #[test]
    fn bind_path_then_lookup_round_trips() {
        let engine = fresh_engine();
        let doc = SerialId::new();
        let previous = engine.bind_path("/a/b", doc).unwrap();
        assert_eq!(previous, None);
        assert_eq!(engine.get_document_id_by_path("/a/b").unwrap(), Some(doc));
    }

    #[test]
    fn rebinding_a_path_returns_the_previous_document() {
        let engine = fresh_engine();
        let first = SerialId::new();
        let second = SerialId::new();
        engine.bind_path("/x", first).unwrap();
        let previous = engine.bind_path("/x", second).unwrap();
        assert_eq!(previous, Some(first));
        assert_eq!(engine.get_document_id_by_path("/x").unwrap(), Some(second));
    }

    #[test]
    fn unbind_path_removes_the_binding() {
        let engine = fresh_engine();
        let doc = SerialId::new();
        engine.bind_path("/gone", doc).unwrap();
        engine.unbind_path("/gone").unwrap();
        assert_eq!(engine.get_document_id_by_path("/gone").unwrap(), None);
    }

    #[test]
    fn empty_path_is_rejected_on_bind_and_unbind() {
        let engine = fresh_engine();
        assert!(engine.bind_path("", SerialId::new()).is_err());
        assert!(engine.unbind_path("").is_err());
    }

    #[test]
    fn negative_page_id_is_rejected_on_bind_index() {
        let engine = fresh_engine();
        assert!(engine.bind_index(SerialId::new(), -1).is_err());
    }

    #[test]
    fn unbind_path_on_uninitialised_trie_is_a_no_op() {
        let engine = fresh_engine();
        assert_eq!(engine.unbind_path("/anything").unwrap(), None);
    }

    #[test]
    fn search_paths_and_paths_for_document_agree() {
        let engine = fresh_engine();
        let doc = SerialId::new();
        engine.bind_path("/docs/one", doc).unwrap();
        engine.bind_path("/docs/two", doc).unwrap();
        let mut via_search = engine.search_paths("/docs").unwrap();
        via_search.sort();
        let mut via_document = engine.paths_for_document(doc).unwrap();
        via_document.sort();
        assert_eq!(via_search, via_document);
    }

    #[test]
    fn write_and_get_stream_round_trips_bytes() {
        let engine = fresh_engine();
        let mut reader = Cursor::new(b"engine level round trip".to_vec());
        let end_id = engine.write_stream(&mut reader).unwrap();
        let mut got = engine.get_stream(end_id).unwrap();
        let mut buf = Vec::new();
        got.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"engine level round trip");
    }

    #[test]
    fn reopening_an_engine_preserves_all_bindings() {
        let doc = SerialId::new();
        let bytes = {
            let engine = fresh_engine();
            engine.bind_index(doc, 11).unwrap();
            engine.bind_path("/persisted", doc).unwrap();
            let mut stream = engine.storage.lock();
            let len = stream.len().unwrap();
            let mut buf = vec![0u8; len as usize];
            stream.read_at(0, &mut buf).unwrap();
            buf
        };
        let reopened = Engine::new(Box::new(Cursor::new(bytes))).unwrap();
        assert_eq!(reopened.get_document_head(doc).unwrap(), Some(11));
        assert_eq!(reopened.get_document_id_by_path("/persisted").unwrap(), Some(doc));
    }
}
