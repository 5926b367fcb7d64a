//! The path trie: an in-memory, reverse-parent-linked trie of
//! code-point nodes mapping string paths to document ids. Node
//! 0 is an implicit root, never serialised; every other node's parent
//! index is strictly less than its own, which is what lets
//! deserialisation reconstruct the tree in one forward pass.

use crate::errors::{Result, StreamDbError};
use crate::serial::SerialId;
use crate::varint::{BitReader, BitWriter};

struct TrieNode {
    value: u32,
    parent_index: u32,
    children: Vec<(u32, usize)>,
    data: Option<SerialId>,
}

impl TrieNode {
    fn root() -> Self {
        Self { value: 0, parent_index: 0, children: Vec::new(), data: None }
    }
}

pub struct PathTrie {
    nodes: Vec<TrieNode>,
}

impl PathTrie {
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: vec![TrieNode::root()] }
    }

    fn child_of(&self, parent: usize, code_point: u32) -> Option<usize> {
        self.nodes[parent].children.iter().find(|(cp, _)| *cp == code_point).map(|(_, idx)| *idx)
    }

    fn walk(&self, path: &str) -> Option<usize> {
        let mut current = 0usize;
        for ch in path.chars() {
            current = self.child_of(current, ch as u32)?;
        }
        Some(current)
    }

    /// Inserts `path` -> `value`, materialising any missing nodes.
    /// Returns the value previously stored at this exact path, if any.
    pub fn add(&mut self, path: &str, value: SerialId) -> Option<SerialId> {
        let mut current = 0usize;
        for ch in path.chars() {
            let code_point = ch as u32;
            current = match self.child_of(current, code_point) {
                Some(idx) => idx,
                None => {
                    let new_idx = self.nodes.len();
                    self.nodes.push(TrieNode {
                        value: code_point,
                        parent_index: current as u32,
                        children: Vec::new(),
                        data: None,
                    });
                    self.nodes[current].children.push((code_point, new_idx));
                    new_idx
                }
            };
        }
        std::mem::replace(&mut self.nodes[current].data, Some(value))
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<SerialId> {
        self.walk(path).and_then(|idx| self.nodes[idx].data)
    }

    /// Clears the data at `path`'s terminal node, if present, without
    /// pruning structural nodes. Returns the value that was cleared.
    pub fn delete(&mut self, path: &str) -> Option<SerialId> {
        let idx = self.walk(path)?;
        self.nodes[idx].data.take()
    }

    /// All paths whose node lies at or beneath the node named by
    /// `prefix` and has data set.
    #[must_use]
    pub fn search(&self, prefix: &str) -> Vec<String> {
        let Some(start) = self.walk(prefix) else {
            return Vec::new();
        };
        let mut matches = Vec::new();
        self.collect_with_data(start, &mut matches);
        matches
    }

    fn collect_with_data(&self, node: usize, out: &mut Vec<String>) {
        if self.nodes[node].data.is_some() {
            out.push(self.reconstruct(node));
        }
        for &(_, child) in &self.nodes[node].children {
            self.collect_with_data(child, out);
        }
    }

    /// All paths whose terminal node holds exactly `value`.
    #[must_use]
    pub fn paths_for(&self, value: SerialId) -> Vec<String> {
        (1..self.nodes.len())
            .filter(|&idx| self.nodes[idx].data == Some(value))
            .map(|idx| self.reconstruct(idx))
            .collect()
    }

    fn reconstruct(&self, node: usize) -> String {
        let mut code_points = Vec::new();
        let mut idx = node;
        while idx != 0 {
            code_points.push(self.nodes[idx].value);
            idx = self.nodes[idx].parent_index as usize;
        }
        code_points.reverse();
        code_points.into_iter().filter_map(char::from_u32).collect()
    }

    /// Bit-packed serialisation of the full trie.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        let node_count = self.nodes.len() - 1;
        writer.write_uint((node_count + 1) as u32);
        for node in &self.nodes[1..] {
            writer.write_uint(node.parent_index);
            writer.write_uint(node.value);
            let data_len = if node.data.is_some() { 16 } else { 0 };
            writer.write_uint(data_len);
            if let Some(data) = node.data {
                writer.flush_to_byte();
                writer.write_raw(data.as_bytes());
            }
        }
        writer.write_uint(0);
        writer.write_uint(0);
        writer.write_uint(0);
        writer.finish()
    }

    /// Reconstructs a trie from [`PathTrie::encode`]'s output.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(bytes);
        let total = reader
            .read_uint()
            .ok_or_else(|| StreamDbError::Corrupted("path trie stream truncated before header".into()))?;
        let mut nodes = vec![TrieNode::root()];

        for i in 0..total {
            let parent = reader
                .read_uint()
                .ok_or_else(|| StreamDbError::Corrupted("path trie stream truncated mid-record".into()))?;
            let value = reader
                .read_uint()
                .ok_or_else(|| StreamDbError::Corrupted("path trie stream truncated mid-record".into()))?;
            let data_len = reader
                .read_uint()
                .ok_or_else(|| StreamDbError::Corrupted("path trie stream truncated mid-record".into()))?;

            if parent == 0 && value == 0 && data_len == 0 {
                if i != total - 1 {
                    return Err(StreamDbError::Corrupted(
                        "path trie terminal marker encountered before the last record".into(),
                    ));
                }
                break;
            }

            let parent = parent as usize;
            if parent >= nodes.len() {
                return Err(StreamDbError::Corrupted(format!(
                    "path trie node parent index {parent} is not strictly less than its own index"
                )));
            }

            let data = if data_len == 0 {
                None
            } else if data_len == 16 {
                reader.align_to_byte();
                let raw = reader
                    .read_raw(16)
                    .ok_or_else(|| StreamDbError::Corrupted("path trie stream truncated before node data".into()))?;
                Some(SerialId::from_bytes(raw.try_into().expect("16-byte slice")))
            } else {
                return Err(StreamDbError::Corrupted(format!(
                    "path trie node data length must be 0 or 16, got {data_len}"
                )));
            };

            let node_idx = nodes.len();
            nodes[parent].children.push((value, node_idx));
            nodes.push(TrieNode { value, parent_index: parent as u32, children: Vec::new(), data });
        }

        Ok(Self { nodes })
    }
}

impl Default for PathTrie {
    fn default() -> Self {
        Self::new()
    }
}
