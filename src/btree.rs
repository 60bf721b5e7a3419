use byteorder::{BigEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::ops::ControlFlow;

use crate::cancel::CancelToken;
use crate::error::{CorruptContext, HfsError, Result};
use crate::extentlist::ExtentList;

/// B-tree node kinds
pub const NODE_KIND_LEAF: u8 = 0xFF; // -1 as i8
pub const NODE_KIND_INDEX: u8 = 0x00;
pub const NODE_KIND_HEADER: u8 = 0x01;
pub const NODE_KIND_MAP: u8 = 0x02;

/// Key-compare-type values from the header record (catalog B-trees only).
pub const KEY_COMPARE_CASE_FOLDING: u32 = 0xCF;
pub const KEY_COMPARE_BINARY: u32 = 0xBC;

/// Default node-cache capacity. "A few dozen" per the design notes,
/// doubled since index-node revisits during a walk are common.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// B-tree header record (from the header node, record 0).
#[derive(Debug, Clone)]
pub struct BTreeHeader {
    pub tree_depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub btree_type: u8,
    pub key_compare_type: u32,
    pub variable_index_keys: bool,
}

/// A B-tree node descriptor (14 bytes at the start of each node).
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub forward_link: u32,
    pub backward_link: u32,
    pub kind: u8,
    pub height: u8,
    pub num_records: u16,
    pub reserved: u16,
}

/// A parsed B-tree node with its raw data.
#[derive(Debug, Clone)]
pub struct BTreeNode {
    pub number: u32,
    pub descriptor: NodeDescriptor,
    data: Vec<u8>,
    record_offsets: Vec<u16>,
}

impl BTreeNode {
    pub fn record_count(&self) -> usize {
        self.descriptor.num_records as usize
    }

    /// Raw bytes for record `index` in this node.
    pub fn record_data(&self, index: usize) -> Result<&[u8]> {
        if index >= self.record_count() {
            return Err(HfsError::corrupt_in(
                format!("record index {} >= num_records {}", index, self.record_count()),
                CorruptContext::new().node(self.number).record(index),
            ));
        }
        let start = self.record_offsets[index] as usize;
        let end = self.record_offsets[index + 1] as usize;
        if start > end || end > self.data.len() {
            return Err(HfsError::corrupt_in(
                format!("invalid record offsets: start={start}, end={end}, len={}", self.data.len()),
                CorruptContext::new().node(self.number).record(index),
            ));
        }
        Ok(&self.data[start..end])
    }
}

fn parse_node_descriptor(cursor: &mut Cursor<&[u8]>) -> Result<NodeDescriptor> {
    Ok(NodeDescriptor {
        forward_link: cursor.read_u32::<BigEndian>()?,
        backward_link: cursor.read_u32::<BigEndian>()?,
        kind: cursor.read_u8()?,
        height: cursor.read_u8()?,
        num_records: cursor.read_u16::<BigEndian>()?,
        reserved: cursor.read_u16::<BigEndian>()?,
    })
}

/// Byte offset, relative to the volume's window, of `offset_in_fork`
/// bytes into `extents`.
fn byte_offset_in_extents(extents: &ExtentList, block_size: u32, offset_in_fork: u64) -> Result<u64> {
    let block_size = block_size as u64;
    let logical_block = (offset_in_fork / block_size) as u32;
    let offset_within_block = offset_in_fork % block_size;
    let (physical_block, _run_remaining) = extents
        .locate(logical_block)
        .ok_or_else(|| HfsError::corrupt(format!("fork offset {offset_in_fork} exceeds extent capacity")))?;
    Ok(physical_block as u64 * block_size + offset_within_block)
}

/// Bounded LRU cache of decoded nodes, keyed by node number. No crate in
/// the example corpus reaches for an `lru` crate for this, so it's
/// hand-rolled over a map plus an access-order queue.
struct NodeCache {
    capacity: usize,
    nodes: HashMap<u32, BTreeNode>,
    order: VecDeque<u32>,
}

impl NodeCache {
    fn new(capacity: usize) -> Self {
        NodeCache { capacity, nodes: HashMap::new(), order: VecDeque::new() }
    }

    fn touch(&mut self, number: u32) {
        self.order.retain(|&n| n != number);
        self.order.push_back(number);
    }

    fn insert(&mut self, node: BTreeNode) {
        let number = node.number;
        if !self.nodes.contains_key(&number) && self.nodes.len() >= self.capacity {
            if let Some(evict) = self.order.pop_front() {
                self.nodes.remove(&evict);
            }
        }
        self.nodes.insert(number, node);
        self.touch(number);
    }

    fn get(&mut self, number: u32) -> Option<&BTreeNode> {
        if self.nodes.contains_key(&number) {
            self.touch(number);
            self.nodes.get(&number)
        } else {
            None
        }
    }
}

/// A generic B-tree: header, backing extent list, and node cache. Key
/// comparison and record parsing are supplied per-call by the tree
/// specialization (catalog/extents/attributes/hotfiles), since each
/// uses a different key shape over the same node/record machinery.
pub struct BTree {
    pub header: BTreeHeader,
    extents: ExtentList,
    block_size: u32,
    cache: NodeCache,
}

impl BTree {
    /// Open a B-tree backed by `extents` (the tree file's complete,
    /// already-resolved extent list — inline plus any overflow).
    pub fn open<R: Read + Seek>(reader: &mut R, extents: ExtentList, block_size: u32) -> Result<Self> {
        // Node size is unknown until the header record is parsed; read a
        // conservative 512-byte prefix of node 0 first, the same
        // bootstrap the teacher's `read_btree_header` used.
        let offset = byte_offset_in_extents(&extents, block_size, 0)?;
        reader.seek(SeekFrom::Start(offset))?;
        let mut prefix = vec![0u8; 512];
        reader.read_exact(&mut prefix)?;

        let mut cursor = Cursor::new(prefix.as_slice());
        let desc = parse_node_descriptor(&mut cursor)?;
        if desc.kind != NODE_KIND_HEADER {
            return Err(HfsError::corrupt_in(
                format!("expected header node, got kind {}", desc.kind),
                CorruptContext::new().node(0),
            ));
        }

        let tree_depth = cursor.read_u16::<BigEndian>()?;
        let root_node = cursor.read_u32::<BigEndian>()?;
        let leaf_records = cursor.read_u32::<BigEndian>()?;
        let first_leaf_node = cursor.read_u32::<BigEndian>()?;
        let last_leaf_node = cursor.read_u32::<BigEndian>()?;
        let node_size = cursor.read_u16::<BigEndian>()?;
        let max_key_length = cursor.read_u16::<BigEndian>()?;
        let total_nodes = cursor.read_u32::<BigEndian>()?;
        let free_nodes = cursor.read_u32::<BigEndian>()?;
        let _reserved = cursor.read_u16::<BigEndian>()?;
        let _clump_size = cursor.read_u32::<BigEndian>()?;
        let btree_type = cursor.read_u8()?;
        let key_compare_type = cursor.read_u8()? as u32;
        let attributes = cursor.read_u32::<BigEndian>()?;

        if !(512..=32768).contains(&node_size) || !node_size.is_power_of_two() {
            return Err(HfsError::corrupt_in(
                format!("invalid B-tree node size: {node_size}"),
                CorruptContext::new().node(0),
            ));
        }

        let header = BTreeHeader {
            tree_depth,
            root_node,
            leaf_records,
            first_leaf_node,
            last_leaf_node,
            node_size,
            max_key_length,
            total_nodes,
            free_nodes,
            btree_type,
            key_compare_type,
            variable_index_keys: attributes & 0x4 != 0,
        };

        Ok(BTree { header, extents, block_size, cache: NodeCache::new(DEFAULT_CACHE_CAPACITY) })
    }

    fn read_node_from_disk<R: Read + Seek>(&self, reader: &mut R, node_number: u32) -> Result<BTreeNode> {
        let node_size = self.header.node_size;
        let byte_offset_in_fork = node_number as u64 * node_size as u64;
        let byte_offset = byte_offset_in_extents(&self.extents, self.block_size, byte_offset_in_fork)?;

        reader.seek(SeekFrom::Start(byte_offset))?;
        let mut data = vec![0u8; node_size as usize];
        reader.read_exact(&mut data)?;

        let mut cursor = Cursor::new(data.as_slice());
        let descriptor = parse_node_descriptor(&mut cursor)?;

        if ![NODE_KIND_LEAF, NODE_KIND_INDEX, NODE_KIND_HEADER, NODE_KIND_MAP].contains(&descriptor.kind) {
            return Err(HfsError::corrupt_in(
                format!("node kind {} out of range", descriptor.kind),
                CorruptContext::new().node(node_number),
            ));
        }

        let num_offsets = descriptor.num_records as usize + 1;
        let mut record_offsets = Vec::with_capacity(num_offsets);
        for i in 0..num_offsets {
            let offset_pos = node_size as usize - (i + 1) * 2;
            if offset_pos + 1 >= data.len() {
                return Err(HfsError::corrupt_in(
                    "offset table out of bounds",
                    CorruptContext::new().node(node_number),
                ));
            }
            record_offsets.push(u16::from_be_bytes([data[offset_pos], data[offset_pos + 1]]));
        }

        Ok(BTreeNode { number: node_number, descriptor, data, record_offsets })
    }

    /// Fetch a node, consulting (and populating) the LRU cache.
    pub fn get_node<R: Read + Seek>(&mut self, reader: &mut R, node_number: u32) -> Result<&BTreeNode> {
        if self.cache.get(node_number).is_none() {
            let node = self.read_node_from_disk(reader, node_number)?;
            self.cache.insert(node);
        }
        Ok(self.cache.get(node_number).expect("just inserted"))
    }

    /// Binary search within a single node's records using `compare`.
    /// For a leaf, returns `(true, exact_index)` on an exact match or
    /// `(false, insertion_point)` otherwise. For an index node, returns
    /// the greatest record index whose key is <= the search key (its
    /// child pointer is the descend target), or `None` if every record
    /// in the node is greater.
    fn search_node(node: &BTreeNode, compare: &dyn Fn(&[u8]) -> Ordering) -> Result<(bool, usize)> {
        let mut low = 0usize;
        let mut high = node.record_count();
        let mut last_le: Option<usize> = None;

        while low < high {
            let mid = low + (high - low) / 2;
            let record = node.record_data(mid)?;
            match compare(record) {
                Ordering::Equal => return Ok((true, mid)),
                Ordering::Less => {
                    // record < search key
                    last_le = Some(mid);
                    low = mid + 1;
                }
                Ordering::Greater => {
                    high = mid;
                }
            }
        }

        match last_le {
            Some(idx) => Ok((false, idx)),
            None => Ok((false, 0)),
        }
    }

    /// Descend from the root, binary-searching each index node, to an
    /// exact leaf match. Returns `(node_number, record_index)`.
    pub fn search<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        compare: &dyn Fn(&[u8]) -> Ordering,
    ) -> Result<Option<(u32, usize)>> {
        if self.header.root_node == 0 {
            return Ok(None);
        }

        let mut current = self.header.root_node;
        loop {
            let node = self.get_node(reader, current)?;
            match node.descriptor.kind {
                NODE_KIND_LEAF => {
                    let count = node.record_count();
                    if count == 0 {
                        return Ok(None);
                    }
                    let (found, idx) = Self::search_node(node, compare)?;
                    return if found { Ok(Some((current, idx))) } else { Ok(None) };
                }
                NODE_KIND_INDEX => {
                    let count = node.record_count();
                    if count == 0 {
                        return Ok(None);
                    }
                    let (_, idx) = Self::search_node(node, compare)?;
                    let record = node.record_data(idx)?.to_vec();
                    let child = extract_index_child(&record, &self.header, current, idx)?;
                    current = child;
                }
                other => {
                    return Err(HfsError::corrupt_in(
                        format!("unexpected node kind {other} during search"),
                        CorruptContext::new().node(current),
                    ));
                }
            }
        }
    }

    /// Find the leaf node a given comparator would land a search on,
    /// without requiring an exact match — used by `list_directory`-style
    /// scans that want the first record for a given parent/prefix.
    pub fn search_leaf<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        compare: &dyn Fn(&[u8]) -> Ordering,
    ) -> Result<Option<u32>> {
        if self.header.root_node == 0 {
            return Ok(None);
        }

        let mut current = self.header.root_node;
        loop {
            let node = self.get_node(reader, current)?;
            match node.descriptor.kind {
                NODE_KIND_LEAF => return Ok(Some(current)),
                NODE_KIND_INDEX => {
                    let count = node.record_count();
                    if count == 0 {
                        return Ok(None);
                    }
                    let (_, idx) = Self::search_node(node, compare)?;
                    let record = node.record_data(idx)?.to_vec();
                    let child = extract_index_child(&record, &self.header, current, idx)?;
                    current = child;
                }
                other => {
                    return Err(HfsError::corrupt_in(
                        format!("unexpected node kind {other} during leaf search"),
                        CorruptContext::new().node(current),
                    ));
                }
            }
        }
    }

    /// In-order walk from `start_node`'s leaf chain, visiting every
    /// record until the visitor asks to stop or the chain ends.
    /// Cancellation is polled between nodes.
    pub fn walk<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        start_node: u32,
        cancel: &CancelToken,
        visitor: &mut dyn FnMut(&[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut current = start_node;
        while current != 0 {
            cancel.check()?;
            let node = self.get_node(reader, current)?;
            if node.descriptor.kind != NODE_KIND_LEAF {
                return Err(HfsError::corrupt_in(
                    format!("expected leaf node, got kind {}", node.descriptor.kind),
                    CorruptContext::new().node(current),
                ));
            }
            let forward = node.descriptor.forward_link;
            for i in 0..node.record_count() {
                let record = node.record_data(i)?;
                if visitor(record).is_break() {
                    return Ok(());
                }
            }
            current = forward;
        }
        Ok(())
    }

    /// Walk the map-node chain and build a bitmap of in-use node numbers.
    pub fn used_node_bitmap<R: Read + Seek>(&mut self, reader: &mut R) -> Result<Vec<bool>> {
        let total = self.header.total_nodes as usize;
        let mut bitmap = vec![false; total];
        bitmap[0] = true; // header node is always used

        let mut current = 0u32;
        loop {
            let node = self.get_node(reader, current)?.clone_shallow();
            if node.number != 0 && (node.number as usize) < bitmap.len() {
                bitmap[node.number as usize] = true;
            }
            if node.descriptor.kind == NODE_KIND_HEADER || node.descriptor.kind == NODE_KIND_MAP {
                // The header node's record 0 is the header record and
                // record 1 is user data, neither a bitmap; only a
                // trailing map record (if present) carries allocation
                // bits. A dedicated map node carries only bitmap records.
                let start = if node.descriptor.kind == NODE_KIND_HEADER { 2 } else { 0 };
                for i in start..node.record_count() {
                    let bits = node.record_data(i)?;
                    for (byte_idx, byte) in bits.iter().enumerate() {
                        for bit in 0..8u32 {
                            let node_num = (byte_idx as u32 * 8) + bit;
                            if (node_num as usize) < bitmap.len() && byte & (0x80 >> bit) != 0 {
                                bitmap[node_num as usize] = true;
                            }
                        }
                    }
                }
            }
            if node.descriptor.forward_link == 0 {
                break;
            }
            current = node.descriptor.forward_link;
        }

        Ok(bitmap)
    }
}

impl BTreeNode {
    fn clone_shallow(&self) -> BTreeNode {
        BTreeNode {
            number: self.number,
            descriptor: self.descriptor.clone(),
            data: self.data.clone(),
            record_offsets: self.record_offsets.clone(),
        }
    }
}

/// Extract the child node number trailing an index-node record: the key
/// is followed by a u32 node number. Per the keyLength(i) accessor rule,
/// the key length is a per-record u16 prefix only when the header's
/// `variable_index_keys` flag is set; otherwise every index key has the
/// header's fixed `max_key_length` and carries no length prefix at all.
fn extract_index_child(record_data: &[u8], header: &BTreeHeader, node: u32, record: usize) -> Result<u32> {
    if record_data.len() < 2 {
        return Err(HfsError::corrupt_in(
            "index record too short",
            CorruptContext::new().node(node).record(record),
        ));
    }
    let (key_length, mut child_offset) = if header.variable_index_keys {
        let key_length = u16::from_be_bytes([record_data[0], record_data[1]]) as usize;
        (key_length, 2 + key_length)
    } else {
        let key_length = header.max_key_length as usize;
        (key_length, key_length)
    };
    if !child_offset.is_multiple_of(2) {
        child_offset += 1;
    }
    if child_offset + 4 > record_data.len() {
        return Err(HfsError::corrupt_in(
            format!("index record too short for child pointer: key_len={key_length}, record_len={}", record_data.len()),
            CorruptContext::new().node(node).record(record),
        ));
    }
    Ok(u32::from_be_bytes([
        record_data[child_offset],
        record_data[child_offset + 1],
        record_data[child_offset + 2],
        record_data[child_offset + 3],
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds a minimal single-leaf-node B-tree: header node + one leaf
    /// node containing records `(key: u32 big-endian, value: u32)`,
    /// sorted ascending by key.
    fn build_single_leaf_tree(node_size: u16, keys: &[u32]) -> (Vec<u8>, ExtentList) {
        let total_nodes = 2u32;
        let mut image = vec![0u8; node_size as usize * total_nodes as usize];

        // Header node (node 0)
        {
            let node = &mut image[0..node_size as usize];
            node[0..4].copy_from_slice(&0u32.to_be_bytes()); // forward link
            node[4..8].copy_from_slice(&0u32.to_be_bytes()); // backward link
            node[8] = NODE_KIND_HEADER;
            node[9] = 0; // height
            node[10..12].copy_from_slice(&1u16.to_be_bytes()); // num_records

            let mut off = 14usize;
            node[off..off + 2].copy_from_slice(&0u16.to_be_bytes()); // tree_depth
            off += 2;
            node[off..off + 4].copy_from_slice(&1u32.to_be_bytes()); // root_node = 1
            off += 4;
            node[off..off + 4].copy_from_slice(&(keys.len() as u32).to_be_bytes()); // leaf_records
            off += 4;
            node[off..off + 4].copy_from_slice(&1u32.to_be_bytes()); // first_leaf_node
            off += 4;
            node[off..off + 4].copy_from_slice(&1u32.to_be_bytes()); // last_leaf_node
            off += 4;
            node[off..off + 2].copy_from_slice(&node_size.to_be_bytes()); // node_size
            off += 2;
            node[off..off + 2].copy_from_slice(&8u16.to_be_bytes()); // max_key_length
            off += 2;
            node[off..off + 4].copy_from_slice(&total_nodes.to_be_bytes()); // total_nodes
            off += 4;
            node[off..off + 4].copy_from_slice(&0u32.to_be_bytes()); // free_nodes
            off += 4;
            off += 2; // reserved
            off += 4; // clump size
            node[off] = 0; // btree_type
            off += 1;
            node[off] = KEY_COMPARE_BINARY as u8;

            // offset table at the tail: [free-space offset, record0 offset]
            let n = node_size as usize;
            node[n - 2..n].copy_from_slice(&14u16.to_be_bytes());
            node[n - 4..n - 2].copy_from_slice(&14u16.to_be_bytes());
        }

        // Leaf node (node 1)
        {
            let node_start = node_size as usize;
            let node = &mut image[node_start..node_start + node_size as usize];
            node[0..4].copy_from_slice(&0u32.to_be_bytes());
            node[4..8].copy_from_slice(&0u32.to_be_bytes());
            node[8] = NODE_KIND_LEAF;
            node[9] = 1;
            node[10..12].copy_from_slice(&(keys.len() as u16).to_be_bytes());

            let mut offsets = Vec::new();
            let mut pos = 14usize;
            for &k in keys {
                offsets.push(pos as u16);
                // record format: key_length(2) + key(4 bytes, the u32) + value(4 bytes)
                node[pos..pos + 2].copy_from_slice(&4u16.to_be_bytes());
                node[pos + 2..pos + 6].copy_from_slice(&k.to_be_bytes());
                node[pos + 6..pos + 10].copy_from_slice(&k.to_be_bytes());
                pos += 10;
            }
            offsets.push(pos as u16); // free space offset

            // The offset table is stored at the tail in reverse: the last
            // 2 bytes of the node hold record 0's offset, the next-to-last
            // 2 bytes hold record 1's, and so on, with the free-space
            // offset trailing furthest from the end.
            let n = node_size as usize;
            for (i, off) in offsets.iter().enumerate() {
                let offset_pos = n - (i + 1) * 2;
                node[offset_pos..offset_pos + 2].copy_from_slice(&off.to_be_bytes());
            }
        }

        let mut extents = ExtentList::new();
        extents.push(0, total_nodes);
        (image, extents)
    }

    #[test]
    fn search_finds_exact_key_via_binary_search() {
        let (image, extents) = build_single_leaf_tree(512, &[10, 20, 30, 40, 50]);
        let mut cursor = Cursor::new(image);
        let mut tree = BTree::open(&mut cursor, extents, 512).unwrap();

        let target = 30u32;
        let found = tree
            .search(&mut cursor, &|record: &[u8]| {
                let key = u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
                key.cmp(&target)
            })
            .unwrap();
        assert!(found.is_some());
        let (node_num, idx) = found.unwrap();
        let node = tree.get_node(&mut cursor, node_num).unwrap();
        let record = node.record_data(idx).unwrap();
        let value = u32::from_be_bytes([record[6], record[7], record[8], record[9]]);
        assert_eq!(value, 30);
    }

    #[test]
    fn search_returns_none_for_missing_key() {
        let (image, extents) = build_single_leaf_tree(512, &[10, 20, 30]);
        let mut cursor = Cursor::new(image);
        let mut tree = BTree::open(&mut cursor, extents, 512).unwrap();

        let target = 25u32;
        let found = tree
            .search(&mut cursor, &|record: &[u8]| {
                let key = u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
                key.cmp(&target)
            })
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn walk_visits_every_record_in_order() {
        let (image, extents) = build_single_leaf_tree(512, &[1, 2, 3, 4, 5]);
        let mut cursor = Cursor::new(image);
        let mut tree = BTree::open(&mut cursor, extents, 512).unwrap();

        let mut seen = Vec::new();
        tree.walk(&mut cursor, tree.header.first_leaf_node, &CancelToken::new(), &mut |record| {
            let key = u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
            seen.push(key);
            ControlFlow::Continue(())
        })
        .unwrap();

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn walk_honors_cancellation() {
        let (image, extents) = build_single_leaf_tree(512, &[1, 2, 3]);
        let mut cursor = Cursor::new(image);
        let mut tree = BTree::open(&mut cursor, extents, 512).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = tree.walk(&mut cursor, tree.header.first_leaf_node, &cancel, &mut |_| ControlFlow::Continue(()));
        assert!(matches!(result, Err(HfsError::Cancelled)));
    }

    fn blank_header(max_key_length: u16, variable_index_keys: bool) -> BTreeHeader {
        BTreeHeader {
            tree_depth: 1,
            root_node: 1,
            leaf_records: 0,
            first_leaf_node: 0,
            last_leaf_node: 0,
            node_size: 512,
            max_key_length,
            total_nodes: 2,
            free_nodes: 0,
            btree_type: 0,
            key_compare_type: KEY_COMPARE_BINARY,
            variable_index_keys,
        }
    }

    #[test]
    fn extract_index_child_reads_length_prefix_when_variable() {
        let header = blank_header(8, true);
        let mut record = vec![0u8; 2 + 4 + 4];
        record[0..2].copy_from_slice(&4u16.to_be_bytes()); // key_length
        record[6..10].copy_from_slice(&42u32.to_be_bytes()); // child node number
        let child = extract_index_child(&record, &header, 1, 0).unwrap();
        assert_eq!(child, 42);
    }

    #[test]
    fn extract_index_child_uses_fixed_max_key_length_when_not_variable() {
        let header = blank_header(4, false);
        // No length prefix: key occupies max_key_length bytes, then the child pointer.
        let mut record = vec![0u8; 4 + 4];
        record[4..8].copy_from_slice(&99u32.to_be_bytes());
        let child = extract_index_child(&record, &header, 1, 0).unwrap();
        assert_eq!(child, 99);
    }
}
