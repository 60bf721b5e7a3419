//! The fork abstraction: a virtual byte stream over a CNID's extents,
//! consulting the extents B-tree for any overflow beyond the inline
//! 8-extent record.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

use crate::btree::BTree;
use crate::error::{HfsError, Result};
use crate::extentlist::ExtentList;
use crate::volume::{ExtentDescriptor, ForkData};

pub const FORK_TYPE_DATA: u8 = 0x00;
pub const FORK_TYPE_RESOURCE: u8 = 0xFF;

/// A fork's resolved extent list plus the bookkeeping fields needed to
/// bound reads (`logical_size`) and re-derive offsets (`block_size`).
#[derive(Debug, Clone)]
pub struct Fork {
    pub cnid: u32,
    pub fork_type: u8,
    pub logical_size: u64,
    pub total_blocks: u32,
    pub extents: ExtentList,
    block_size: u32,
}

impl Fork {
    /// Build a fork from only its inline descriptors, with no overflow
    /// lookup. Used to bootstrap the extents-overflow file's own fork
    /// (consulting itself would be self-referential) and for any fork
    /// whose `total_blocks` is already satisfied by the inline record.
    pub fn from_inline(fork_data: &ForkData, fork_type: u8, cnid: u32, block_size: u32) -> Self {
        let mut extents = ExtentList::new();
        extents.ingest_descriptors(&fork_data.extents);
        Fork { cnid, fork_type, logical_size: fork_data.logical_size, total_blocks: fork_data.total_blocks, extents, block_size }
    }

    /// Build a fork, consulting `extents_tree` for overflow records if
    /// the inline descriptors don't already account for `total_blocks`.
    /// A `logical_size == 0` fork is the common empty-fork case and is
    /// never treated as needing an overflow lookup, even when its inline
    /// record is all-zero.
    pub fn open<R: Read + Seek>(
        reader: &mut R,
        extents_tree: &mut BTree,
        fork_data: &ForkData,
        fork_type: u8,
        cnid: u32,
        block_size: u32,
    ) -> Result<Self> {
        let mut fork = Self::from_inline(fork_data, fork_type, cnid, block_size);
        if fork_data.logical_size == 0 {
            return Ok(fork);
        }

        while fork.extents.total_blocks() < fork_data.total_blocks {
            let start_block = fork.extents.total_blocks();
            let overflow = lookup_overflow_extents(reader, extents_tree, cnid, fork_type, start_block)?;
            if overflow.is_empty() {
                return Err(HfsError::corrupt(format!(
                    "fork {cnid}/{fork_type:#x}: overflow extents missing, only {} of {} blocks found",
                    fork.extents.total_blocks(),
                    fork_data.total_blocks,
                )));
            }
            let before = fork.extents.total_blocks();
            for e in &overflow {
                if e.block_count == 0 {
                    break;
                }
                fork.extents.push(e.start_block, e.block_count);
            }
            if fork.extents.total_blocks() == before {
                // Overflow record contributed nothing; avoid looping forever.
                return Err(HfsError::corrupt(format!("fork {cnid}/{fork_type:#x}: empty overflow record")));
            }
        }

        Ok(fork)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

/// Look up overflow extent records keyed on `(file_id, fork_type, start_block)`.
pub fn lookup_overflow_extents<R: Read + Seek>(
    reader: &mut R,
    extents_tree: &mut BTree,
    file_id: u32,
    fork_type: u8,
    start_block: u32,
) -> Result<Vec<ExtentDescriptor>> {
    let found = extents_tree.search(reader, &|record_data: &[u8]| -> std::cmp::Ordering {
        compare_extent_key(record_data, file_id, fork_type, start_block)
    })?;

    match found {
        Some((node_number, record_idx)) => {
            let node = extents_tree.get_node(reader, node_number)?;
            let record_data = node.record_data(record_idx)?;
            parse_extent_record(record_data)
        }
        None => Ok(Vec::new()),
    }
}

fn compare_extent_key(record_data: &[u8], file_id: u32, fork_type: u8, start_block: u32) -> std::cmp::Ordering {
    if record_data.len() < 12 {
        return std::cmp::Ordering::Less;
    }
    let rec_fork_type = record_data[2];
    let rec_file_id = u32::from_be_bytes([record_data[4], record_data[5], record_data[6], record_data[7]]);
    let rec_start_block = u32::from_be_bytes([record_data[8], record_data[9], record_data[10], record_data[11]]);

    match rec_file_id.cmp(&file_id) {
        std::cmp::Ordering::Equal => {}
        ord => return ord,
    }
    match rec_fork_type.cmp(&fork_type) {
        std::cmp::Ordering::Equal => {}
        ord => return ord,
    }
    rec_start_block.cmp(&start_block)
}

fn parse_extent_record(record_data: &[u8]) -> Result<Vec<ExtentDescriptor>> {
    let key_length = u16::from_be_bytes([record_data[0], record_data[1]]) as usize;
    let data_start = 2 + key_length;
    if data_start + 64 > record_data.len() {
        return Err(HfsError::corrupt("extent record too short"));
    }

    let mut cursor = std::io::Cursor::new(&record_data[data_start..]);
    let mut extents = Vec::with_capacity(8);
    for _ in 0..8 {
        let start = cursor.read_u32::<BigEndian>()?;
        let count = cursor.read_u32::<BigEndian>()?;
        extents.push(ExtentDescriptor { start_block: start, block_count: count });
    }
    Ok(extents)
}

/// Presents a fork as a contiguous `Read + Seek` stream over the
/// underlying source, translating logical offsets through the extent
/// list.
pub struct ForkReader<'a, R: Read + Seek> {
    reader: &'a mut R,
    fork: Fork,
    block_size: u64,
    position: u64,
}

impl<'a, R: Read + Seek> ForkReader<'a, R> {
    pub fn new(reader: &'a mut R, fork: Fork) -> Self {
        let block_size = fork.block_size() as u64;
        ForkReader { reader, fork, block_size, position: 0 }
    }
}

impl<R: Read + Seek> Read for ForkReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.fork.logical_size {
            return Ok(0);
        }

        let remaining = (self.fork.logical_size - self.position) as usize;
        let to_read = buf.len().min(remaining);
        if to_read == 0 {
            return Ok(0);
        }

        let mut total_read = 0;
        while total_read < to_read {
            let logical_pos = self.position + total_read as u64;
            let logical_block = (logical_pos / self.block_size) as u32;
            let offset_in_block = logical_pos % self.block_size;

            let (physical_block, run_remaining) = self.fork.extents.locate(logical_block).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "logical offset beyond extent map")
            })?;

            let physical_pos = physical_block as u64 * self.block_size + offset_in_block;
            let extent_remaining = run_remaining as u64 * self.block_size - offset_in_block;
            let chunk_size = ((to_read - total_read) as u64).min(extent_remaining) as usize;

            self.reader.seek(SeekFrom::Start(physical_pos))?;
            self.reader.read_exact(&mut buf[total_read..total_read + chunk_size])?;
            total_read += chunk_size;
        }

        self.position += total_read as u64;
        Ok(total_read)
    }
}

impl<R: Read + Seek> Seek for ForkReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.fork.logical_size as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek before start of fork"));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_fork_reads_zero_bytes() {
        let fork_data = ForkData::default();
        let fork = Fork::from_inline(&fork_data, FORK_TYPE_DATA, 16, 512);
        let mut backing = Cursor::new(vec![0u8; 4096]);
        let mut reader = ForkReader::new(&mut backing, fork);
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn inline_fork_reads_across_extent_boundary() {
        let mut backing = vec![0u8; 4096];
        backing[0..512].copy_from_slice(&[1u8; 512]);
        backing[512..1024].copy_from_slice(&[2u8; 512]);

        let mut fork_data = ForkData { logical_size: 1000, clump_size: 0, total_blocks: 2, extents: Default::default() };
        fork_data.extents[0] = ExtentDescriptor { start_block: 0, block_count: 1 };
        fork_data.extents[1] = ExtentDescriptor { start_block: 1, block_count: 1 };

        let fork = Fork::from_inline(&fork_data, FORK_TYPE_DATA, 16, 512);
        let mut cursor = Cursor::new(backing);
        let mut reader = ForkReader::new(&mut cursor, fork);

        let mut buf = vec![0u8; 1000];
        reader.read_exact(&mut buf).unwrap();
        assert!(buf[..512].iter().all(|&b| b == 1));
        assert!(buf[512..].iter().all(|&b| b == 2));
    }

    #[test]
    fn seek_from_end_reports_logical_size() {
        let fork_data = ForkData { logical_size: 100, clump_size: 0, total_blocks: 1, extents: Default::default() };
        let mut fork_data = fork_data;
        fork_data.extents[0] = ExtentDescriptor { start_block: 0, block_count: 1 };
        let fork = Fork::from_inline(&fork_data, FORK_TYPE_DATA, 16, 512);
        let mut backing = Cursor::new(vec![0u8; 512]);
        let mut reader = ForkReader::new(&mut backing, fork);
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 100);
    }
}
