//! Allocation bitmap: free/used block tracking, free-space runs, and the
//! fragmentation and block-range analyses built on top of it.

use std::io::{Read, Seek};
use std::ops::ControlFlow;

use crate::btree::BTree;
use crate::cancel::CancelToken;
use crate::catalog;
use crate::error::Result;
use crate::fork::{Fork, ForkReader, FORK_TYPE_DATA, FORK_TYPE_RESOURCE};
use crate::volume::VolumeHeader;

/// The volume allocation bitmap: one bit per allocation block, 1 = in use.
pub struct Bitmap {
    bits: Vec<u8>,
    total_blocks: u32,
}

impl Bitmap {
    pub fn is_used(&self, block: u32) -> bool {
        if block >= self.total_blocks {
            return false;
        }
        let byte = self.bits[(block / 8) as usize];
        byte & (0x80 >> (block % 8)) != 0
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }
}

/// Read the full allocation bitmap via the allocation file's fork,
/// consulting the extents-overflow tree for any extents beyond the
/// inline fork descriptor like every other special fork.
pub fn read_bitmap<R: Read + Seek>(reader: &mut R, vol: &VolumeHeader, extents_tree: &mut BTree) -> Result<Bitmap> {
    let fork = Fork::open(reader, extents_tree, &vol.allocation_file, FORK_TYPE_DATA, crate::catalog::CNID_ALLOCATION_FILE, vol.block_size)?;
    let byte_len = vol.total_blocks.div_ceil(8) as usize;
    let mut bits = vec![0u8; byte_len];
    let mut fork_reader = ForkReader::new(reader, fork);
    fork_reader.read_exact(&mut bits)?;
    Ok(Bitmap { bits, total_blocks: vol.total_blocks })
}

/// One coalesced run of consecutive blocks sharing the same used/free state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start_block: u32,
    pub block_count: u32,
    pub used: bool,
}

/// Coalesce the bitmap into alternating used/free runs.
pub fn free_space_runs(bitmap: &Bitmap) -> Vec<Run> {
    let mut runs = Vec::new();
    if bitmap.total_blocks == 0 {
        return runs;
    }

    let mut run_start = 0u32;
    let mut run_used = bitmap.is_used(0);
    for block in 1..bitmap.total_blocks {
        let used = bitmap.is_used(block);
        if used != run_used {
            runs.push(Run { start_block: run_start, block_count: block - run_start, used: run_used });
            run_start = block;
            run_used = used;
        }
    }
    runs.push(Run { start_block: run_start, block_count: bitmap.total_blocks - run_start, used: run_used });
    runs
}

/// The `k` longest free runs, largest first. A small bounded sorted
/// array rather than a binary heap: simpler at the small `k` this tool
/// uses, and the corpus never reaches for a heap crate.
pub fn top_k_free(bitmap: &Bitmap, k: usize) -> Vec<Run> {
    let mut top: Vec<Run> = Vec::with_capacity(k + 1);
    for run in free_space_runs(bitmap) {
        if run.used {
            continue;
        }
        let pos = top.partition_point(|r| r.block_count >= run.block_count);
        top.insert(pos, run);
        top.truncate(k);
    }
    top
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentedFork {
    pub cnid: u32,
    pub fork_type: u8,
    pub extent_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FragmentationReport {
    pub forks_scanned: u64,
    pub fragmented_forks: u64,
    pub most_fragmented: Vec<FragmentedFork>,
}

/// Walk the catalog leaf chain, materializing every file's forks and
/// counting extents. A fork is "fragmented" iff its extent count > 1.
pub fn fragmentation_scan<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    catalog_tree: &mut BTree,
    extents_tree: &mut BTree,
    cancel: &CancelToken,
) -> Result<FragmentationReport> {
    let mut report = FragmentationReport::default();
    const TOP_K: usize = 10;

    tree_walk_files(reader, catalog_tree, cancel, &mut |reader, file| {
        for (fork_data, fork_type) in
            [(&file.data_fork, FORK_TYPE_DATA), (&file.resource_fork, FORK_TYPE_RESOURCE)]
        {
            if fork_data.total_blocks == 0 {
                continue;
            }
            let fork = Fork::open(reader, extents_tree, fork_data, fork_type, file.file_id, vol.block_size)?;
            report.forks_scanned += 1;
            if fork.extents.len() > 1 {
                report.fragmented_forks += 1;
            }
            let entry = FragmentedFork { cnid: file.file_id, fork_type, extent_count: fork.extents.len() };
            let pos = report.most_fragmented.partition_point(|f| f.extent_count >= entry.extent_count);
            report.most_fragmented.insert(pos, entry);
            report.most_fragmented.truncate(TOP_K);
        }
        Ok(())
    })?;

    Ok(report)
}

/// One entry in a block-range inspection: either a real fork's
/// intersecting extent, or a synthetic gap where no fork claims the
/// space within the requested range.
#[derive(Debug, Clone)]
pub enum RangeEntry {
    Fork { cnid: u32, fork_type: u8, start_block: u32, block_count: u32 },
    Gap { start_block: u32, block_count: u32 },
}

fn range_start(entry: &RangeEntry) -> u32 {
    match entry {
        RangeEntry::Fork { start_block, .. } | RangeEntry::Gap { start_block, .. } => *start_block,
    }
}

fn range_len(entry: &RangeEntry) -> u32 {
    match entry {
        RangeEntry::Fork { block_count, .. } | RangeEntry::Gap { block_count, .. } => *block_count,
    }
}

/// Find every fork whose extents intersect `[start, start + count)`,
/// filling non-adjacent space with synthetic gaps.
pub fn inspect_range<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    catalog_tree: &mut BTree,
    extents_tree: &mut BTree,
    cancel: &CancelToken,
    start: u32,
    count: u32,
) -> Result<Vec<RangeEntry>> {
    if count == 0 {
        return Err(crate::error::HfsError::invalid_argument("block range count must be nonzero"));
    }
    let range_end = start + count;

    let mut hits = Vec::new();
    tree_walk_files(reader, catalog_tree, cancel, &mut |reader, file| {
        for (fork_data, fork_type) in
            [(&file.data_fork, FORK_TYPE_DATA), (&file.resource_fork, FORK_TYPE_RESOURCE)]
        {
            if fork_data.total_blocks == 0 {
                continue;
            }
            let fork = Fork::open(reader, extents_tree, fork_data, fork_type, file.file_id, vol.block_size)?;
            for extent in fork.extents.iter() {
                let extent_end = extent.start_block + extent.block_count;
                if extent.start_block >= range_end || extent_end <= start {
                    continue;
                }
                let clipped_start = extent.start_block.max(start);
                let clipped_end = extent_end.min(range_end);
                hits.push(RangeEntry::Fork {
                    cnid: file.file_id,
                    fork_type,
                    start_block: clipped_start,
                    block_count: clipped_end - clipped_start,
                });
            }
        }
        Ok(())
    })?;

    hits.sort_by_key(range_start);

    let mut entries = Vec::new();
    let mut cursor = start;
    for hit in hits {
        let hit_start = range_start(&hit);
        if hit_start > cursor {
            entries.push(RangeEntry::Gap { start_block: cursor, block_count: hit_start - cursor });
        }
        cursor = hit_start + range_len(&hit);
        entries.push(hit);
    }
    if cursor < range_end {
        entries.push(RangeEntry::Gap { start_block: cursor, block_count: range_end - cursor });
    }

    Ok(entries)
}

/// Collect every file record in the catalog via `catalog::walk_files`,
/// then invoke `visit` for each — split in two passes since `visit`
/// itself needs `&mut R` (to open forks), which the tree walk's own
/// reader borrow would otherwise conflict with.
fn tree_walk_files<R: Read + Seek>(
    reader: &mut R,
    catalog_tree: &mut BTree,
    cancel: &CancelToken,
    visit: &mut dyn FnMut(&mut R, &crate::catalog::CatalogFile) -> Result<()>,
) -> Result<()> {
    let mut files = Vec::new();
    catalog::walk_files(reader, catalog_tree, cancel, &mut |file| {
        files.push(file.clone());
        ControlFlow::Continue(())
    })?;

    for file in &files {
        visit(reader, file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_from_bits(bits: &[bool]) -> Bitmap {
        let byte_len = bits.len().div_ceil(8);
        let mut bytes = vec![0u8; byte_len];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Bitmap { bits: bytes, total_blocks: bits.len() as u32 }
    }

    #[test]
    fn free_space_runs_coalesces_consecutive_bits() {
        let bitmap = bitmap_from_bits(&[true, true, false, false, false, true]);
        let runs = free_space_runs(&bitmap);
        assert_eq!(
            runs,
            vec![
                Run { start_block: 0, block_count: 2, used: true },
                Run { start_block: 2, block_count: 3, used: false },
                Run { start_block: 5, block_count: 1, used: true },
            ]
        );
    }

    #[test]
    fn top_k_free_returns_largest_runs_first() {
        let bitmap = bitmap_from_bits(&[false, true, false, false, true, false, false, false, false]);
        let top = top_k_free(&bitmap, 2);
        assert_eq!(top[0].block_count, 4);
        assert_eq!(top[1].block_count, 2);
    }
}
