//! Hotfiles B-tree: Apple's frequently-accessed-file tracker
//! (`.hotfiles.btree`), stored as an ordinary file directly under the
//! root folder on volumes that have ever been booted from.

use crate::error::{HfsError, Result};

pub const HOTFILES_FILENAME: &str = ".hotfiles.btree";

/// Sentinel temperature marking a thread/lookup record rather than a
/// real file entry.
pub const TEMPERATURE_LOOKUP_TAG: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotfileEntry {
    pub file_id: u32,
    pub fork_type: u8,
    pub temperature: u32,
}

fn parse_hotfile_key(record_data: &[u8]) -> Result<Option<HotfileEntry>> {
    if record_data.len() < 10 {
        return Err(HfsError::corrupt("hotfiles key too short"));
    }
    let fork_type = record_data[2];
    let temperature = u32::from_be_bytes([record_data[4], record_data[5], record_data[6], record_data[7]]);
    let file_id = u32::from_be_bytes([record_data[8], record_data[9], record_data[10], record_data[11]]);

    if temperature == TEMPERATURE_LOOKUP_TAG {
        return Ok(None);
    }
    Ok(Some(HotfileEntry { file_id, fork_type, temperature }))
}

/// Walk the hotfiles tree's leaf chain and rank entries by temperature,
/// descending. Apple's on-disk key ordering already sorts by ascending
/// temperature (`hfs_hotfiles_compare_keys`), but a post-walk sort is
/// used rather than relying on that order, since a corrupted
/// temperature field should not silently misrank the output.
pub fn rank<R: std::io::Read + std::io::Seek>(
    reader: &mut R,
    tree: &mut crate::btree::BTree,
    cancel: &crate::cancel::CancelToken,
) -> Result<Vec<HotfileEntry>> {
    let mut entries = Vec::new();
    tree.walk(reader, tree.header.first_leaf_node, cancel, &mut |record_data| {
        match parse_hotfile_key(record_data) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(_) => {}
        }
        std::ops::ControlFlow::Continue(())
    })?;

    entries.sort_by_key(|e| std::cmp::Reverse(e.temperature));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hotfile_key_skips_lookup_tag() {
        let mut record = vec![0u8; 12];
        record[2] = 0x00;
        record[4..8].copy_from_slice(&TEMPERATURE_LOOKUP_TAG.to_be_bytes());
        record[8..12].copy_from_slice(&42u32.to_be_bytes());
        assert_eq!(parse_hotfile_key(&record).unwrap(), None);
    }

    #[test]
    fn parse_hotfile_key_reads_real_entry() {
        let mut record = vec![0u8; 12];
        record[2] = 0xFF;
        record[4..8].copy_from_slice(&500u32.to_be_bytes());
        record[8..12].copy_from_slice(&42u32.to_be_bytes());
        let entry = parse_hotfile_key(&record).unwrap().unwrap();
        assert_eq!(entry, HotfileEntry { file_id: 42, fork_type: 0xFF, temperature: 500 });
    }
}
