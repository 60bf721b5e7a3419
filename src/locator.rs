//! Partition map detection and recursive descent to an HFS+/HFSX volume.
//!
//! Grounded on `volumes/mbr.c`, `volumes/apm.c`, `volumes/gpt.h` of the
//! original inspector: MBR at LBA 0, APM at sector 1, GPT header at
//! LBA 1, with an HFS wrapper ('BD' signature carrying an embedded 'H+'
//! sub-volume) checked directly against the top-level source as a
//! fourth probe.
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::Result;
use crate::source::Windowed;
use crate::volume::{VolumeHeader, HFS_PLUS_SIGNATURE, HFSX_SIGNATURE, VOLUME_HEADER_OFFSET};

pub const MBR_TYPE_GPT_PROTECTIVE: u8 = 0xEE;
pub const MBR_TYPE_APPLE_HFS: u8 = 0xAF;

/// How a partition was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionKind {
    /// Top-level probe against the raw source, no partition map found yet.
    None,
    Mbr(u8),
    Apm(String),
    Gpt(String),
}

#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub kind: PartitionKind,
    pub offset: u64,
    pub length: u64,
    pub is_hfs: bool,
}

/// Probe `reader` (already positioned at a partition or device start) for
/// an HFS+/HFSX volume header, descending through an HFS wrapper if one
/// is present. Returns the byte offset (relative to `reader`) at which
/// the real HFS+ volume header lives, or `None` if this source isn't
/// HFS+/HFSX/HFS-wrapped.
pub fn probe_hfs<R: Read + Seek>(reader: &mut R) -> Result<Option<u64>> {
    reader.seek(SeekFrom::Start(VOLUME_HEADER_OFFSET))?;
    let signature = reader.read_u16::<BigEndian>()?;
    if signature == HFS_PLUS_SIGNATURE || signature == HFSX_SIGNATURE {
        return Ok(Some(0));
    }

    // HFS wrapper: master directory block at the same offset, signature
    // 'BD' (0x4244), with a pointer (embedded volume's starting block and
    // allocation block size) to an embedded HFS+ volume.
    if signature == 0x4244 {
        reader.seek(SeekFrom::Start(VOLUME_HEADER_OFFSET + 0x14))?;
        let alloc_block_size = reader.read_u32::<BigEndian>()?;
        reader.seek(SeekFrom::Start(VOLUME_HEADER_OFFSET + 0x1C))?;
        let first_alloc_block = reader.read_u16::<BigEndian>()? as u64;
        reader.seek(SeekFrom::Start(VOLUME_HEADER_OFFSET + 0x7C))?;
        let embedded_start_block = reader.read_u16::<BigEndian>()? as u64;

        let embedded_offset =
            VOLUME_HEADER_OFFSET + first_alloc_block * 512 + embedded_start_block * alloc_block_size as u64;
        reader.seek(SeekFrom::Start(embedded_offset + VOLUME_HEADER_OFFSET))?;
        let inner_signature = reader.read_u16::<BigEndian>()?;
        if inner_signature == HFS_PLUS_SIGNATURE || inner_signature == HFSX_SIGNATURE {
            return Ok(Some(embedded_offset));
        }
    }

    Ok(None)
}

/// Enumerate top-level partitions of `reader` without opening any of
/// them as HFS+ volumes. Supports MBR, GPT-protective-MBR+GPT, and APM;
/// a source matching none of these is reported with a single `None`-kind
/// entry spanning the whole source (the caller should then try
/// [`probe_hfs`] directly).
pub fn list_partitions<R: Read + Seek>(reader: &mut R, sector_size: u64, total_len: u64) -> Result<Vec<PartitionInfo>> {
    if let Some(gpt) = try_gpt(reader, sector_size)? {
        return Ok(gpt);
    }
    if let Some(mbr) = try_mbr(reader, sector_size)? {
        return Ok(mbr);
    }
    if let Some(apm) = try_apm(reader, sector_size)? {
        return Ok(apm);
    }
    Ok(vec![PartitionInfo { kind: PartitionKind::None, offset: 0, length: total_len, is_hfs: false }])
}

fn try_mbr<R: Read + Seek>(reader: &mut R, sector_size: u64) -> Result<Option<Vec<PartitionInfo>>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut sector = vec![0u8; 512];
    if reader.read(&mut sector)? < 512 {
        return Ok(None);
    }
    if sector[510] != 0x55 || sector[511] != 0xAA {
        return Ok(None);
    }

    let mut partitions = Vec::new();
    for i in 0..4usize {
        let entry = &sector[446 + i * 16..446 + (i + 1) * 16];
        let ptype = entry[4];
        if ptype == 0 {
            continue;
        }
        let first_lba = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]) as u64;
        let sector_count = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]) as u64;

        if ptype == MBR_TYPE_GPT_PROTECTIVE {
            if let Some(gpt) = try_gpt(reader, sector_size)? {
                return Ok(Some(gpt));
            }
        }

        partitions.push(PartitionInfo {
            kind: PartitionKind::Mbr(ptype),
            offset: first_lba * sector_size,
            length: sector_count * sector_size,
            is_hfs: ptype == MBR_TYPE_APPLE_HFS,
        });
    }

    if partitions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(partitions))
    }
}

fn try_gpt<R: Read + Seek>(reader: &mut R, sector_size: u64) -> Result<Option<Vec<PartitionInfo>>> {
    reader.seek(SeekFrom::Start(sector_size))?;
    let mut signature = [0u8; 8];
    if reader.read(&mut signature)? < 8 {
        return Ok(None);
    }
    if &signature != b"EFI PART" {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(sector_size + 72))?;
    let partition_entry_lba = reader.read_u64::<LittleEndian>()?;
    reader.seek(SeekFrom::Start(sector_size + 80))?;
    let num_entries = reader.read_u32::<LittleEndian>()?;
    let entry_size = reader.read_u32::<LittleEndian>()?;

    let mut partitions = Vec::new();
    reader.seek(SeekFrom::Start(partition_entry_lba * sector_size))?;
    for _ in 0..num_entries {
        let mut entry = vec![0u8; entry_size as usize];
        if reader.read(&mut entry)? < entry_size as usize {
            break;
        }
        let type_guid = &entry[0..16];
        if type_guid.iter().all(|&b| b == 0) {
            continue;
        }
        let first_lba = u64::from_le_bytes(entry[32..40].try_into().unwrap());
        let last_lba = u64::from_le_bytes(entry[40..48].try_into().unwrap());
        let name_utf16: Vec<u16> = entry[56..128]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&c| c != 0)
            .collect();
        let name = String::from_utf16_lossy(&name_utf16);

        partitions.push(PartitionInfo {
            kind: PartitionKind::Gpt(name),
            offset: first_lba * sector_size,
            length: (last_lba - first_lba + 1) * sector_size,
            is_hfs: false,
        });
    }

    if partitions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(partitions))
    }
}

fn try_apm<R: Read + Seek>(reader: &mut R, sector_size: u64) -> Result<Option<Vec<PartitionInfo>>> {
    reader.seek(SeekFrom::Start(sector_size))?;
    let mut signature = [0u8; 2];
    if reader.read(&mut signature)? < 2 {
        return Ok(None);
    }
    if &signature != b"PM" {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(sector_size + 4))?;
    let map_entries = reader.read_u32::<BigEndian>()?;

    let mut partitions = Vec::new();
    for i in 0..map_entries {
        let entry_offset = sector_size * (1 + i as u64);
        reader.seek(SeekFrom::Start(entry_offset))?;
        let mut sig = [0u8; 2];
        if reader.read(&mut sig)? < 2 || &sig != b"PM" {
            break;
        }
        reader.seek(SeekFrom::Start(entry_offset + 8))?;
        let start_block = reader.read_u32::<BigEndian>()? as u64;
        let block_count = reader.read_u32::<BigEndian>()? as u64;
        let mut name_bytes = [0u8; 32];
        reader.read_exact(&mut name_bytes)?;
        let mut type_bytes = [0u8; 32];
        reader.read_exact(&mut type_bytes)?;
        let type_str = String::from_utf8_lossy(&type_bytes)
            .trim_end_matches('\0')
            .to_string();

        partitions.push(PartitionInfo {
            kind: PartitionKind::Apm(type_str.clone()),
            offset: start_block * sector_size,
            length: block_count * sector_size,
            is_hfs: type_str == "Apple_HFS" || type_str == "Apple_HFSX",
        });
    }

    if partitions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(partitions))
    }
}

/// Walk `reader` depth-first through any partition map and return the
/// first HFS+/HFSX volume header found, as a `Windowed` sub-source
/// already clipped to that partition (or the whole source, for a bare
/// top-level HFS+ image).
pub fn locate<R: Read + Seek>(mut reader: R, sector_size: u64, total_len: u64) -> Result<Option<(Windowed<R>, VolumeHeader)>> {
    if let Some(wrapper_offset) = probe_hfs(&mut reader)? {
        let mut window = Windowed::new(reader, wrapper_offset, total_len - wrapper_offset);
        let header = VolumeHeader::parse(&mut window)?;
        return Ok(Some((window, header)));
    }

    let partitions = list_partitions(&mut reader, sector_size, total_len)?;
    for p in partitions {
        if p.length == 0 {
            continue;
        }
        // Each candidate partition gets its own Windowed cursor seeked
        // independently; only the first HFS+-bearing one is returned.
        reader.seek(SeekFrom::Start(p.offset))?;
        let wrapper_offset = probe_hfs(&mut reader)?;
        if let Some(wrapper_offset) = wrapper_offset {
            let mut window = Windowed::new(reader, p.offset + wrapper_offset, p.length - wrapper_offset);
            let header = VolumeHeader::parse(&mut window)?;
            return Ok(Some((window, header)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn no_partition_map_no_hfs_signature_returns_none() {
        let data = vec![0u8; 4096];
        let mut cursor = Cursor::new(data);
        assert!(probe_hfs(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn bare_hfs_plus_signature_probes_at_zero_offset() {
        let mut data = vec![0u8; 2048];
        data[VOLUME_HEADER_OFFSET as usize] = 0x48;
        data[VOLUME_HEADER_OFFSET as usize + 1] = 0x2B;
        let mut cursor = Cursor::new(data);
        assert_eq!(probe_hfs(&mut cursor).unwrap(), Some(0));
    }
}
