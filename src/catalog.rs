//! Catalog B-tree specialization: key comparator, record parser, and the
//! path/CNID resolution algorithms built on top of the generic engine.

use byteorder::{BigEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::io::{Cursor, Read, Seek};
use std::ops::ControlFlow;

use crate::btree::{BTree, KEY_COMPARE_BINARY, KEY_COMPARE_CASE_FOLDING};
use crate::cancel::CancelToken;
use crate::error::{Diagnostic, HfsError, Result};
use crate::unicode;
use crate::volume::{ExtentDescriptor, ForkData, VolumeHeader};

/// Well-known Catalog Node IDs.
pub const CNID_ROOT_PARENT: u32 = 1;
pub const CNID_ROOT_FOLDER: u32 = 2;
pub const CNID_EXTENTS_FILE: u32 = 3;
pub const CNID_CATALOG_FILE: u32 = 4;
pub const CNID_BAD_BLOCKS_FILE: u32 = 5;
pub const CNID_ALLOCATION_FILE: u32 = 6;
pub const CNID_STARTUP_FILE: u32 = 7;
pub const CNID_ATTRIBUTES_FILE: u32 = 8;
pub const CNID_REPAIR_CATALOG_FILE: u32 = 14;
pub const CNID_BOGUS_EXTENT_FILE: u32 = 15;
pub const CNID_FIRST_USER_FILE: u32 = 16;

/// Catalog record types.
pub const RECORD_TYPE_FOLDER: u16 = 0x0001;
pub const RECORD_TYPE_FILE: u16 = 0x0002;
pub const RECORD_TYPE_FOLDER_THREAD: u16 = 0x0003;
pub const RECORD_TYPE_FILE_THREAD: u16 = 0x0004;

/// Finder flag: item is an alias.
pub const FINDER_FLAG_IS_ALIAS: u16 = 0x8000;
/// Catalog record flag: folder/file participates in a hard-link chain.
pub const FLAG_HAS_LINK_CHAIN: u16 = 0x0020;

#[derive(Debug, Clone)]
pub struct HfsPlusBsdInfo {
    pub owner_id: u32,
    pub group_id: u32,
    pub admin_flags: u8,
    pub owner_flags: u8,
    pub file_mode: u16,
    pub special: u32,
}

/// The 32-byte Finder info blob carried by every file/folder record:
/// 16 bytes of `FinderInfo` (type/creator/flags/location) followed by
/// 16 bytes of record-specific extended info. The teacher's parser
/// skipped this as an opaque blob; decoding it is required for the
/// hard-link/alias/symlink classification predicates below.
#[derive(Debug, Clone, Default)]
pub struct FinderInfo {
    pub file_type: [u8; 4],
    pub file_creator: [u8; 4],
    pub finder_flags: u16,
    pub location: (i16, i16),
    pub reserved_field: u16,
    pub extended_flags: u16,
    pub extended_reserved: [u8; 14],
}

fn parse_finder_info(cursor: &mut Cursor<&[u8]>) -> Result<FinderInfo> {
    let mut file_type = [0u8; 4];
    cursor.read_exact(&mut file_type)?;
    let mut file_creator = [0u8; 4];
    cursor.read_exact(&mut file_creator)?;
    let finder_flags = cursor.read_u16::<BigEndian>()?;
    let v = cursor.read_i16::<BigEndian>()?;
    let h = cursor.read_i16::<BigEndian>()?;
    let reserved_field = cursor.read_u16::<BigEndian>()?;

    // Extended finder info: reserved1[4], extended_flags(u16), reserved2(u16), reserved3[8]
    let mut ext_reserved1 = [0u8; 4];
    cursor.read_exact(&mut ext_reserved1)?;
    let extended_flags = cursor.read_u16::<BigEndian>()?;
    let _ext_reserved2 = cursor.read_u16::<BigEndian>()?;
    let mut ext_reserved3 = [0u8; 8];
    cursor.read_exact(&mut ext_reserved3)?;

    let mut extended_reserved = [0u8; 14];
    extended_reserved[..4].copy_from_slice(&ext_reserved1);
    extended_reserved[4..6].copy_from_slice(&_ext_reserved2.to_be_bytes());
    extended_reserved[6..].copy_from_slice(&ext_reserved3);

    Ok(FinderInfo {
        file_type,
        file_creator,
        finder_flags,
        location: (v, h),
        reserved_field,
        extended_flags,
        extended_reserved,
    })
}

#[derive(Debug, Clone)]
pub struct CatalogFile {
    pub file_id: u32,
    pub flags: u16,
    pub create_date: u32,
    pub content_mod_date: u32,
    pub attribute_mod_date: u32,
    pub access_date: u32,
    pub backup_date: u32,
    pub permissions: HfsPlusBsdInfo,
    pub finder_info: FinderInfo,
    pub data_fork: ForkData,
    pub resource_fork: ForkData,
    pub text_encoding: u32,
}

#[derive(Debug, Clone)]
pub struct CatalogFolder {
    pub folder_id: u32,
    pub flags: u16,
    pub create_date: u32,
    pub content_mod_date: u32,
    pub attribute_mod_date: u32,
    pub access_date: u32,
    pub backup_date: u32,
    pub permissions: HfsPlusBsdInfo,
    pub finder_info: FinderInfo,
    pub valence: u32,
    pub text_encoding: u32,
}

#[derive(Debug, Clone)]
pub struct CatalogThread {
    pub parent_id: u32,
    pub node_name: String,
    /// `Some(raw_length)` if the stored name length exceeded 255 UTF-16
    /// code units and was clamped.
    pub name_clamped: Option<usize>,
    /// Set if the stored code units didn't form valid UTF-16 and
    /// `node_name` was replaced with the `"<invalid>"` sentinel.
    pub name_invalid: bool,
}

#[derive(Debug, Clone)]
pub enum CatalogRecord {
    Folder(CatalogFolder),
    File(CatalogFile),
    FolderThread(CatalogThread),
    FileThread(CatalogThread),
}

#[derive(Debug, Clone)]
pub struct CatalogKey {
    pub parent_id: u32,
    pub node_name: Vec<u16>,
}

/// Parses a catalog key, returning the key, the byte offset of the
/// record that follows it, and `Some(raw_length)` if the stored name
/// length exceeded 255 UTF-16 code units and had to be clamped.
fn parse_catalog_key(data: &[u8]) -> Result<(CatalogKey, usize, Option<usize>)> {
    if data.len() < 6 {
        return Err(HfsError::corrupt("catalog key too short"));
    }

    let key_length = u16::from_be_bytes([data[0], data[1]]) as usize;
    let parent_id = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    let name_length_raw = u16::from_be_bytes([data[6], data[7]]) as usize;
    let name_length = name_length_raw.min(255);
    let clamped = (name_length_raw > 255).then_some(name_length_raw);

    let name_start = 8;
    let name_end = name_start + name_length * 2;
    if name_end > data.len() {
        return Err(HfsError::corrupt(format!(
            "catalog key name extends beyond data: name_end={name_end}, data_len={}",
            data.len()
        )));
    }

    let node_name = unicode::utf16be_to_u16(&data[name_start..name_end]);

    let mut record_offset = 2 + key_length;
    if !record_offset.is_multiple_of(2) {
        record_offset += 1;
    }

    Ok((CatalogKey { parent_id, node_name }, record_offset, clamped))
}

fn parse_bsd_info(cursor: &mut Cursor<&[u8]>) -> Result<HfsPlusBsdInfo> {
    Ok(HfsPlusBsdInfo {
        owner_id: cursor.read_u32::<BigEndian>()?,
        group_id: cursor.read_u32::<BigEndian>()?,
        admin_flags: cursor.read_u8()?,
        owner_flags: cursor.read_u8()?,
        file_mode: cursor.read_u16::<BigEndian>()?,
        special: cursor.read_u32::<BigEndian>()?,
    })
}

fn read_extent_descriptor(cursor: &mut Cursor<&[u8]>) -> Result<ExtentDescriptor> {
    Ok(ExtentDescriptor { start_block: cursor.read_u32::<BigEndian>()?, block_count: cursor.read_u32::<BigEndian>()? })
}

fn parse_fork_data(cursor: &mut Cursor<&[u8]>) -> Result<ForkData> {
    let logical_size = cursor.read_u64::<BigEndian>()?;
    let clump_size = cursor.read_u32::<BigEndian>()?;
    let total_blocks = cursor.read_u32::<BigEndian>()?;
    let mut extents = [ExtentDescriptor::default(); 8];
    for extent in &mut extents {
        *extent = read_extent_descriptor(cursor)?;
    }
    Ok(ForkData { logical_size, clump_size, total_blocks, extents })
}

fn parse_catalog_record(data: &[u8]) -> Result<CatalogRecord> {
    if data.len() < 2 {
        return Err(HfsError::corrupt("catalog record too short"));
    }

    let record_type = u16::from_be_bytes([data[0], data[1]]);
    let mut cursor = Cursor::new(data);
    cursor.set_position(2);

    match record_type {
        RECORD_TYPE_FOLDER => {
            let flags = cursor.read_u16::<BigEndian>()?;
            let valence = cursor.read_u32::<BigEndian>()?;
            let folder_id = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let content_mod_date = cursor.read_u32::<BigEndian>()?;
            let attribute_mod_date = cursor.read_u32::<BigEndian>()?;
            let access_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            let permissions = parse_bsd_info(&mut cursor)?;
            let finder_info = parse_finder_info(&mut cursor)?;
            let text_encoding = cursor.read_u32::<BigEndian>()?;

            Ok(CatalogRecord::Folder(CatalogFolder {
                folder_id,
                flags,
                create_date,
                content_mod_date,
                attribute_mod_date,
                access_date,
                backup_date,
                permissions,
                finder_info,
                valence,
                text_encoding,
            }))
        }
        RECORD_TYPE_FILE => {
            let flags = cursor.read_u16::<BigEndian>()?;
            let _reserved = cursor.read_u32::<BigEndian>()?;
            let file_id = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let content_mod_date = cursor.read_u32::<BigEndian>()?;
            let attribute_mod_date = cursor.read_u32::<BigEndian>()?;
            let access_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            let permissions = parse_bsd_info(&mut cursor)?;
            let finder_info = parse_finder_info(&mut cursor)?;
            let text_encoding = cursor.read_u32::<BigEndian>()?;
            let _reserved2 = cursor.read_u32::<BigEndian>()?;
            let data_fork = parse_fork_data(&mut cursor)?;
            let resource_fork = parse_fork_data(&mut cursor)?;

            Ok(CatalogRecord::File(CatalogFile {
                file_id,
                flags,
                create_date,
                content_mod_date,
                attribute_mod_date,
                access_date,
                backup_date,
                permissions,
                finder_info,
                data_fork,
                resource_fork,
                text_encoding,
            }))
        }
        RECORD_TYPE_FOLDER_THREAD | RECORD_TYPE_FILE_THREAD => {
            let _reserved = cursor.read_u16::<BigEndian>()?;
            let parent_id = cursor.read_u32::<BigEndian>()?;
            let name_length_raw = cursor.read_u16::<BigEndian>()? as usize;
            let name_length = name_length_raw.min(255);
            let name_clamped = (name_length_raw > 255).then_some(name_length_raw);
            let mut name_buf = vec![0u8; name_length * 2];
            cursor.read_exact(&mut name_buf)?;
            let name_u16 = unicode::utf16be_to_u16(&name_buf);
            let (node_name, name_invalid) = unicode::utf16_to_string(&name_u16);

            let record = CatalogThread { parent_id, node_name, name_clamped, name_invalid };
            if record_type == RECORD_TYPE_FOLDER_THREAD {
                Ok(CatalogRecord::FolderThread(record))
            } else {
                Ok(CatalogRecord::FileThread(record))
            }
        }
        other => Err(HfsError::corrupt(format!("unknown catalog record type: 0x{other:04X}"))),
    }
}

/// Record classification predicates, grounded on the Finder info fields
/// the teacher's parser discarded.
pub mod classify {
    use super::{CatalogFile, CatalogFolder, FinderInfo, FINDER_FLAG_IS_ALIAS, FLAG_HAS_LINK_CHAIN};

    fn is(tag: &[u8; 4], s: &[u8; 4]) -> bool {
        tag == s
    }

    pub fn is_file_hard_link(f: &CatalogFile) -> bool {
        is(&f.finder_info.file_creator, b"hlnk") && is(&f.finder_info.file_type, b"hlnk")
    }

    /// Folder-hard-link predicate: broader of the two shapes Apple's own
    /// source checks at different call sites (link-chain flag plus the
    /// folder-alias Finder stamp), applied to a folder record directly.
    pub fn is_directory_hard_link(flags: u16, finder_info: &FinderInfo) -> bool {
        flags & FLAG_HAS_LINK_CHAIN != 0 && is(&finder_info.file_creator, b"MACS") && is(&finder_info.file_type, b"fdrp")
    }

    pub fn folder_is_directory_hard_link(f: &CatalogFolder) -> bool {
        is_directory_hard_link(f.flags, &f.finder_info)
    }

    pub fn is_symlink(f: &CatalogFile) -> bool {
        is(&f.finder_info.file_creator, b"rhap") && is(&f.finder_info.file_type, b"slnk")
    }

    pub fn is_alias(f: &CatalogFile) -> bool {
        f.finder_info.finder_flags & FINDER_FLAG_IS_ALIAS != 0
            && is(&f.finder_info.file_creator, b"MACS")
            && (is(&f.finder_info.file_type, b"alis") || is(&f.finder_info.file_type, b"fdrp"))
    }
}

/// Choose the comparator for a catalog tree: the B-tree header's
/// `key_compare_type` decides (0xCF case-folding / 0xBC binary); an
/// unrecognized value falls back to the volume's HFSX-ness.
fn select_comparator(key_compare_type: u32, is_hfsx: bool) -> bool {
    match key_compare_type {
        KEY_COMPARE_BINARY => true,
        KEY_COMPARE_CASE_FOLDING => false,
        _ => is_hfsx,
    }
}

fn catalog_key_ordering(record_data: &[u8], target_parent_id: u32, target_name: &[u16], binary: bool) -> Ordering {
    let (key, _, _) = match parse_catalog_key(record_data) {
        Ok(k) => k,
        Err(_) => return Ordering::Less,
    };

    match key.parent_id.cmp(&target_parent_id) {
        Ordering::Equal => {}
        ord => return ord,
    }

    if binary {
        unicode::compare_binary(&key.node_name, target_name)
    } else {
        unicode::compare_case_insensitive(&key.node_name, target_name)
    }
}

pub fn lookup_catalog<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    parent_id: u32,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<CatalogRecord>> {
    let name_u16 = unicode::string_to_utf16(name);
    let binary = select_comparator(tree.header.key_compare_type, vol.is_hfsx);

    let found = tree.search(reader, &|record_data: &[u8]| catalog_key_ordering(record_data, parent_id, &name_u16, binary))?;
    match found {
        Some((node_number, record_idx)) => {
            let node = tree.get_node(reader, node_number)?;
            let record_data = node.record_data(record_idx)?;
            let (_, record_offset, clamped) = parse_catalog_key(record_data)?;
            if record_offset >= record_data.len() {
                return Err(HfsError::corrupt("record data missing after key"));
            }
            let record = parse_catalog_record(&record_data[record_offset..])?;
            if let Some(raw) = clamped {
                diagnostics.push(Diagnostic::NameClamped { cnid: record_cnid(&record), stored_length: raw });
            }
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn record_cnid(record: &CatalogRecord) -> u32 {
    match record {
        CatalogRecord::Folder(f) => f.folder_id,
        CatalogRecord::File(f) => f.file_id,
        CatalogRecord::FolderThread(_) | CatalogRecord::FileThread(_) => 0,
    }
}

/// Entry kind surfaced by directory listings — `EntryKind` in `lib.rs`
/// re-exports this under its public name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub cnid: u32,
    pub kind: EntryKind,
    pub size: u64,
    pub create_date: u32,
    pub modify_date: u32,
}

/// Aggregate tallies alongside the raw entries, the counterpart of the
/// per-directory summary a directory-browsing tool would want without
/// re-scanning.
#[derive(Debug, Clone, Default)]
pub struct FolderListing {
    pub entries: Vec<DirEntry>,
    pub file_count: u32,
    pub folder_count: u32,
    pub empty_file_count: u32,
    pub data_fork_count: u32,
    pub data_fork_size: u64,
    pub resource_fork_count: u32,
    pub resource_fork_size: u64,
    pub hard_link_count: u32,
    pub directory_hard_link_count: u32,
    pub symlink_count: u32,
    pub alias_count: u32,
}

/// List all entries directly under `parent_cnid`, skipping thread
/// records, via `search_leaf` to the first candidate leaf then a forward
/// scan while `key.parent_id == parent_cnid`.
pub fn list_directory<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    parent_cnid: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<FolderListing> {
    let empty_name: Vec<u16> = vec![];
    let binary = select_comparator(tree.header.key_compare_type, vol.is_hfsx);

    let start_node =
        tree.search_leaf(reader, &|record_data: &[u8]| catalog_key_ordering(record_data, parent_cnid, &empty_name, binary))?;

    let Some(start_node) = start_node else {
        return Ok(FolderListing::default());
    };

    let mut listing = FolderListing::default();
    tree.walk(reader, start_node, &CancelToken::new(), &mut |record_data| {
        let (key, record_offset, clamped) = match parse_catalog_key(record_data) {
            Ok(v) => v,
            Err(_) => return ControlFlow::Continue(()),
        };
        if key.parent_id < parent_cnid {
            return ControlFlow::Continue(());
        }
        if key.parent_id > parent_cnid {
            return ControlFlow::Break(());
        }

        if record_offset >= record_data.len() {
            return ControlFlow::Continue(());
        }
        let record = match parse_catalog_record(&record_data[record_offset..]) {
            Ok(r) => r,
            Err(_) => return ControlFlow::Continue(()),
        };
        let (name, name_invalid) = unicode::utf16_to_string(&key.node_name);
        let cnid = record_cnid(&record);
        if let Some(raw) = clamped {
            diagnostics.push(Diagnostic::NameClamped { cnid, stored_length: raw });
        }
        if name_invalid {
            diagnostics.push(Diagnostic::InvalidName { cnid });
        }

        match record {
            CatalogRecord::Folder(f) => {
                listing.folder_count += 1;
                if classify::folder_is_directory_hard_link(&f) {
                    listing.directory_hard_link_count += 1;
                }
                listing.entries.push(DirEntry {
                    name,
                    cnid: f.folder_id,
                    kind: EntryKind::Directory,
                    size: 0,
                    create_date: f.create_date,
                    modify_date: f.content_mod_date,
                });
            }
            CatalogRecord::File(f) => {
                listing.file_count += 1;
                if f.data_fork.logical_size == 0 {
                    listing.empty_file_count += 1;
                }
                if f.data_fork.total_blocks > 0 {
                    listing.data_fork_count += 1;
                    listing.data_fork_size += f.data_fork.logical_size;
                }
                if f.resource_fork.total_blocks > 0 {
                    listing.resource_fork_count += 1;
                    listing.resource_fork_size += f.resource_fork.logical_size;
                }
                if classify::is_file_hard_link(&f) {
                    listing.hard_link_count += 1;
                }
                if classify::is_alias(&f) {
                    listing.alias_count += 1;
                }
                let kind = if classify::is_symlink(&f) {
                    listing.symlink_count += 1;
                    EntryKind::Symlink
                } else {
                    EntryKind::File
                };
                listing.entries.push(DirEntry {
                    name,
                    cnid: f.file_id,
                    kind,
                    size: f.data_fork.logical_size,
                    create_date: f.create_date,
                    modify_date: f.content_mod_date,
                });
            }
            CatalogRecord::FolderThread(_) | CatalogRecord::FileThread(_) => {}
        }
        ControlFlow::Continue(())
    })?;

    Ok(listing)
}

/// Raise diagnostics for a thread record's own name-decode problems,
/// tagged against the thread's own CNID (it is the (cnid, empty-name)
/// key that was matched to find it).
fn raise_thread_diagnostics(cnid: u32, thread: &CatalogThread, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(raw) = thread.name_clamped {
        diagnostics.push(Diagnostic::NameClamped { cnid, stored_length: raw });
    }
    if thread.name_invalid {
        diagnostics.push(Diagnostic::InvalidName { cnid });
    }
}

/// Resolve a CNID to its stored name via its thread record.
pub fn name_of<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    cnid: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String> {
    let empty_name: Vec<u16> = vec![];
    let binary = select_comparator(tree.header.key_compare_type, vol.is_hfsx);
    let found = tree.search(reader, &|record_data: &[u8]| catalog_key_ordering(record_data, cnid, &empty_name, binary))?;
    match found {
        Some((node_number, record_idx)) => {
            let node = tree.get_node(reader, node_number)?;
            let record_data = node.record_data(record_idx)?;
            let (_, record_offset, _) = parse_catalog_key(record_data)?;
            match parse_catalog_record(&record_data[record_offset..])? {
                CatalogRecord::FolderThread(t) | CatalogRecord::FileThread(t) => {
                    raise_thread_diagnostics(cnid, &t, diagnostics);
                    Ok(t.node_name)
                }
                _ => Err(HfsError::corrupt("expected thread record at (cnid, empty name)")),
            }
        }
        None => Err(HfsError::not_found(format!("cnid {cnid}"))),
    }
}

/// Resolve a CNID directly to its file/folder record, following its
/// thread record to find the (parent_id, name) needed for the real hit.
pub fn record_of<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    cnid: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<CatalogRecord> {
    let empty_name: Vec<u16> = vec![];
    let binary = select_comparator(tree.header.key_compare_type, vol.is_hfsx);
    let found = tree.search(reader, &|record_data: &[u8]| catalog_key_ordering(record_data, cnid, &empty_name, binary))?;
    let (parent_id, name) = match found {
        Some((node_number, record_idx)) => {
            let node = tree.get_node(reader, node_number)?;
            let record_data = node.record_data(record_idx)?;
            let (_, record_offset, _) = parse_catalog_key(record_data)?;
            match parse_catalog_record(&record_data[record_offset..])? {
                CatalogRecord::FolderThread(t) | CatalogRecord::FileThread(t) => {
                    raise_thread_diagnostics(cnid, &t, diagnostics);
                    (t.parent_id, t.node_name)
                }
                _ => return Err(HfsError::corrupt("expected thread record at (cnid, empty name)")),
            }
        }
        None => return Err(HfsError::not_found(format!("cnid {cnid}"))),
    };

    lookup_catalog(reader, vol, tree, parent_id, &name, diagnostics)?
        .ok_or_else(|| HfsError::corrupt(format!("thread for cnid {cnid} dangles")))
}

/// Resolve a CNID to its path, rooted at `/`. Iteratively follows thread
/// records (cnid -> parent_id, name), prepending names, stopping once
/// the CNID being resolved is the root folder itself.
pub fn path_of<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    cnid: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String> {
    if cnid == CNID_ROOT_FOLDER {
        return Ok("/".to_string());
    }

    let mut components = Vec::new();
    let mut current = cnid;

    loop {
        let empty_name: Vec<u16> = vec![];
        let binary = select_comparator(tree.header.key_compare_type, vol.is_hfsx);
        let found =
            tree.search(reader, &|record_data: &[u8]| catalog_key_ordering(record_data, current, &empty_name, binary))?;
        let (parent_id, name) = match found {
            Some((node_number, record_idx)) => {
                let node = tree.get_node(reader, node_number)?;
                let record_data = node.record_data(record_idx)?;
                let (_, record_offset, _) = parse_catalog_key(record_data)?;
                match parse_catalog_record(&record_data[record_offset..])? {
                    CatalogRecord::FolderThread(t) | CatalogRecord::FileThread(t) => {
                        raise_thread_diagnostics(current, &t, diagnostics);
                        (t.parent_id, t.node_name)
                    }
                    _ => return Err(HfsError::corrupt("expected thread record during path resolution")),
                }
            }
            None => return Err(HfsError::not_found(format!("cnid {current}"))),
        };

        components.push(name);
        if parent_id == CNID_ROOT_FOLDER {
            break;
        }
        current = parent_id;
    }

    components.reverse();
    Ok(format!("/{}", components.join("/")))
}

/// Resolve a `/`-separated path to its catalog record. Repeated slashes
/// are tolerated. A thread record hit mid-walk indicates a corrupt tree.
pub fn record_by_path<R: Read + Seek>(
    reader: &mut R,
    vol: &VolumeHeader,
    tree: &mut BTree,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(CatalogRecord, String)> {
    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if components.is_empty() {
        return Ok((record_of(reader, vol, tree, CNID_ROOT_FOLDER, diagnostics)?, String::new()));
    }

    let mut current_parent = CNID_ROOT_FOLDER;
    for (i, component) in components.iter().enumerate() {
        match lookup_catalog(reader, vol, tree, current_parent, component, diagnostics)? {
            Some(record) => {
                if i == components.len() - 1 {
                    return Ok((record, component.to_string()));
                }
                match &record {
                    CatalogRecord::Folder(f) => current_parent = f.folder_id,
                    CatalogRecord::File(_) => return Err(HfsError::not_a_directory(components[..=i].join("/"))),
                    _ => return Err(HfsError::corrupt("unexpected thread record in path resolution")),
                }
            }
            None => return Err(HfsError::not_found(components[..=i].join("/"))),
        }
    }

    unreachable!("components is non-empty")
}

/// Walk the entire catalog leaf chain from its first leaf, invoking
/// `visit` for every file record. Folders and thread records are
/// skipped — this is the shared traversal the allocation analyses
/// (fragmentation scan, block-range inspection) build on.
pub fn walk_files<R: Read + Seek>(
    reader: &mut R,
    tree: &mut BTree,
    cancel: &CancelToken,
    visit: &mut dyn FnMut(&CatalogFile) -> ControlFlow<()>,
) -> Result<()> {
    let first_leaf = tree.header.first_leaf_node;
    tree.walk(reader, first_leaf, cancel, &mut |record_data| {
        let Ok((_, record_offset, _)) = parse_catalog_key(record_data) else {
            return ControlFlow::Continue(());
        };
        if record_offset >= record_data.len() {
            return ControlFlow::Continue(());
        }
        match parse_catalog_record(&record_data[record_offset..]) {
            Ok(CatalogRecord::File(file)) => visit(&file),
            _ => ControlFlow::Continue(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_catalog_key_reports_clamp_for_oversized_name() {
        let name_length_raw: u16 = 300;
        let mut data = vec![0u8; 8 + 255 * 2];
        data[0..2].copy_from_slice(&20u16.to_be_bytes());
        data[2..6].copy_from_slice(&2u32.to_be_bytes());
        data[6..8].copy_from_slice(&name_length_raw.to_be_bytes());

        let (key, _, clamped) = parse_catalog_key(&data).unwrap();
        assert_eq!(clamped, Some(300));
        assert_eq!(key.node_name.len(), 255);
    }

    #[test]
    fn parse_catalog_key_reports_no_clamp_for_ordinary_name() {
        let mut data = vec![0u8; 8 + 4 * 2];
        data[0..2].copy_from_slice(&12u16.to_be_bytes());
        data[2..6].copy_from_slice(&2u32.to_be_bytes());
        data[6..8].copy_from_slice(&4u16.to_be_bytes());

        let (_, _, clamped) = parse_catalog_key(&data).unwrap();
        assert_eq!(clamped, None);
    }

    #[test]
    fn classify_file_hard_link() {
        let mut f = blank_file();
        f.finder_info.file_creator = *b"hlnk";
        f.finder_info.file_type = *b"hlnk";
        assert!(classify::is_file_hard_link(&f));
        assert!(!classify::is_symlink(&f));
    }

    #[test]
    fn classify_symlink() {
        let mut f = blank_file();
        f.finder_info.file_creator = *b"rhap";
        f.finder_info.file_type = *b"slnk";
        assert!(classify::is_symlink(&f));
    }

    #[test]
    fn classify_alias() {
        let mut f = blank_file();
        f.finder_info.finder_flags = FINDER_FLAG_IS_ALIAS;
        f.finder_info.file_creator = *b"MACS";
        f.finder_info.file_type = *b"alis";
        assert!(classify::is_alias(&f));
    }

    fn blank_file() -> CatalogFile {
        CatalogFile {
            file_id: 0,
            flags: 0,
            create_date: 0,
            content_mod_date: 0,
            attribute_mod_date: 0,
            access_date: 0,
            backup_date: 0,
            permissions: HfsPlusBsdInfo { owner_id: 0, group_id: 0, admin_flags: 0, owner_flags: 0, file_mode: 0, special: 0 },
            finder_info: FinderInfo::default(),
            data_fork: ForkData::default(),
            resource_fork: ForkData::default(),
            text_encoding: 0,
        }
    }
}
