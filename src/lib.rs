pub mod allocation;
pub mod attributes;
pub mod btree;
pub mod cancel;
pub mod catalog;
pub mod error;
pub mod extentlist;
pub mod fork;
pub mod hotfiles;
pub mod locator;
pub mod source;
pub mod unicode;
pub mod volume;

pub use cancel::CancelToken;
pub use catalog::{DirEntry, EntryKind, FolderListing};
pub use error::{Diagnostic, HfsError, Result};
pub use locator::PartitionInfo;
pub use volume::VolumeHeader;

use std::io::{Read, Seek, SeekFrom, Write};

use btree::BTree;
use catalog::{CatalogFile, CatalogRecord, CNID_ATTRIBUTES_FILE, CNID_CATALOG_FILE, CNID_ROOT_FOLDER};
use extentlist::ExtentList;
use fork::{Fork, ForkReader, FORK_TYPE_DATA, FORK_TYPE_RESOURCE};
use source::Windowed;

/// Default sector size assumed for MBR/APM/GPT probing when the caller
/// doesn't otherwise know it (the near-universal case for disk images).
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// HFS+ permissions (BSD-style)
#[derive(Debug, Clone)]
pub struct HfsPermissions {
    pub owner_id: u32,
    pub group_id: u32,
    pub mode: u16,
}

/// Detailed file/directory metadata
#[derive(Debug, Clone)]
pub struct FileStat {
    pub cnid: u32,
    pub kind: EntryKind,
    pub size: u64,
    pub create_date: u32,
    pub modify_date: u32,
    pub permissions: HfsPermissions,
    pub data_fork_extents: u32,
    pub resource_fork_size: u64,
    pub is_hard_link: bool,
    pub is_symlink: bool,
    pub is_alias: bool,
}

/// Entry from `Volume::walk` — includes the full path.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub entry: DirEntry,
}

/// Enumerate a raw source's top-level partitions without opening any of
/// them, using [`DEFAULT_SECTOR_SIZE`].
pub fn list_partitions<R: Read + Seek>(mut reader: R) -> Result<Vec<PartitionInfo>> {
    let total_len = reader.seek(SeekFrom::End(0))?;
    locator::list_partitions(&mut reader, DEFAULT_SECTOR_SIZE, total_len)
}

/// A read-only HFS+/HFSX volume: the parsed header plus the open
/// catalog/extents-overflow B-trees, with attributes and hotfiles
/// opened lazily on first use.
pub struct Volume<R: Read + Seek> {
    reader: Windowed<R>,
    header: VolumeHeader,
    catalog_tree: BTree,
    extents_tree: BTree,
    attributes_tree: Option<BTree>,
    hotfiles_tree: Option<BTree>,
}

impl<R: Read + Seek> Volume<R> {
    /// Locate and open the first HFS+/HFSX volume found in `reader`,
    /// descending through any MBR/APM/GPT partition map or HFS wrapper.
    pub fn open(mut reader: R) -> Result<Self> {
        let total_len = reader.seek(SeekFrom::End(0))?;
        let located = locator::locate(reader, DEFAULT_SECTOR_SIZE, total_len)?;
        let (mut window, header) = located.ok_or_else(|| HfsError::not_found("HFS+/HFSX volume"))?;

        let mut extents_only = ExtentList::new();
        extents_only.ingest_descriptors(&header.extents_file.extents);
        let mut extents_tree = BTree::open(&mut window, extents_only, header.block_size)?;

        let catalog_fork = Fork::open(
            &mut window,
            &mut extents_tree,
            &header.catalog_file,
            FORK_TYPE_DATA,
            CNID_CATALOG_FILE,
            header.block_size,
        )?;
        let catalog_tree = BTree::open(&mut window, catalog_fork.extents.clone(), header.block_size)?;

        let attributes_tree = if header.attributes_file.total_blocks > 0 {
            let fork = Fork::open(
                &mut window,
                &mut extents_tree,
                &header.attributes_file,
                FORK_TYPE_DATA,
                CNID_ATTRIBUTES_FILE,
                header.block_size,
            )?;
            Some(BTree::open(&mut window, fork.extents.clone(), header.block_size)?)
        } else {
            None
        };

        Ok(Volume { reader: window, header, catalog_tree, extents_tree, attributes_tree, hotfiles_tree: None })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Open a fork of an arbitrary CNID by fork type, consulting the
    /// extents-overflow tree as needed.
    pub fn open_fork(&mut self, cnid: u32, fork_type: u8, diagnostics: &mut Vec<Diagnostic>) -> Result<ForkReader<'_, Windowed<R>>> {
        let record = catalog::record_of(&mut self.reader, &self.header, &mut self.catalog_tree, cnid, diagnostics)?;
        let fork_data = match (&record, fork_type) {
            (CatalogRecord::File(f), t) if t == FORK_TYPE_DATA => f.data_fork.clone(),
            (CatalogRecord::File(f), t) if t == FORK_TYPE_RESOURCE => f.resource_fork.clone(),
            (CatalogRecord::File(_), _) => return Err(HfsError::invalid_argument("unknown fork type")),
            (CatalogRecord::Folder(_), _) => return Err(HfsError::not_a_directory(format!("cnid {cnid}"))),
            _ => return Err(HfsError::corrupt("unexpected thread record")),
        };
        let fork = Fork::open(&mut self.reader, &mut self.extents_tree, &fork_data, fork_type, cnid, self.header.block_size)?;
        Ok(ForkReader::new(&mut self.reader, fork))
    }

    pub fn list_directory(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<FolderListing> {
        let cnid = self.resolve_path_to_cnid(path, diagnostics)?;
        catalog::list_directory(&mut self.reader, &self.header, &mut self.catalog_tree, cnid, diagnostics)
    }

    pub fn path_of(&mut self, cnid: u32, diagnostics: &mut Vec<Diagnostic>) -> Result<String> {
        catalog::path_of(&mut self.reader, &self.header, &mut self.catalog_tree, cnid, diagnostics)
    }

    pub fn record_by_path(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<(CatalogRecord, String)> {
        catalog::record_by_path(&mut self.reader, &self.header, &mut self.catalog_tree, path, diagnostics)
    }

    /// Read an entire file into memory.
    pub fn read_file(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_file_to(path, &mut buf, diagnostics)?;
        Ok(buf)
    }

    /// Open a file for streaming `Read + Seek` access without loading it
    /// into memory.
    pub fn open_file(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<ForkReader<'_, Windowed<R>>> {
        let file = self.resolve_path_to_file(path, diagnostics)?;
        let fork =
            Fork::open(&mut self.reader, &mut self.extents_tree, &file.data_fork, FORK_TYPE_DATA, file.file_id, self.header.block_size)?;
        Ok(ForkReader::new(&mut self.reader, fork))
    }

    /// Stream a file's data fork to a writer.
    pub fn read_file_to<W: Write>(&mut self, path: &str, mut writer: W, diagnostics: &mut Vec<Diagnostic>) -> Result<u64> {
        let mut reader = self.open_file(path, diagnostics)?;
        Ok(std::io::copy(&mut reader, &mut writer)?)
    }

    pub fn stat(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<FileStat> {
        let (record, _name) = self.resolve_path_to_record(path, diagnostics)?;
        match record {
            CatalogRecord::File(f) => Ok(FileStat {
                cnid: f.file_id,
                kind: if catalog::classify::is_symlink(&f) { EntryKind::Symlink } else { EntryKind::File },
                size: f.data_fork.logical_size,
                create_date: f.create_date,
                modify_date: f.content_mod_date,
                permissions: HfsPermissions { owner_id: f.permissions.owner_id, group_id: f.permissions.group_id, mode: f.permissions.file_mode },
                data_fork_extents: f.data_fork.extents.iter().filter(|e| e.block_count > 0).count() as u32,
                resource_fork_size: f.resource_fork.logical_size,
                is_hard_link: catalog::classify::is_file_hard_link(&f),
                is_symlink: catalog::classify::is_symlink(&f),
                is_alias: catalog::classify::is_alias(&f),
            }),
            CatalogRecord::Folder(f) => Ok(FileStat {
                cnid: f.folder_id,
                kind: EntryKind::Directory,
                size: 0,
                create_date: f.create_date,
                modify_date: f.content_mod_date,
                permissions: HfsPermissions { owner_id: f.permissions.owner_id, group_id: f.permissions.group_id, mode: f.permissions.file_mode },
                data_fork_extents: 0,
                resource_fork_size: 0,
                is_hard_link: false,
                is_symlink: false,
                is_alias: catalog::classify::folder_is_directory_hard_link(&f),
            }),
            _ => Err(HfsError::corrupt("unexpected thread record")),
        }
    }

    /// Recursively walk every entry of the volume, rooted at `/`.
    pub fn walk(&mut self, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        self.walk_recursive(CNID_ROOT_FOLDER, "", &mut entries, diagnostics)?;
        Ok(entries)
    }

    pub fn exists(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<bool> {
        match self.resolve_path_to_record(path, diagnostics) {
            Ok(_) => Ok(true),
            Err(HfsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List the names of extended attributes stored on `cnid`. Returns
    /// an empty list if the volume carries no attributes file.
    pub fn list_attributes(&mut self, cnid: u32, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        match &mut self.attributes_tree {
            Some(tree) => attributes::list_attributes(&mut self.reader, tree, cnid, diagnostics),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_attribute(&mut self, cnid: u32, name: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<attributes::AttributeValue> {
        match &mut self.attributes_tree {
            Some(tree) => attributes::get_attribute(&mut self.reader, tree, cnid, name, diagnostics),
            None => Err(HfsError::not_found(format!("attribute {name} on cnid {cnid}"))),
        }
    }

    /// Rank files by access temperature, opening `.hotfiles.btree` from
    /// the root folder on first use. Absence of the file is a recoverable
    /// `NotFound`, not a corrupt-volume error.
    pub fn hotfiles(&mut self, cancel: &CancelToken, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<hotfiles::HotfileEntry>> {
        if self.hotfiles_tree.is_none() {
            let (record, _) =
                catalog::record_by_path(&mut self.reader, &self.header, &mut self.catalog_tree, hotfiles::HOTFILES_FILENAME, diagnostics)?;
            let CatalogRecord::File(file) = record else {
                return Err(HfsError::corrupt("hotfiles path did not resolve to a file"));
            };
            let fork = Fork::open(
                &mut self.reader,
                &mut self.extents_tree,
                &file.data_fork,
                FORK_TYPE_DATA,
                file.file_id,
                self.header.block_size,
            )?;
            self.hotfiles_tree = Some(BTree::open(&mut self.reader, fork.extents, self.header.block_size)?);
        }
        hotfiles::rank(&mut self.reader, self.hotfiles_tree.as_mut().unwrap(), cancel)
    }

    pub fn read_bitmap(&mut self) -> Result<allocation::Bitmap> {
        allocation::read_bitmap(&mut self.reader, &self.header, &mut self.extents_tree)
    }

    pub fn fragmentation_scan(&mut self, cancel: &CancelToken) -> Result<allocation::FragmentationReport> {
        allocation::fragmentation_scan(&mut self.reader, &self.header, &mut self.catalog_tree, &mut self.extents_tree, cancel)
    }

    pub fn inspect_range(&mut self, cancel: &CancelToken, start: u32, count: u32) -> Result<Vec<allocation::RangeEntry>> {
        allocation::inspect_range(&mut self.reader, &self.header, &mut self.catalog_tree, &mut self.extents_tree, cancel, start, count)
    }

    // --- Internal helpers ---

    fn resolve_path_to_cnid(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<u32> {
        let (record, _name) = self.resolve_path_to_record(path, diagnostics)?;
        match record {
            CatalogRecord::Folder(f) => Ok(f.folder_id),
            CatalogRecord::File(f) => Ok(f.file_id),
            _ => Err(HfsError::corrupt("unexpected thread record")),
        }
    }

    fn resolve_path_to_file(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<CatalogFile> {
        let (record, _name) = self.resolve_path_to_record(path, diagnostics)?;
        match record {
            CatalogRecord::File(f) => Ok(f),
            CatalogRecord::Folder(_) => Err(HfsError::not_a_directory(path.to_string())),
            _ => Err(HfsError::corrupt("unexpected thread record")),
        }
    }

    fn resolve_path_to_record(&mut self, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<(CatalogRecord, String)> {
        catalog::record_by_path(&mut self.reader, &self.header, &mut self.catalog_tree, path, diagnostics)
    }

    fn walk_recursive(
        &mut self,
        parent_cnid: u32,
        parent_path: &str,
        entries: &mut Vec<WalkEntry>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<()> {
        let listing = catalog::list_directory(&mut self.reader, &self.header, &mut self.catalog_tree, parent_cnid, diagnostics)?;

        for entry in listing.entries {
            let full_path = if parent_path.is_empty() { format!("/{}", entry.name) } else { format!("{parent_path}/{}", entry.name) };

            let is_dir = entry.kind == EntryKind::Directory;
            let cnid = entry.cnid;

            entries.push(WalkEntry { path: full_path.clone(), entry });

            if is_dir {
                self.walk_recursive(cnid, &full_path, entries, diagnostics)?;
            }
        }

        Ok(())
    }
}
