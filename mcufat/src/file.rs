//! File and directory handles.
//!
//! A handle is plain state: cluster/position cursor plus a locator for the
//! owning directory record. Every operation borrows the [`Volume`] so the
//! single sector cache is threaded explicitly, never shared behind the
//! caller's back.

use bitflags::bitflags;

use crate::cache::CacheMode;
use crate::device::{BlockDev, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::layout::{DirAttr, DirEntry, ENTRY_DELETED, ENTRY_FREE};
use crate::name::{ShortName, make_83_name};
use crate::volume::{FatType, Volume};

bitflags! {
    /// Flags accepted by [`File::open`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        const READ     = 0x01;
        const WRITE    = 0x02;
        /// Position at end of file before every write.
        const APPEND   = 0x04;
        /// Call `sync` after every write.
        const SYNC     = 0x08;
        /// Create the file if it does not exist (requires WRITE).
        const CREATE   = 0x10;
        /// With CREATE, fail if the file already exists.
        const EXCL     = 0x20;
        /// Truncate to zero length on open (requires WRITE).
        const TRUNCATE = 0x40;
    }
}

bitflags! {
    /// Per-handle state byte. The low nibble mirrors the open flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct FileFlags: u8 {
        const READ       = 0x01;
        const WRITE      = 0x02;
        const APPEND     = 0x04;
        const SYNC       = 0x08;
        /// Bypass the sector cache for partial reads.
        const UNBUFFERED = 0x40;
        /// Directory record needs rewriting on the next sync.
        const DIR_DIRTY  = 0x80;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Closed,
    /// Regular file.
    Normal,
    /// Fixed-size FAT16 root directory (no cluster chain).
    Root16,
    /// FAT32 root directory.
    Root32,
    /// Any other directory.
    Subdir,
}

/// Which entry kinds a listing should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListFilter {
    Files,
    Dirs,
    Any,
}

impl ListFilter {
    fn wants_files(self) -> bool {
        self != ListFilter::Dirs
    }

    fn wants_dirs(self) -> bool {
        self != ListFilter::Files
    }
}

/// An open file or directory.
pub struct File {
    kind: FileKind,
    flags: FileFlags,
    first_cluster: u32,
    file_size: u32,
    current_cluster: u32,
    current_position: u32,
    /// Device block holding this file's directory record (0 for roots).
    dir_block: u32,
    /// Record index within that block.
    dir_index: u8,
}

impl File {
    // ─── Opening ───────────────────────────────────────────────────────────

    /// Open the volume's root directory (read-only).
    pub fn open_root<D: BlockDev>(vol: &mut Volume<D>) -> Result<File> {
        let (kind, first_cluster, file_size) = match vol.fat_type() {
            FatType::Fat16 => (FileKind::Root16, 0, 32 * vol.root_dir_entry_count() as u32),
            FatType::Fat32 => {
                let first = vol.root_dir_start();
                (FileKind::Root32, first, vol.chain_size(first)?)
            }
            FatType::Fat12 => return Err(Error::Unsupported),
        };
        Ok(File {
            kind,
            flags: FileFlags::READ,
            first_cluster,
            file_size,
            current_cluster: 0,
            current_position: 0,
            dir_block: 0,
            dir_index: 0,
        })
    }

    /// Open `name` inside the directory `dir`.
    ///
    /// Scans the directory for an exact 8.3 match, remembering the first
    /// free or deleted record on the way. A missing name is created when
    /// `CREATE | WRITE` is requested, reusing the remembered slot or
    /// growing the directory by one zeroed cluster.
    pub fn open<D: BlockDev>(
        vol: &mut Volume<D>,
        dir: &mut File,
        name: &str,
        flags: OpenFlags,
    ) -> Result<File> {
        let dname = make_83_name(name)?;
        dir.rewind();

        let mut empty_slot: Option<(u32, u8)> = None;
        while let Some((entry, block, index)) = dir.next_dir_entry(vol)? {
            let lead = entry.name[0];
            if lead == ENTRY_FREE || lead == ENTRY_DELETED {
                if empty_slot.is_none() {
                    empty_slot = Some((block, index));
                }
                // nothing follows the free marker
                if lead == ENTRY_FREE {
                    break;
                }
            } else if entry.name == dname {
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                    return Err(Error::AlreadyExists);
                }
                return Self::open_entry(vol, block, index, flags);
            }
        }

        if !flags.contains(OpenFlags::CREATE) {
            return Err(Error::NotFound);
        }
        if !flags.contains(OpenFlags::WRITE) {
            return Err(Error::AccessDenied);
        }

        let (block, index) = match empty_slot {
            Some((block, index)) => {
                vol.cache_block(block, CacheMode::Write)?;
                (block, index)
            }
            None => {
                // the FAT16 root cannot grow
                if dir.kind == FileKind::Root16 {
                    return Err(Error::NoSpace);
                }
                dir.add_dir_cluster(vol)?;
                // first block of the fresh cluster is resident after zeroing
                (vol.cluster_start_block(dir.current_cluster), 0)
            }
        };

        vol.cache.put_dir_entry(index as usize, &DirEntry::new(dname));
        vol.flush()?;
        Self::open_entry(vol, block, index, flags)
    }

    /// Open the directory record at (`block`, `index`).
    fn open_entry<D: BlockDev>(
        vol: &mut Volume<D>,
        block: u32,
        index: u8,
        flags: OpenFlags,
    ) -> Result<File> {
        vol.cache_block(block, CacheMode::Read)?;
        let entry = vol.cache.dir_entry(index as usize);

        // write or truncate is an error for a directory or read-only file
        if entry
            .attributes
            .intersects(DirAttr::READ_ONLY | DirAttr::DIRECTORY)
            && flags.intersects(OpenFlags::WRITE | OpenFlags::TRUNCATE)
        {
            return Err(Error::AccessDenied);
        }

        let first_cluster = entry.first_cluster();
        let (kind, file_size) = if entry.is_file() {
            (FileKind::Normal, entry.file_size)
        } else if entry.is_subdir() {
            // a directory's size field is meaningless; use the chain
            (FileKind::Subdir, vol.chain_size(first_cluster)?)
        } else {
            return Err(Error::AccessDenied);
        };

        let mut file = File {
            kind,
            flags: FileFlags::from_bits_truncate(flags.bits() & 0x0F),
            first_cluster,
            file_size,
            current_cluster: 0,
            current_position: 0,
            dir_block: block,
            dir_index: index,
        };
        if flags.contains(OpenFlags::TRUNCATE) {
            file.truncate(vol, 0)?;
        }
        Ok(file)
    }

    // ─── State queries ─────────────────────────────────────────────────────

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.kind != FileKind::Closed
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Normal
    }

    pub fn is_dir(&self) -> bool {
        matches!(
            self.kind,
            FileKind::Root16 | FileKind::Root32 | FileKind::Subdir
        )
    }

    pub fn size(&self) -> u32 {
        self.file_size
    }

    pub fn position(&self) -> u32 {
        self.current_position
    }

    /// Bytes left to read, clamped to 0x7FFF (the transport-era 16-bit
    /// return contract callers of this API historically relied on).
    pub fn available(&self) -> u32 {
        if !self.is_open() {
            return 0;
        }
        (self.file_size - self.current_position).min(0x7FFF)
    }

    /// Reset the cursor to the start of the file without walking the chain.
    pub fn rewind(&mut self) {
        self.current_position = 0;
        self.current_cluster = 0;
    }

    /// Route partial-sector reads straight to the device instead of
    /// through the shared cache.
    pub fn set_unbuffered_read(&mut self, on: bool) {
        self.flags.set(FileFlags::UNBUFFERED, on);
    }

    // ─── Reading ───────────────────────────────────────────────────────────

    /// Read up to `buf.len()` bytes at the cursor. Returns the number of
    /// bytes transferred, which is short only at end of file.
    pub fn read<D: BlockDev>(&mut self, vol: &mut Volume<D>, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        if !self.flags.contains(FileFlags::READ) {
            return Err(Error::AccessDenied);
        }

        let remaining = (self.file_size - self.current_position) as usize;
        let want = buf.len().min(remaining);
        let mut done = 0usize;
        while done < want {
            let offset = (self.current_position & 0x1FF) as usize;
            let block = self.data_block(vol)?;
            let n = (want - done).min(SECTOR_SIZE - offset);

            // full sectors and unbuffered reads bypass the cache, unless
            // the sector is the one currently buffered
            if (self.flags.contains(FileFlags::UNBUFFERED) || n == SECTOR_SIZE)
                && block != vol.cache.block()
            {
                vol.read_data(block, offset as u16, &mut buf[done..done + n])?;
            } else {
                vol.cache_block(block, CacheMode::Read)?;
                buf[done..done + n].copy_from_slice(&vol.cache.bytes()[offset..offset + n]);
            }
            self.current_position += n as u32;
            done += n;
        }
        Ok(want)
    }

    /// Read one byte; `Ok(None)` at end of file.
    pub fn read_byte<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        Ok(if self.read(vol, &mut b)? == 1 {
            Some(b[0])
        } else {
            None
        })
    }

    /// Device block holding the byte at the cursor, advancing the cluster
    /// cursor across chain boundaries as needed.
    fn data_block<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<u32> {
        if self.kind == FileKind::Root16 {
            return Ok(vol.root_dir_start() + (self.current_position >> 9));
        }
        let block_of_cluster = vol.block_of_cluster(self.current_position);
        if self.current_position & 0x1FF == 0 && block_of_cluster == 0 {
            // entering a new cluster
            if self.current_position == 0 {
                self.current_cluster = self.first_cluster;
            } else {
                self.current_cluster = vol.get_fat(self.current_cluster)?;
            }
        }
        Ok(vol.cluster_start_block(self.current_cluster) + block_of_cluster)
    }

    // ─── Writing ───────────────────────────────────────────────────────────

    /// Write `buf` at the cursor, allocating clusters as the file grows.
    /// Returns the number of bytes written.
    pub fn write<D: BlockDev>(&mut self, vol: &mut Volume<D>, buf: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        if !self.is_file() || !self.flags.contains(FileFlags::WRITE) {
            return Err(Error::AccessDenied);
        }
        if self.flags.contains(FileFlags::APPEND) && self.current_position != self.file_size {
            self.seek(vol, self.file_size)?;
        }

        let mut done = 0usize;
        while done < buf.len() {
            let block_of_cluster = vol.block_of_cluster(self.current_position);
            let offset = (self.current_position & 0x1FF) as usize;

            if block_of_cluster == 0 && offset == 0 {
                // start of a new cluster
                if self.current_cluster == 0 {
                    if self.first_cluster == 0 {
                        self.add_cluster(vol)?;
                    } else {
                        self.current_cluster = self.first_cluster;
                    }
                } else {
                    let next = vol.get_fat(self.current_cluster)?;
                    if vol.is_eoc(next) {
                        self.add_cluster(vol)?;
                    } else {
                        self.current_cluster = next;
                    }
                }
            }

            let n = (buf.len() - done).min(SECTOR_SIZE - offset);
            let block = vol.cluster_start_block(self.current_cluster) + block_of_cluster;

            if n == SECTOR_SIZE {
                // full sector goes straight to the device; drop any
                // buffered copy of it first
                if vol.cache.block() == block {
                    vol.cache.invalidate();
                }
                let Some(chunk) = buf[done..].first_chunk::<SECTOR_SIZE>() else {
                    return Err(Error::Io);
                };
                if !vol.dev.write_block(block, chunk) {
                    return Err(Error::Io);
                }
            } else {
                if offset == 0 && self.current_position >= self.file_size {
                    // fresh sector past the old end: no stale read needed
                    vol.flush()?;
                    vol.cache.set_block(block);
                    vol.cache.mark_dirty();
                } else {
                    vol.cache_block(block, CacheMode::Write)?;
                }
                vol.cache.bytes_mut()[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            }
            self.current_position += n as u32;
            done += n;
        }

        if self.current_position > self.file_size {
            self.file_size = self.current_position;
            self.flags.insert(FileFlags::DIR_DIRTY);
        }
        if self.flags.contains(FileFlags::SYNC) {
            self.sync(vol)?;
        }
        Ok(done)
    }

    /// Grow the chain by one cluster at the cursor.
    fn add_cluster<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<()> {
        let mut cluster = self.current_cluster;
        vol.alloc_contiguous(1, &mut cluster)?;
        self.current_cluster = cluster;
        if self.first_cluster == 0 {
            self.first_cluster = cluster;
            self.flags.insert(FileFlags::DIR_DIRTY);
        }
        Ok(())
    }

    /// Grow a directory by one zeroed cluster. Leaves the cluster's first
    /// block resident in the cache.
    fn add_dir_cluster<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<()> {
        self.add_cluster(vol)?;
        let start = vol.cluster_start_block(self.current_cluster);
        let mut i = vol.blocks_per_cluster() as u32;
        while i != 0 {
            vol.zero_block(start + i - 1)?;
            i -= 1;
        }
        self.file_size += (SECTOR_SIZE as u32) << vol.cluster_size_shift();
        Ok(())
    }

    // ─── Positioning ───────────────────────────────────────────────────────

    /// Move the cursor to `pos` (at most the file size). Walks forward from
    /// the current cluster when possible, from the chain head otherwise.
    pub fn seek<D: BlockDev>(&mut self, vol: &mut Volume<D>, pos: u32) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        if pos > self.file_size {
            return Err(Error::OutOfBounds);
        }
        if self.kind == FileKind::Root16 {
            // flat layout, no chain to walk
            self.current_position = pos;
            return Ok(());
        }
        if pos == 0 {
            self.rewind();
            return Ok(());
        }

        let shift = vol.cluster_size_shift() as u32 + 9;
        let new_index = (pos - 1) >> shift;
        let mut hops = new_index;
        if self.current_position == 0 || new_index < (self.current_position - 1) >> shift {
            // must follow the chain from the start
            self.current_cluster = self.first_cluster;
        } else {
            hops = new_index - ((self.current_position - 1) >> shift);
        }
        for _ in 0..hops {
            self.current_cluster = vol.get_fat(self.current_cluster)?;
        }
        self.current_position = pos;
        Ok(())
    }

    // ─── Truncation and teardown ───────────────────────────────────────────

    /// Shrink the file to `length` bytes, freeing the clusters beyond it,
    /// and sync. The cursor is clamped to the new length.
    pub fn truncate<D: BlockDev>(&mut self, vol: &mut Volume<D>, length: u32) -> Result<()> {
        if !self.is_file() || !self.flags.contains(FileFlags::WRITE) {
            return Err(Error::AccessDenied);
        }
        if length > self.file_size {
            return Err(Error::OutOfBounds);
        }
        if self.file_size == 0 {
            return Ok(());
        }

        let restore = self.current_position.min(length);
        // position the cluster cursor on the last kept cluster
        self.seek(vol, length)?;

        if length == 0 {
            vol.free_chain(self.first_cluster)?;
            self.first_cluster = 0;
        } else {
            let tail = vol.get_fat(self.current_cluster)?;
            if !vol.is_eoc(tail) {
                vol.free_chain(tail)?;
                vol.put_eoc(self.current_cluster)?;
            }
        }
        self.file_size = length;
        self.flags.insert(FileFlags::DIR_DIRTY);
        self.sync(vol)?;
        self.seek(vol, restore)
    }

    /// Rewrite the directory record if this handle changed it, then flush
    /// the sector cache. Idempotent: a second call with no intervening
    /// mutation touches the device not at all.
    pub fn sync<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        if self.flags.contains(FileFlags::DIR_DIRTY) {
            // the record's sector may long since have been evicted
            vol.cache_block(self.dir_block, CacheMode::Write)?;
            let mut entry = vol.cache.dir_entry(self.dir_index as usize);
            if !self.is_dir() {
                entry.file_size = self.file_size;
            }
            entry.set_first_cluster(self.first_cluster);
            vol.cache.put_dir_entry(self.dir_index as usize, &entry);
            self.flags.remove(FileFlags::DIR_DIRTY);
        }
        vol.flush()
    }

    /// Sync, then mark the handle closed.
    pub fn close<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<()> {
        self.sync(vol)?;
        self.kind = FileKind::Closed;
        Ok(())
    }

    /// Delete the file: release its clusters, mark its directory record
    /// deleted, close the handle. Requires write access.
    pub fn remove<D: BlockDev>(&mut self, vol: &mut Volume<D>) -> Result<()> {
        self.truncate(vol, 0)?;
        vol.cache_block(self.dir_block, CacheMode::Write)?;
        let mut entry = vol.cache.dir_entry(self.dir_index as usize);
        entry.name[0] = ENTRY_DELETED;
        vol.cache.put_dir_entry(self.dir_index as usize, &entry);
        self.kind = FileKind::Closed;
        vol.flush()
    }

    // ─── Directory scanning ────────────────────────────────────────────────

    /// Next raw directory record at the cursor, with its (block, index)
    /// locator. `Ok(None)` past the last record.
    fn next_dir_entry<D: BlockDev>(
        &mut self,
        vol: &mut Volume<D>,
    ) -> Result<Option<(DirEntry, u32, u8)>> {
        if !self.is_dir() {
            return Err(Error::AccessDenied);
        }
        if !self.flags.contains(FileFlags::READ) {
            return Err(Error::AccessDenied);
        }
        if self.current_position >= self.file_size {
            return Ok(None);
        }
        let index = ((self.current_position >> 5) & 0xF) as u8;
        let block = self.data_block(vol)?;
        vol.cache_block(block, CacheMode::Read)?;
        let entry = vol.cache.dir_entry(index as usize);
        self.current_position += 32;
        Ok(Some((entry, block, index)))
    }

    /// Return the next qualifying entry's decoded name, continuing from
    /// the cursor. `Ok(None)` when the directory is exhausted; reaching
    /// the end-of-directory marker and scanning every record report the
    /// same way.
    pub fn list_next<D: BlockDev>(
        &mut self,
        vol: &mut Volume<D>,
        filter: ListFilter,
    ) -> Result<Option<ShortName>> {
        while let Some((entry, _, _)) = self.next_dir_entry(vol)? {
            let lead = entry.name[0];
            if lead == ENTRY_FREE {
                return Ok(None);
            }
            if lead == ENTRY_DELETED || lead == b'.' {
                continue;
            }
            // volume labels and long-name records never qualify
            if entry.attributes.contains(DirAttr::VOLUME_ID) {
                continue;
            }
            if entry.is_subdir() && !filter.wants_dirs() {
                continue;
            }
            if entry.is_file() && !filter.wants_files() {
                continue;
            }
            return Ok(Some(ShortName::decode(&entry.name, entry.is_subdir())));
        }
        Ok(None)
    }

    /// Rewind and return the `index`-th qualifying entry.
    pub fn list_at<D: BlockDev>(
        &mut self,
        vol: &mut Volume<D>,
        filter: ListFilter,
        index: usize,
    ) -> Result<Option<ShortName>> {
        self.rewind();
        for _ in 0..index {
            if self.list_next(vol, filter)?.is_none() {
                return Ok(None);
            }
        }
        self.list_next(vol, filter)
    }
}

/// `core::fmt::Write` adapter: lets callers `write!` formatted text into
/// an open file.
pub struct FileWriter<'a, D: BlockDev> {
    vol: &'a mut Volume<D>,
    file: &'a mut File,
}

impl<'a, D: BlockDev> FileWriter<'a, D> {
    pub fn new(vol: &'a mut Volume<D>, file: &'a mut File) -> Self {
        FileWriter { vol, file }
    }
}

impl<D: BlockDev> core::fmt::Write for FileWriter<'_, D> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        match self.file.write(self.vol, s.as_bytes()) {
            Ok(n) if n == s.len() => Ok(()),
            _ => Err(core::fmt::Error),
        }
    }
}
