//! Single-sector write-back cache.
//!
//! Exactly one sector is ever resident. A dirty sector is written back
//! (and mirrored to the second FAT copy when scheduled) before a different
//! sector may be loaded; nothing else flushes implicitly.

use crate::device::{BlockDev, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::layout::{DIR_RECORD_SIZE, DirEntry};

/// Resident-block sentinel meaning "nothing cached".
pub(crate) const NO_BLOCK: u32 = 0xFFFF_FFFF;

/// Whether a load is for reading only or will mutate the buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheMode {
    Read,
    Write,
}

pub(crate) struct SectorCache {
    buf: [u8; SECTOR_SIZE],
    block: u32,
    dirty: bool,
    /// Second-FAT sector to receive a copy on the next flush; 0 = none.
    mirror_block: u32,
}

impl SectorCache {
    pub fn new() -> Self {
        SectorCache {
            buf: [0; SECTOR_SIZE],
            block: NO_BLOCK,
            dirty: false,
            mirror_block: 0,
        }
    }

    /// Block number of the resident sector ([`NO_BLOCK`] if none).
    pub fn block(&self) -> u32 {
        self.block
    }

    /// Make `block` resident, flushing whatever was there before.
    pub fn load<D: BlockDev>(&mut self, dev: &mut D, block: u32, mode: CacheMode) -> Result<()> {
        if self.block != block {
            self.flush(dev)?;
            if !dev.read_block(block, &mut self.buf) {
                return Err(Error::Io);
            }
            self.block = block;
        }
        if mode == CacheMode::Write {
            self.dirty = true;
        }
        Ok(())
    }

    /// Write back the resident sector if dirty, then its mirror if one is
    /// scheduled. No-op on a clean cache.
    pub fn flush<D: BlockDev>(&mut self, dev: &mut D) -> Result<()> {
        if self.dirty {
            if !dev.write_block(self.block, &self.buf) {
                return Err(Error::Io);
            }
            if self.mirror_block != 0 {
                if !dev.write_block(self.mirror_block, &self.buf) {
                    return Err(Error::Io);
                }
                self.mirror_block = 0;
            }
            self.dirty = false;
        }
        Ok(())
    }

    /// Flush, then make `block` resident as an all-zero dirty sector
    /// without reading the device. Used to initialize fresh clusters.
    pub fn zero<D: BlockDev>(&mut self, dev: &mut D, block: u32) -> Result<()> {
        self.flush(dev)?;
        self.buf = [0; SECTOR_SIZE];
        self.block = block;
        self.dirty = true;
        Ok(())
    }

    /// Adopt `block` as the resident identity without reading the device.
    /// The caller overwrites the buffer contents next.
    pub fn set_block(&mut self, block: u32) {
        self.block = block;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Drop the resident sector. Discards dirty state: the only caller is
    /// the full-sector write path, which supersedes any buffered copy.
    pub fn invalidate(&mut self) {
        self.block = NO_BLOCK;
        self.dirty = false;
        self.mirror_block = 0;
    }

    /// Schedule a mirror write of the resident sector to `block`.
    pub fn set_mirror(&mut self, block: u32) {
        self.mirror_block = block;
    }

    // ─── Typed views of the resident sector ────────────────────────────────

    pub fn bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.buf
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        &mut self.buf
    }

    /// FAT16 entry `index` (0..256) of the resident sector.
    pub fn fat16_entry(&self, index: usize) -> u16 {
        let off = index * 2;
        u16::from_le_bytes([self.buf[off], self.buf[off + 1]])
    }

    pub fn set_fat16_entry(&mut self, index: usize, value: u16) {
        let off = index * 2;
        self.buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// FAT32 entry `index` (0..128) of the resident sector, unmasked.
    pub fn fat32_entry(&self, index: usize) -> u32 {
        let off = index * 4;
        u32::from_le_bytes([
            self.buf[off],
            self.buf[off + 1],
            self.buf[off + 2],
            self.buf[off + 3],
        ])
    }

    pub fn set_fat32_entry(&mut self, index: usize, value: u32) {
        let off = index * 4;
        self.buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Directory record `index` (0..16) of the resident sector.
    pub fn dir_entry(&self, index: usize) -> DirEntry {
        let off = index * DIR_RECORD_SIZE;
        let mut rec = [0u8; DIR_RECORD_SIZE];
        rec.copy_from_slice(&self.buf[off..off + DIR_RECORD_SIZE]);
        DirEntry::decode(&rec)
    }

    /// Store a directory record and mark the sector dirty.
    pub fn put_dir_entry(&mut self, index: usize, entry: &DirEntry) {
        let off = index * DIR_RECORD_SIZE;
        let mut rec = [0u8; DIR_RECORD_SIZE];
        entry.encode(&mut rec);
        self.buf[off..off + DIR_RECORD_SIZE].copy_from_slice(&rec);
        self.dirty = true;
    }
}
