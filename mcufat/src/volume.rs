//! Volume mounting and geometry.
//!
//! `mount` parses the partition table and boot sector once; everything it
//! derives is immutable afterwards except the allocation cursor, which the
//! cluster allocator in `chain.rs` maintains.

use crate::cache::{CacheMode, SectorCache};
use crate::device::{BlockDev, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::layout::{BiosParams, PartitionEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl core::fmt::Display for FatType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        })
    }
}

/// A mounted volume: the block device, the shared sector cache, and the
/// geometry derived from the boot sector.
pub struct Volume<D> {
    pub(crate) dev: D,
    pub(crate) cache: SectorCache,
    pub(crate) fat_type: FatType,
    pub(crate) fat_count: u8,
    pub(crate) blocks_per_cluster: u8,
    pub(crate) cluster_size_shift: u8,
    pub(crate) blocks_per_fat: u32,
    pub(crate) fat_start_block: u32,
    pub(crate) root_dir_entry_count: u16,
    /// First block of the FAT16 root directory, or the FAT32 root cluster.
    pub(crate) root_dir_start: u32,
    pub(crate) data_start_block: u32,
    pub(crate) cluster_count: u32,
    /// Where the next fresh allocation search begins.
    pub(crate) alloc_search_start: u32,
}

impl<D: BlockDev> Volume<D> {
    /// Mount the first partition of `dev`.
    ///
    /// Validates the MBR partition entry and the boot sector, derives the
    /// block layout, and classifies the FAT type from the cluster count.
    pub fn mount(mut dev: D) -> Result<Self> {
        let mut cache = SectorCache::new();

        cache.load(&mut dev, 0, CacheMode::Read)?;
        let part = PartitionEntry::decode(cache.bytes(), 0);
        if part.boot_flag & 0x7F != 0 || part.total_sectors < 100 || part.first_sector == 0 {
            log::warn!("mount: first partition entry is not usable");
            return Err(Error::BadVolume);
        }
        let volume_start = part.first_sector;

        cache.load(&mut dev, volume_start, CacheMode::Read)?;
        let bpb = BiosParams::decode(cache.bytes());
        if bpb.bytes_per_sector as usize != SECTOR_SIZE
            || bpb.fat_count == 0
            || bpb.reserved_sector_count == 0
            || bpb.sectors_per_cluster == 0
        {
            log::warn!("mount: boot sector failed validation");
            return Err(Error::BadVolume);
        }

        // cluster size must be a power of two in [1, 128]
        let mut cluster_size_shift = 0u8;
        while u32::from(bpb.sectors_per_cluster) != 1 << cluster_size_shift {
            if cluster_size_shift >= 8 {
                log::warn!(
                    "mount: {} sectors/cluster is not a supported power of two",
                    bpb.sectors_per_cluster
                );
                return Err(Error::BadVolume);
            }
            cluster_size_shift += 1;
        }

        let blocks_per_fat = if bpb.sectors_per_fat_16 != 0 {
            bpb.sectors_per_fat_16 as u32
        } else {
            bpb.sectors_per_fat_32
        };
        let fat_start_block = volume_start + bpb.reserved_sector_count as u32;

        // directory start for FAT16, overwritten with the root cluster for FAT32
        let mut root_dir_start = fat_start_block + bpb.fat_count as u32 * blocks_per_fat;

        let data_start_block =
            root_dir_start + (32 * bpb.root_dir_entry_count as u32).div_ceil(SECTOR_SIZE as u32);

        let total_blocks = if bpb.total_sectors_16 != 0 {
            bpb.total_sectors_16 as u32
        } else {
            bpb.total_sectors_32
        };
        let cluster_count = (total_blocks - (data_start_block - volume_start)) >> cluster_size_shift;

        let fat_type = if cluster_count < 4085 {
            FatType::Fat12
        } else if cluster_count < 65525 {
            FatType::Fat16
        } else {
            root_dir_start = bpb.fat32_root_cluster;
            FatType::Fat32
        };

        log::info!(
            "mount: {fat_type} volume at block {volume_start}, {cluster_count} clusters of {} sectors",
            bpb.sectors_per_cluster
        );

        Ok(Volume {
            dev,
            cache,
            fat_type,
            fat_count: bpb.fat_count,
            blocks_per_cluster: bpb.sectors_per_cluster,
            cluster_size_shift,
            blocks_per_fat,
            fat_start_block,
            root_dir_entry_count: bpb.root_dir_entry_count,
            root_dir_start,
            data_start_block,
            cluster_count,
            alloc_search_start: 2,
        })
    }

    // ─── Geometry accessors ────────────────────────────────────────────────

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    /// Number of data clusters.
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn blocks_per_cluster(&self) -> u8 {
        self.blocks_per_cluster
    }

    pub fn cluster_size_shift(&self) -> u8 {
        self.cluster_size_shift
    }

    /// FAT16 root directory capacity in entries; 0 on FAT32.
    pub fn root_dir_entry_count(&self) -> u16 {
        self.root_dir_entry_count
    }

    /// First block of the FAT16 root directory, or the FAT32 root cluster.
    pub fn root_dir_start(&self) -> u32 {
        self.root_dir_start
    }

    /// The underlying block device (for transport maintenance and tests).
    pub fn device(&mut self) -> &mut D {
        &mut self.dev
    }

    // ─── Addressing helpers ────────────────────────────────────────────────

    /// Sector index within its cluster for a byte position.
    pub(crate) fn block_of_cluster(&self, position: u32) -> u32 {
        (position >> 9) & (self.blocks_per_cluster as u32 - 1)
    }

    /// First device block of a cluster.
    pub(crate) fn cluster_start_block(&self, cluster: u32) -> u32 {
        self.data_start_block + ((cluster - 2) << self.cluster_size_shift)
    }

    // ─── Cache plumbing ────────────────────────────────────────────────────

    pub(crate) fn cache_block(&mut self, block: u32, mode: CacheMode) -> Result<()> {
        self.cache.load(&mut self.dev, block, mode)
    }

    /// Write back any buffered sector (and its FAT mirror).
    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush(&mut self.dev)
    }

    pub(crate) fn zero_block(&mut self, block: u32) -> Result<()> {
        self.cache.zero(&mut self.dev, block)
    }

    /// Partial-sector read that bypasses the cache.
    pub(crate) fn read_data(&mut self, block: u32, offset: u16, buf: &mut [u8]) -> Result<()> {
        if !self.dev.read_data(block, offset, buf) {
            return Err(Error::Io);
        }
        Ok(())
    }
}
