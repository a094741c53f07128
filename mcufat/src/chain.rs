//! Cluster-chain operations: FAT entry access, traversal, freeing, and the
//! contiguous allocator.
//!
//! Chains are walked at most `cluster_count + 1` hops; a chain that has
//! not terminated by then is treated as corrupt rather than looping.

use crate::cache::CacheMode;
use crate::device::{BlockDev, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::layout::{EOC, FAT16_EOC_MIN, FAT32_EOC_MIN, FAT32_MASK};
use crate::volume::{FatType, Volume};

impl<D: BlockDev> Volume<D> {
    /// Device block holding the FAT entry for `cluster`.
    fn fat_block(&self, cluster: u32) -> Result<u32> {
        match self.fat_type {
            FatType::Fat16 => Ok(self.fat_start_block + (cluster >> 8)),
            FatType::Fat32 => Ok(self.fat_start_block + (cluster >> 7)),
            FatType::Fat12 => Err(Error::Unsupported),
        }
    }

    /// Read the FAT entry for `cluster`.
    pub fn get_fat(&mut self, cluster: u32) -> Result<u32> {
        if cluster > self.cluster_count + 1 {
            return Err(Error::OutOfBounds);
        }
        let block = self.fat_block(cluster)?;
        self.cache_block(block, CacheMode::Read)?;
        let value = match self.fat_type {
            FatType::Fat16 => self.cache.fat16_entry((cluster & 0xFF) as usize) as u32,
            _ => self.cache.fat32_entry((cluster & 0x7F) as usize) & FAT32_MASK,
        };
        Ok(value)
    }

    /// Store the FAT entry for `cluster`, scheduling the mirror copy when
    /// the volume carries a second FAT.
    pub(crate) fn put_fat(&mut self, cluster: u32, value: u32) -> Result<()> {
        // clusters 0 and 1 are reserved
        if cluster < 2 || cluster > self.cluster_count + 1 {
            return Err(Error::OutOfBounds);
        }
        let block = self.fat_block(cluster)?;
        self.cache_block(block, CacheMode::Read)?;
        match self.fat_type {
            FatType::Fat16 => self.cache.set_fat16_entry((cluster & 0xFF) as usize, value as u16),
            _ => self.cache.set_fat32_entry((cluster & 0x7F) as usize, value),
        }
        self.cache.mark_dirty();
        if self.fat_count > 1 {
            self.cache.set_mirror(block + self.blocks_per_fat);
        }
        Ok(())
    }

    /// Whether a FAT value marks the end of a chain.
    pub fn is_eoc(&self, value: u32) -> bool {
        value
            >= match self.fat_type {
                FatType::Fat16 => FAT16_EOC_MIN,
                _ => FAT32_EOC_MIN,
            }
    }

    /// Terminate a chain at `cluster`.
    pub(crate) fn put_eoc(&mut self, cluster: u32) -> Result<()> {
        self.put_fat(cluster, EOC)
    }

    /// Total bytes spanned by the chain starting at `cluster`.
    pub fn chain_size(&mut self, cluster: u32) -> Result<u32> {
        let mut cluster = cluster;
        let mut size = 0u32;
        let mut hops = 0u32;
        loop {
            cluster = self.get_fat(cluster)?;
            size += (SECTOR_SIZE as u32) << self.cluster_size_shift;
            if self.is_eoc(cluster) {
                return Ok(size);
            }
            hops += 1;
            if hops > self.cluster_count {
                log::warn!("chain_size: no end-of-chain within {} clusters", hops);
                return Err(Error::BadChain);
            }
        }
    }

    /// Free every cluster of the chain starting at `cluster` and reset the
    /// allocation cursor to the start of the FAT.
    pub(crate) fn free_chain(&mut self, cluster: u32) -> Result<()> {
        self.alloc_search_start = 2;
        let mut cluster = cluster;
        let mut hops = 0u32;
        loop {
            // capture the successor before releasing the entry
            let next = self.get_fat(cluster)?;
            self.put_fat(cluster, 0)?;
            cluster = next;
            if self.is_eoc(cluster) {
                return Ok(());
            }
            hops += 1;
            if hops > self.cluster_count {
                log::warn!("free_chain: no end-of-chain within {} clusters", hops);
                return Err(Error::BadChain);
            }
        }
    }

    /// Allocate `count` contiguous clusters.
    ///
    /// With `*current != 0` the search tries to extend that chain in place,
    /// starting right after it and linking the old tail to the new run; the
    /// allocation cursor is left alone. With `*current == 0` the search
    /// starts at the cursor, and a single-cluster success advances the
    /// cursor past the run. Either way the search wraps at the end of the
    /// FAT and gives up after examining every cluster. On success `*current`
    /// holds the first cluster of the new run.
    pub(crate) fn alloc_contiguous(&mut self, count: u32, current: &mut u32) -> Result<()> {
        let (mut begin, set_start) = if *current != 0 {
            (*current + 1, false)
        } else {
            (self.alloc_search_start, count == 1)
        };
        let mut end = begin;

        // last cluster index the FAT describes
        let fat_end = self.cluster_count + 1;

        let mut examined = 0u32;
        loop {
            if examined >= self.cluster_count {
                log::warn!("alloc_contiguous: no run of {count} free clusters");
                return Err(Error::NoSpace);
            }
            if end > fat_end {
                // wrap to the first usable cluster
                begin = 2;
                end = 2;
            }
            let value = self.get_fat(end)?;
            if value != 0 {
                // occupied: restart the run just past it
                begin = end + 1;
            } else if end - begin + 1 == count {
                break;
            }
            examined += 1;
            end += 1;
        }

        self.put_eoc(end)?;
        // link the run back to front
        let mut c = end;
        while c > begin {
            self.put_fat(c - 1, c)?;
            c -= 1;
        }
        if *current != 0 {
            // connect the old tail to the new run
            self.put_fat(*current, begin)?;
        }
        *current = begin;
        if set_start {
            self.alloc_search_start = begin + 1;
        }
        Ok(())
    }
}
