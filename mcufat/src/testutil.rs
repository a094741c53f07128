//! Host-test helpers: an in-memory block device and MBR-partitioned FAT
//! images formatted by the `fatfs` crate for cross-validation.

use std::io::{Cursor, Read, Write};

use crate::device::{BlockDev, SECTOR_SIZE};

/// First LBA of partition 1 in every test image.
pub const PART_START: u32 = 64;

/// Block device backed by a `Vec<u8>`, counting transfers so tests can
/// assert on write-back behavior.
pub struct MemDisk {
    pub data: Vec<u8>,
    pub reads: usize,
    pub writes: usize,
}

impl MemDisk {
    pub fn new(data: Vec<u8>) -> Self {
        MemDisk {
            data,
            reads: 0,
            writes: 0,
        }
    }
}

impl BlockDev for MemDisk {
    fn read_block(&mut self, block: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        let off = block as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > self.data.len() {
            return false;
        }
        buf.copy_from_slice(&self.data[off..off + SECTOR_SIZE]);
        self.reads += 1;
        true
    }

    fn write_block(&mut self, block: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
        let off = block as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > self.data.len() {
            return false;
        }
        self.data[off..off + SECTOR_SIZE].copy_from_slice(buf);
        self.writes += 1;
        true
    }

    fn read_data(&mut self, block: u32, offset: u16, buf: &mut [u8]) -> bool {
        let off = block as usize * SECTOR_SIZE + offset as usize;
        if offset as usize + buf.len() > SECTOR_SIZE || off + buf.len() > self.data.len() {
            return false;
        }
        buf.copy_from_slice(&self.data[off..off + buf.len()]);
        self.reads += 1;
        true
    }
}

/// A disk whose sector 0 carries a partition table pointing at an empty
/// volume area of `volume_sectors` sectors.
pub fn blank_partitioned_disk(volume_sectors: u32) -> MemDisk {
    let mut data = vec![0u8; (PART_START + volume_sectors) as usize * SECTOR_SIZE];
    data[446] = 0x00; // boot indicator: valid, not bootable
    data[446 + 4] = 0x0C; // partition type (informational)
    data[446 + 8..446 + 12].copy_from_slice(&PART_START.to_le_bytes());
    data[446 + 12..446 + 16].copy_from_slice(&volume_sectors.to_le_bytes());
    data[510] = 0x55;
    data[511] = 0xAA;
    MemDisk::new(data)
}

fn format(disk: &mut MemDisk, opts: fatfs::FormatVolumeOptions) {
    let start = PART_START as usize * SECTOR_SIZE;
    let mut cursor = Cursor::new(&mut disk.data[start..]);
    fatfs::format_volume(&mut cursor, opts).expect("format_volume failed");
}

/// FAT16 image: 8 sectors per cluster, sized so the cluster count lands in
/// FAT16 range (4085..65525).
pub fn make_fat16_disk() -> MemDisk {
    let mut disk = blank_partitioned_disk(68 * 1024);
    format(
        &mut disk,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat16)
            .bytes_per_cluster(8 * SECTOR_SIZE as u32),
    );
    disk
}

/// FAT16 image whose root directory holds only 64 entries.
pub fn make_fat16_disk_small_root() -> MemDisk {
    let mut disk = blank_partitioned_disk(68 * 1024);
    format(
        &mut disk,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat16)
            .bytes_per_cluster(8 * SECTOR_SIZE as u32)
            .max_root_dir_entries(64),
    );
    disk
}

/// FAT32 image. With the `Fat32` hint fatfs picks 512-byte clusters, and
/// FAT32 needs ≥65525 data clusters, so the volume is ~40 MB.
pub fn make_fat32_disk() -> MemDisk {
    let mut disk = blank_partitioned_disk(80 * 1024);
    format(
        &mut disk,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    );
    disk
}

/// Small FAT12 image (mountable, but data access is unsupported).
pub fn make_fat12_disk() -> MemDisk {
    let mut disk = blank_partitioned_disk(2048);
    format(
        &mut disk,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat12),
    );
    disk
}

fn volume_cursor(disk: &mut MemDisk) -> Cursor<&mut [u8]> {
    let start = PART_START as usize * SECTOR_SIZE;
    Cursor::new(&mut disk.data[start..])
}

/// Create (or overwrite) a file via `fatfs`. `path` may contain `/`.
pub fn fatfs_write_file(disk: &mut MemDisk, path: &str, content: &[u8]) {
    let cursor = volume_cursor(disk);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().create_file(path).unwrap();
    f.truncate().unwrap();
    f.write_all(content).unwrap();
}

/// Create a directory via `fatfs`.
pub fn fatfs_make_dir(disk: &mut MemDisk, path: &str) {
    let cursor = volume_cursor(disk);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    fs.root_dir().create_dir(path).unwrap();
}

/// Read a whole file via `fatfs`, panicking if it does not exist.
pub fn fatfs_read_file(disk: &mut MemDisk, path: &str) -> Vec<u8> {
    let cursor = volume_cursor(disk);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().open_file(path).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

pub fn fatfs_file_exists(disk: &mut MemDisk, path: &str) -> bool {
    let cursor = volume_cursor(disk);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    fs.root_dir().open_file(path).is_ok()
}

/// Names (upper-cased short forms) of a directory's entries via `fatfs`.
pub fn fatfs_list_dir(disk: &mut MemDisk, path: &str) -> Vec<String> {
    let cursor = volume_cursor(disk);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    let dir = if path.is_empty() {
        fs.root_dir()
    } else {
        fs.root_dir().open_dir(path).unwrap()
    };
    dir.iter()
        .map(|e| e.unwrap().file_name().to_uppercase())
        .filter(|n| n != "." && n != "..")
        .collect()
}

