//! FAT12/16/32 driver for sector-addressable block devices.
//!
//! The crate turns anything implementing [`BlockDev`] (an SD card behind
//! SPI, an IDE disk, a disk-image file in tests) into a small POSIX-like
//! file API with O(1) device memory: one 512-byte sector buffer shared by
//! every operation on the volume.
//!
//! Short filename (8.3) only. FAT12 volumes are recognized at mount time
//! but their data area cannot be accessed.

// Library crate root: host tests run with std, everything else is no_std.
#![cfg_attr(not(test), no_std)]

mod cache;
mod chain;
mod device;
mod error;
mod file;
mod layout;
mod name;
mod volume;

#[cfg(test)]
mod testutil;

pub use device::{BlockDev, SECTOR_SIZE};
pub use error::{Error, Result};
pub use file::{File, FileKind, FileWriter, ListFilter, OpenFlags};
pub use name::ShortName;
pub use volume::{FatType, Volume};
