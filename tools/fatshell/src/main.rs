//! fatshell: poke at a FAT disk image from the host.
//!
//! The image plays the role of the SD card: a partitioned disk whose first
//! partition holds a FAT16/FAT32 volume. One command per invocation:
//!
//! ```text
//! fatshell <image> info
//! fatshell <image> ls [files|dirs]
//! fatshell <image> cat <NAME>
//! fatshell <image> put <NAME> <text...>
//! fatshell <image> append <NAME> <text...>
//! fatshell <image> rm <NAME>
//! ```

mod logger;

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write as _};
use std::process::ExitCode;

use mcufat::{BlockDev, File, ListFilter, OpenFlags, Result, SECTOR_SIZE, Volume};

// ─── Disk-image block device ───────────────────────────────────────────────────

struct ImageDisk {
    file: std::fs::File,
}

impl ImageDisk {
    fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(ImageDisk { file })
    }

    fn at(&mut self, block: u32, offset: u16) -> bool {
        self.file
            .seek(SeekFrom::Start(
                block as u64 * SECTOR_SIZE as u64 + offset as u64,
            ))
            .is_ok()
    }
}

impl BlockDev for ImageDisk {
    fn read_block(&mut self, block: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        self.at(block, 0) && self.file.read_exact(buf).is_ok()
    }

    fn write_block(&mut self, block: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
        self.at(block, 0) && self.file.write_all(buf).is_ok()
    }

    fn read_data(&mut self, block: u32, offset: u16, buf: &mut [u8]) -> bool {
        self.at(block, offset) && self.file.read_exact(buf).is_ok()
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn cmd_info(vol: &mut Volume<ImageDisk>) -> Result<()> {
    let cluster_bytes = vol.blocks_per_cluster() as u32 * SECTOR_SIZE as u32;
    println!("type:          {}", vol.fat_type());
    println!("clusters:      {}", vol.cluster_count());
    println!("cluster size:  {cluster_bytes} bytes");
    println!("root capacity: {}", match vol.root_dir_entry_count() {
        0 => "chain-sized".to_string(),
        n => format!("{n} entries"),
    });
    Ok(())
}

fn cmd_ls(vol: &mut Volume<ImageDisk>, filter: ListFilter) -> Result<()> {
    let mut root = File::open_root(vol)?;
    while let Some(name) = root.list_next(vol, filter)? {
        println!("{name}");
    }
    Ok(())
}

fn cmd_cat(vol: &mut Volume<ImageDisk>, name: &str) -> Result<()> {
    let mut root = File::open_root(vol)?;
    let mut f = File::open(vol, &mut root, name, OpenFlags::READ)?;
    let mut buf = [0u8; 4096];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let n = f.read(vol, &mut buf)?;
        if n == 0 {
            break;
        }
        if out.write_all(&buf[..n]).is_err() {
            break;
        }
    }
    f.close(vol)
}

fn cmd_write(vol: &mut Volume<ImageDisk>, name: &str, text: &str, append: bool) -> Result<()> {
    let flags = if append {
        OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::APPEND
    } else {
        OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE
    };
    let mut root = File::open_root(vol)?;
    let mut f = File::open(vol, &mut root, name, flags)?;
    let written = f.write(vol, text.as_bytes())?;
    f.close(vol)?;
    log::info!("{name}: {written} bytes written");
    Ok(())
}

fn cmd_rm(vol: &mut Volume<ImageDisk>, name: &str) -> Result<()> {
    let mut root = File::open_root(vol)?;
    let mut f = File::open(vol, &mut root, name, OpenFlags::WRITE)?;
    f.remove(vol)
}

// ─── Entry point ───────────────────────────────────────────────────────────────

fn usage() -> ExitCode {
    eprintln!(
        "usage: fatshell <image> <info | ls [files|dirs] | cat NAME | put NAME TEXT.. | append NAME TEXT.. | rm NAME>"
    );
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [image, command, rest @ ..] = args.as_slice() else {
        return usage();
    };

    let disk = match ImageDisk::open(image) {
        Ok(d) => d,
        Err(e) => {
            log::error!("{image}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut vol = match Volume::mount(disk) {
        Ok(v) => v,
        Err(e) => {
            log::error!("mount failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match (command.as_str(), rest) {
        ("info", []) => cmd_info(&mut vol),
        ("ls", []) => cmd_ls(&mut vol, ListFilter::Any),
        ("ls", [kind]) if kind == "files" => cmd_ls(&mut vol, ListFilter::Files),
        ("ls", [kind]) if kind == "dirs" => cmd_ls(&mut vol, ListFilter::Dirs),
        ("cat", [name]) => cmd_cat(&mut vol, name),
        ("put", [name, text @ ..]) if !text.is_empty() => {
            cmd_write(&mut vol, name, &text.join(" "), false)
        }
        ("append", [name, text @ ..]) if !text.is_empty() => {
            cmd_write(&mut vol, name, &text.join(" "), true)
        }
        ("rm", [name]) => cmd_rm(&mut vol, name),
        _ => return usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
