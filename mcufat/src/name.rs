//! 8.3 short-name encoding and display decoding.

use crate::error::{Error, Result};

/// Characters FAT forbids in short names.
const ILLEGAL: &[u8] = b"|<>^+=?/[];,*\"\\";

/// Encode `s` into the on-disk 11-byte space-padded uppercase form.
///
/// Rejects illegal characters, non-printable or non-ASCII bytes, more than
/// one dot, over-long name or extension parts, and an empty base name.
pub(crate) fn make_83_name(s: &str) -> Result<[u8; 11]> {
    let mut name = [b' '; 11];
    // max index for the part before the dot
    let mut n = 7usize;
    let mut i = 0usize;
    for &c in s.as_bytes() {
        if c == b'.' {
            if n == 10 {
                // only one dot allowed
                return Err(Error::BadName);
            }
            n = 10;
            i = 8;
        } else {
            if ILLEGAL.contains(&c) {
                return Err(Error::BadName);
            }
            if i > n || c < 0x21 || c > 0x7E {
                return Err(Error::BadName);
            }
            name[i] = c.to_ascii_uppercase();
            i += 1;
        }
    }
    // must have a base name, extension is optional
    if name[0] == b' ' {
        return Err(Error::BadName);
    }
    Ok(name)
}

/// A decoded short name: dot-separated, with a trailing `/` on directories.
/// At most 13 bytes ("XXXXXXXX.YYY" plus the slash).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortName {
    buf: [u8; 13],
    len: u8,
}

impl ShortName {
    pub(crate) fn decode(raw: &[u8; 11], is_dir: bool) -> Self {
        let mut buf = [0u8; 13];
        let mut w = 0usize;
        for (i, &c) in raw.iter().enumerate() {
            if c == b' ' {
                continue;
            }
            if i == 8 {
                buf[w] = b'.';
                w += 1;
            }
            buf[w] = c;
            w += 1;
        }
        if is_dir {
            buf[w] = b'/';
            w += 1;
        }
        ShortName { buf, len: w as u8 }
    }

    pub fn as_str(&self) -> &str {
        // the encoder only ever stores printable ASCII
        core::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }
}

impl core::fmt::Display for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
