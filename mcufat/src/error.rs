//! Driver error type.

/// Result alias used by every fallible driver operation.
pub type Result<T> = core::result::Result<T, Error>;

/// What went wrong. Operations fail fast: on error the device state is
/// whatever the already-completed sector transfers left behind, and a
/// partially advanced file cursor reflects exactly the bytes moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Partition table or boot sector failed validation, or the cluster
    /// geometry is unsupported.
    BadVolume,
    /// The block device reported a read or write failure.
    Io,
    /// A name could not be encoded as a legal 8.3 short name.
    BadName,
    /// Name not present in the directory (and creation was not requested).
    NotFound,
    /// Create + exclusive requested but the name already exists.
    AlreadyExists,
    /// Operation not permitted on this handle (read-only file, directory,
    /// missing access mode).
    AccessDenied,
    /// Seek or truncate past the file size, or a cluster index outside the
    /// FAT.
    OutOfBounds,
    /// FAT traversal hit an invalid entry or exceeded the chain-length
    /// bound (corrupt media).
    BadChain,
    /// No run of free clusters large enough, or the directory cannot grow.
    NoSpace,
    /// Operation on a closed handle.
    NotOpen,
    /// Operation the volume's FAT type cannot support (FAT12 data access).
    Unsupported,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::BadVolume => "invalid or unsupported volume",
            Error::Io => "block device I/O failure",
            Error::BadName => "illegal 8.3 name",
            Error::NotFound => "no such file or directory",
            Error::AlreadyExists => "file already exists",
            Error::AccessDenied => "operation not permitted",
            Error::OutOfBounds => "position outside file or FAT bounds",
            Error::BadChain => "corrupt cluster chain",
            Error::NoSpace => "no space left in volume or directory",
            Error::NotOpen => "handle is not open",
            Error::Unsupported => "unsupported on this FAT type",
        };
        f.write_str(msg)
    }
}
