//! Persistent credential storage.
//!
//! Credentials live in a fixed-layout byte region: the network name in
//! `[0, 32)`, the secret in `[32, 96)`, both NUL-terminated, and a single
//! initialized-flag byte at offset 96. The region is written through the
//! [`RawStore`] trait, which models write-then-explicit-commit non-volatile
//! memory.
//!
//! Durability is byte-granular only: a power loss between `write` and
//! `commit`, or mid-commit, can leave a torn record. `has_credentials`
//! tolerates that by checking the flag *and* the field contents.

#[cfg(feature = "esp32")]
mod nvs;

#[cfg(feature = "esp32")]
pub use nvs::NvsRegion;

use crate::credentials::Credentials;
use log::debug;
use std::fmt;

/// Offset of the NUL-terminated network name.
pub const NAME_OFFSET: usize = 0;

/// Size of the network name region.
pub const NAME_LEN: usize = 32;

/// Offset of the NUL-terminated secret.
pub const SECRET_OFFSET: usize = 32;

/// Size of the secret region.
pub const SECRET_LEN: usize = 64;

/// Offset of the initialized-flag byte.
pub const FLAG_OFFSET: usize = 96;

/// Minimum size of the backing region.
pub const REGION_LEN: usize = 160;

/// Byte-addressable non-volatile region with explicit commit.
pub trait RawStore {
    /// Fill `buf` from the region starting at `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` into the region starting at `offset`. Not durable until
    /// [`RawStore::commit`] is called.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Flush all pending writes to non-volatile memory.
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Storage failures.
///
/// Absence of credentials is never an error; these only cover backing-store
/// I/O problems.
#[derive(Debug)]
pub enum StorageError {
    /// Access past the end of the region.
    OutOfBounds { offset: usize, len: usize },
    /// Backing store failure (NVS write error and the like).
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len } => {
                write!(f, "access out of bounds: {} bytes at offset {}", len, offset)
            }
            Self::Backend(msg) => write!(f, "storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Fixed-layout credential store over a [`RawStore`] region.
pub struct CredentialStore<S: RawStore> {
    store: S,
}

impl<S: RawStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a credential pair and set the initialized flag.
    ///
    /// Field truncation is enforced by [`Credentials`] itself, so both runs
    /// always fit their regions including the terminator.
    pub fn save(&mut self, creds: &Credentials) -> Result<(), StorageError> {
        self.write_field(NAME_OFFSET, creds.network_name().as_bytes())?;
        self.write_field(SECRET_OFFSET, creds.secret().as_bytes())?;
        self.store.write(FLAG_OFFSET, &[1])?;
        self.store.commit()?;
        debug!("credentials saved for network {:?}", creds.network_name());
        Ok(())
    }

    /// Load whatever is stored. Fields never written come back empty.
    pub fn load(&self) -> Result<Credentials, StorageError> {
        let name = self.read_field(NAME_OFFSET, NAME_LEN)?;
        let secret = self.read_field(SECRET_OFFSET, SECRET_LEN)?;
        Ok(Credentials::new(name, secret))
    }

    /// True only if the initialized flag is set *and* both stored fields are
    /// non-empty. The double check tolerates a store that was flagged
    /// initialized but holds empty or torn data.
    pub fn has_credentials(&self) -> bool {
        if !self.initialized() {
            return false;
        }
        match self.load() {
            Ok(creds) => creds.is_complete(),
            Err(e) => {
                debug!("credential load failed, treating store as empty: {}", e);
                false
            }
        }
    }

    /// Zero both fields and clear the initialized flag.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.store.write(NAME_OFFSET, &[0u8; NAME_LEN])?;
        self.store.write(SECRET_OFFSET, &[0u8; SECRET_LEN])?;
        self.store.write(FLAG_OFFSET, &[0])?;
        self.store.commit()
    }

    fn initialized(&self) -> bool {
        let mut flag = [0u8; 1];
        match self.store.read(FLAG_OFFSET, &mut flag) {
            Ok(()) => flag[0] != 0,
            Err(_) => false,
        }
    }

    /// Write a NUL-terminated byte run at `offset`.
    fn write_field(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.write(offset, bytes)?;
        self.store.write(offset + bytes.len(), &[0])
    }

    /// Read a field as bytes up to the first NUL, or the whole region if no
    /// terminator is present. Invalid UTF-8 is replaced rather than failed:
    /// a mangled name will simply never match a real network.
    fn read_field(&self, offset: usize, len: usize) -> Result<String, StorageError> {
        let mut buf = vec![0u8; len];
        self.store.read(offset, &mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

/// Volatile in-memory region, used by tests and the host binary.
pub struct MemoryStore {
    bytes: [u8; REGION_LEN],
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            bytes: [0u8; REGION_LEN],
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RawStore for MemoryStore {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let end = offset + buf.len();
        if end > REGION_LEN {
            return Err(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let end = offset + data.len();
        if end > REGION_LEN {
            return Err(StorageError::OutOfBounds {
                offset,
                len: data.len(),
            });
        }
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
