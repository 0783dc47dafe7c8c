//! NVS-backed credential region.
//!
//! ESP32 flash is not byte-addressable from application code, so the region
//! is shadowed in RAM and written back to a single NVS blob on commit. This
//! preserves the write-then-explicit-commit contract of [`RawStore`].

use super::{RawStore, StorageError, REGION_LEN};
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, warn};

/// NVS namespace for the credential region.
const NVS_NAMESPACE: &str = "irblast";

/// NVS key holding the raw region blob.
const NVS_KEY: &str = "cred_region";

/// Credential region persisted as one NVS blob.
pub struct NvsRegion {
    nvs: EspNvs<NvsDefault>,
    shadow: [u8; REGION_LEN],
}

impl NvsRegion {
    /// Open (or create) the region, loading any previously committed blob
    /// into the RAM shadow. A missing or short blob reads as zeroes, which
    /// the credential store treats as the unprovisioned state.
    pub fn open() -> Result<Self, EspError> {
        let partition = crate::nvs_default_partition()?;
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;

        let mut shadow = [0u8; REGION_LEN];
        match nvs.get_raw(NVS_KEY, &mut shadow) {
            Ok(Some(blob)) => debug!("loaded credential region ({} bytes)", blob.len()),
            Ok(None) => debug!("no credential region in NVS, starting zeroed"),
            Err(e) => warn!("failed to read credential region, starting zeroed: {:?}", e),
        }

        Ok(Self { nvs, shadow })
    }
}

impl RawStore for NvsRegion {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let end = offset + buf.len();
        if end > REGION_LEN {
            return Err(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&self.shadow[offset..end]);
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
        self.shadow[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.nvs
            .set_raw(NVS_KEY, &self.shadow)
            .map_err(|e| StorageError::Backend(format!("NVS write failed: {:?}", e)))?;
        Ok(())
    }
}
