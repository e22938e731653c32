//! Image source policy resolver
//!
//! A fixed-size table, keyed by [`ImageId`], mapping each image to the
//! device handle and specification the generic loader should use. Built
//! once by the boot orchestrator and read-only afterwards; it is the single
//! source of truth for "where do I get image X from".

use crate::device::registry::{Handle, IoRegistry};
use crate::error::{BootIoError, Result};
use crate::types::{ImageId, ImageSpec};

/// Availability check for one policy entry
///
/// Must be idempotent and free of side effects; the loader may resolve the
/// same image more than once.
pub type AvailabilityCheck = fn(&IoRegistry, Handle) -> bool;

/// Availability check verifying that the backing device is open
pub fn device_is_open(reg: &IoRegistry, handle: Handle) -> bool {
    reg.device_open(handle)
}

/// Source of one image: device handle, spec and availability check
#[derive(Clone, Copy)]
pub struct PolicyEntry {
    /// Device the image is served from
    pub device: Handle,
    /// Where the image lives on that device
    pub spec: ImageSpec,
    /// Gate evaluated on every resolution
    pub check: AvailabilityCheck,
}

/// Static mapping from image identifier to its storage source
pub struct ImagePolicy {
    entries: [Option<PolicyEntry>; ImageId::ALL.len()],
}

impl ImagePolicy {
    /// Empty policy table
    pub fn new() -> Self {
        Self {
            entries: [None; ImageId::ALL.len()],
        }
    }

    /// Install the entry for an image identifier
    pub fn set(&mut self, id: ImageId, entry: PolicyEntry) {
        self.entries[id.index()] = Some(entry);
    }

    /// Resolve an image identifier to its device handle and spec
    ///
    /// A missing entry means orchestration never completed for this id and
    /// is a programming error, not a recoverable condition.
    pub fn resolve(&self, reg: &IoRegistry, id: ImageId) -> Result<(Handle, &ImageSpec)> {
        let entry = self.entries[id.index()]
            .as_ref()
            .ok_or(BootIoError::UnknownImageId)?;
        if !(entry.check)(reg, entry.device) {
            return Err(BootIoError::DeviceNotOpen);
        }
        Ok((entry.device, &entry.spec))
    }
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self::new()
    }
}
