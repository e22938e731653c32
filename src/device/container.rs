//! Image container overlay driver
//!
//! Presents the named firmware images stored inside one physical partition
//! layout as independently addressable pseudo-devices. The per-image
//! descriptor table is built once from the discovered partition table;
//! reads delegate to the shared streaming device with the image offset
//! added and are clipped to the declared image size, so a read can never
//! spill into a neighbouring image.

use alloc::rc::Rc;
use arrayvec::ArrayVec;
use core::cell::RefCell;
use core::cmp::min;
use log::error;

use crate::error::{BootIoError, Result};
use crate::partition::PartitionTable;
use crate::types::{ImageSpec, PartName, MAX_CONTAINER_IMAGES};

use super::{Connector, Device};

/// One required image, named after its backing partition
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest {
    /// Partition name holding the image
    pub name: &'static str,
    /// Binary type tag consumed by the downstream authenticator
    pub binary_type: u32,
}

/// Resolved location of one container image
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    /// Image name (equals the backing partition name)
    pub name: PartName,
    /// Binary type tag
    pub binary_type: u32,
    /// Byte offset of the image on the medium
    pub offset: u64,
    /// Byte offset of the backup copy (0 = none)
    pub backup_offset: u64,
    /// Declared image size in bytes
    pub length: u64,
}

/// Descriptor table for one container device
pub type ImageDescriptors = ArrayVec<ImageDescriptor, MAX_CONTAINER_IMAGES>;

/// Cross-reference the required images against the discovered partitions
///
/// A missing backing partition is fatal; this runs before the streaming
/// path is opened, so a broken medium never gets a live streaming handle.
pub fn resolve_images(
    required: &[ImageRequest],
    table: &PartitionTable,
) -> Result<ImageDescriptors> {
    let mut descriptors = ImageDescriptors::new();
    for request in required {
        let entry = table.find(request.name).ok_or_else(|| {
            error!("partition {} not found", request.name);
            BootIoError::PartitionNotFound
        })?;
        let name = PartName::from(request.name).map_err(|_| BootIoError::InvalidSpec)?;
        if descriptors
            .try_push(ImageDescriptor {
                name,
                binary_type: request.binary_type,
                offset: entry.start,
                backup_offset: 0,
                length: entry.length,
            })
            .is_err()
        {
            return Err(BootIoError::InvalidSpec);
        }
    }
    Ok(descriptors)
}

/// Connector for the image container overlay
pub struct ContainerConnector {
    descriptors: ImageDescriptors,
    storage: Rc<RefCell<dyn Device>>,
}

impl ContainerConnector {
    /// Layer a container over an open storage device
    pub fn new(descriptors: ImageDescriptors, storage: Rc<RefCell<dyn Device>>) -> Self {
        Self {
            descriptors,
            storage,
        }
    }
}

impl Connector for ContainerConnector {
    fn kind(&self) -> &'static str {
        "container"
    }

    fn open_device(&mut self) -> Result<Rc<RefCell<dyn Device>>> {
        Ok(Rc::new(RefCell::new(ContainerDevice {
            descriptors: self.descriptors.clone(),
            storage: Rc::clone(&self.storage),
            selected: None,
            position: 0,
        })))
    }
}

struct ContainerDevice {
    descriptors: ImageDescriptors,
    storage: Rc<RefCell<dyn Device>>,
    selected: Option<usize>,
    position: u64,
}

impl ContainerDevice {
    fn descriptor(&self) -> Result<&ImageDescriptor> {
        let idx = self.selected.ok_or(BootIoError::InvalidHandle)?;
        Ok(&self.descriptors[idx])
    }
}

impl Device for ContainerDevice {
    fn open(&mut self, spec: &ImageSpec) -> Result<()> {
        match spec {
            ImageSpec::Image(name) => {
                if self.selected.is_some() {
                    return Err(BootIoError::AlreadyOpen);
                }
                let idx = self
                    .descriptors
                    .iter()
                    .position(|d| d.name.as_str() == *name)
                    .ok_or(BootIoError::ImageNotFound)?;
                self.selected = Some(idx);
                self.position = 0;
                Ok(())
            }
            ImageSpec::Range { .. } => Err(BootIoError::InvalidSpec),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (offset, remaining) = {
            let d = self.descriptor()?;
            (
                d.offset.saturating_add(self.position),
                d.length.saturating_sub(self.position),
            )
        };
        // Clip to the declared image size; the boundary surfaces as a
        // short read, not an error.
        let want = min(buf.len() as u64, remaining) as usize;
        if want == 0 {
            return Ok(0);
        }

        // The backend entity is opened around each transfer so the
        // streaming path stays free for direct policy reads in between.
        let mut storage = self.storage.borrow_mut();
        storage.open(&ImageSpec::Range {
            offset,
            length: remaining,
        })?;
        let transferred = match storage.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(e) => {
                let _ = storage.close();
                return Err(e);
            }
        };
        storage.close()?;

        self.position += transferred as u64;
        Ok(transferred)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.descriptor()?;
        self.position = pos;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.descriptor()?.length)
    }

    fn close(&mut self) -> Result<()> {
        self.selected = None;
        self.position = 0;
        Ok(())
    }
}
