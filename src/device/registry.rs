//! I/O dispatch core
//!
//! A small table of registered driver kinds and their open devices. All
//! handle validity rules live here: handles carry a generation, so any use
//! after close fails with `InvalidHandle` instead of silently aliasing a
//! reused slot.

use alloc::boxed::Box;
use alloc::rc::Rc;
use arrayvec::ArrayVec;
use core::cell::RefCell;

use crate::error::{BootIoError, Result};
use crate::types::{ImageSpec, MAX_CONNECTORS};

use super::{Connector, Device};

/// Reference to a registered driver kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorId(u8);

/// Opaque token for one open device instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    slot: u8,
    gen: u16,
}

/// Opaque token for one open entity on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoHandle {
    slot: u8,
    gen: u16,
}

struct Slot {
    connector: Box<dyn Connector>,
    device: Option<Rc<RefCell<dyn Device>>>,
    dev_gen: u16,
    entity_open: bool,
    entity_gen: u16,
}

/// Registry of driver kinds and open device handles
///
/// Owned by the boot orchestrator and passed by reference; constructing
/// independent registries per test case keeps the dispatch rules testable.
pub struct IoRegistry {
    slots: ArrayVec<Slot, MAX_CONNECTORS>,
}

impl IoRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: ArrayVec::new(),
        }
    }

    /// Register a driver kind
    ///
    /// Registrations are permanent for the life of the registry. A second
    /// registration of the same kind name is a configuration error.
    pub fn register(&mut self, connector: Box<dyn Connector>) -> Result<ConnectorId> {
        if self.slots.iter().any(|s| s.connector.kind() == connector.kind()) {
            return Err(BootIoError::DuplicateRegistration);
        }
        if self.slots.is_full() {
            return Err(BootIoError::RegistryFull);
        }
        self.slots.push(Slot {
            connector,
            device: None,
            dev_gen: 0,
            entity_open: false,
            entity_gen: 0,
        });
        Ok(ConnectorId((self.slots.len() - 1) as u8))
    }

    /// Open the device instance backing a connector
    ///
    /// One instance per kind: reopening a kind whose previous instance was
    /// not closed is a usage error.
    pub fn open_device(&mut self, id: ConnectorId) -> Result<Handle> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(BootIoError::InvalidHandle)?;
        if slot.device.is_some() {
            return Err(BootIoError::AlreadyOpen);
        }
        slot.device = Some(slot.connector.open_device()?);
        Ok(Handle {
            slot: id.0,
            gen: slot.dev_gen,
        })
    }

    /// Close a device, releasing its driver-owned resources
    ///
    /// Fails with `Busy` while an entity is still open on it.
    pub fn close_device(&mut self, handle: Handle) -> Result<()> {
        let slot = self.device_slot_mut(handle)?;
        if slot.entity_open {
            return Err(BootIoError::Busy);
        }
        slot.device = None;
        slot.dev_gen = slot.dev_gen.wrapping_add(1);
        Ok(())
    }

    /// Whether the device behind a handle is still open
    pub fn device_open(&self, handle: Handle) -> bool {
        self.slots
            .get(handle.slot as usize)
            .map(|s| s.device.is_some() && s.dev_gen == handle.gen)
            .unwrap_or(false)
    }

    /// Open an entity on a device
    ///
    /// Exactly one entity slot per device is reused to bound memory.
    pub fn open(&mut self, handle: Handle, spec: &ImageSpec) -> Result<IoHandle> {
        let slot = self.device_slot_mut(handle)?;
        if slot.entity_open {
            return Err(BootIoError::AlreadyOpen);
        }
        let device = slot.device.as_ref().ok_or(BootIoError::InvalidHandle)?;
        device.borrow_mut().open(spec)?;
        slot.entity_open = true;
        Ok(IoHandle {
            slot: handle.slot,
            gen: slot.entity_gen,
        })
    }

    /// Read from an open entity
    ///
    /// Never advances past the entity size; a short read signals the
    /// end of the entity.
    pub fn read(&mut self, io: IoHandle, buf: &mut [u8]) -> Result<usize> {
        let device = self.entity_device(io)?;
        let n = device.borrow_mut().read(buf)?;
        Ok(n)
    }

    /// Move the entity cursor
    pub fn seek(&mut self, io: IoHandle, pos: u64) -> Result<()> {
        self.entity_device(io)?.borrow_mut().seek(pos)
    }

    /// Size of the open entity in bytes
    pub fn size(&self, io: IoHandle) -> Result<u64> {
        self.entity_device(io)?.borrow().size()
    }

    /// Write to an open entity; drivers without write support refuse
    pub fn write(&mut self, io: IoHandle, buf: &[u8]) -> Result<usize> {
        self.entity_device(io)?.borrow_mut().write(buf)
    }

    /// Close an entity; the handle is invalid afterwards
    pub fn close(&mut self, io: IoHandle) -> Result<()> {
        let slot = self.entity_slot_mut(io)?;
        let device = slot.device.as_ref().ok_or(BootIoError::InvalidHandle)?;
        device.borrow_mut().close()?;
        slot.entity_open = false;
        slot.entity_gen = slot.entity_gen.wrapping_add(1);
        Ok(())
    }

    /// Shared reference to an open device object, for drivers layered on
    /// top of another open path (the image container over the streaming
    /// device)
    pub fn shared_device(&self, handle: Handle) -> Result<Rc<RefCell<dyn Device>>> {
        let slot = self
            .slots
            .get(handle.slot as usize)
            .ok_or(BootIoError::InvalidHandle)?;
        if slot.dev_gen != handle.gen {
            return Err(BootIoError::InvalidHandle);
        }
        slot.device
            .as_ref()
            .map(Rc::clone)
            .ok_or(BootIoError::InvalidHandle)
    }

    fn device_slot_mut(&mut self, handle: Handle) -> Result<&mut Slot> {
        let slot = self
            .slots
            .get_mut(handle.slot as usize)
            .ok_or(BootIoError::InvalidHandle)?;
        if slot.dev_gen != handle.gen || slot.device.is_none() {
            return Err(BootIoError::InvalidHandle);
        }
        Ok(slot)
    }

    fn entity_slot_mut(&mut self, io: IoHandle) -> Result<&mut Slot> {
        let slot = self
            .slots
            .get_mut(io.slot as usize)
            .ok_or(BootIoError::InvalidHandle)?;
        if !slot.entity_open || slot.entity_gen != io.gen {
            return Err(BootIoError::InvalidHandle);
        }
        Ok(slot)
    }

    fn entity_device(&self, io: IoHandle) -> Result<Rc<RefCell<dyn Device>>> {
        let slot = self
            .slots
            .get(io.slot as usize)
            .ok_or(BootIoError::InvalidHandle)?;
        if !slot.entity_open || slot.entity_gen != io.gen {
            return Err(BootIoError::InvalidHandle);
        }
        slot.device
            .as_ref()
            .map(Rc::clone)
            .ok_or(BootIoError::InvalidHandle)
    }
}

impl Default for IoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
