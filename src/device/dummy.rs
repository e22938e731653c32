//! No-op driver for preloaded images
//!
//! The first-stage images (second-stage loader, secure monitor) are already
//! resident in RAM when this layer runs; the generic loader still resolves
//! them through the policy table to learn their extents. This driver
//! acknowledges reads without touching the destination and reports the
//! declared extent size.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::cmp::min;

use crate::error::{BootIoError, Result};
use crate::types::ImageSpec;

use super::{Connector, Device};

/// Connector for the no-op image slots
pub struct DummyConnector;

impl DummyConnector {
    /// Create the connector
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for DummyConnector {
    fn kind(&self) -> &'static str {
        "dummy"
    }

    fn open_device(&mut self) -> Result<Rc<RefCell<dyn Device>>> {
        Ok(Rc::new(RefCell::new(DummyDevice {
            window: None,
            position: 0,
        })))
    }
}

struct DummyDevice {
    window: Option<(u64, u64)>,
    position: u64,
}

impl Device for DummyDevice {
    fn open(&mut self, spec: &ImageSpec) -> Result<()> {
        match spec {
            ImageSpec::Range { offset, length } => {
                if self.window.is_some() {
                    return Err(BootIoError::AlreadyOpen);
                }
                self.window = Some((*offset, *length));
                self.position = 0;
                Ok(())
            }
            ImageSpec::Image(_) => Err(BootIoError::InvalidSpec),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (_, length) = self.window.ok_or(BootIoError::InvalidHandle)?;
        let remaining = length.saturating_sub(self.position);
        // Image bytes are already in place; only report the extent.
        let n = min(buf.len() as u64, remaining) as usize;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.window.ok_or(BootIoError::InvalidHandle)?;
        self.position = pos;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let (_, length) = self.window.ok_or(BootIoError::InvalidHandle)?;
        Ok(length)
    }

    fn close(&mut self) -> Result<()> {
        self.window = None;
        self.position = 0;
        Ok(())
    }
}
