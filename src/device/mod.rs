//! Device drivers and the dispatch core
//!
//! Every storage path is a driver implementing [`Device`], instantiated
//! through a [`Connector`] registered with the [`IoRegistry`](registry::IoRegistry).
//! The registry routes all open/read/seek/size/close calls and owns the
//! handle-lifetime rules.

pub mod block;
pub mod container;
pub mod dummy;
pub mod registry;
pub mod stream;

use alloc::rc::Rc;
use core::cell::RefCell;

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

use crate::error::{BootIoError, Result};
use crate::types::ImageSpec;

/// Contract every storage driver implements
///
/// A device exposes at most one open *entity* at a time (a byte window or a
/// named container image); the dispatch core enforces the single-slot rule
/// and never calls `read`/`seek`/`size` without a prior successful `open`.
pub trait Device {
    /// Select an addressable entity on this device
    fn open(&mut self, spec: &ImageSpec) -> Result<()>;

    /// Read from the entity cursor; a short read signals the entity
    /// boundary, not an error
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the entity cursor to an absolute byte position
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Declared size of the open entity in bytes
    fn size(&self) -> Result<u64>;

    /// Write at the entity cursor; drivers without write support keep the
    /// default
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(BootIoError::NotSupported)
    }

    /// Release the entity
    fn close(&mut self) -> Result<()>;
}

/// Factory for one driver kind
///
/// Registered once with the registry; instantiates the device object on
/// `open_device`. Exactly one instance per kind may be live at a time.
pub trait Connector {
    /// Driver kind name, unique within a registry
    fn kind(&self) -> &'static str;

    /// Instantiate the device backing this connector
    fn open_device(&mut self) -> Result<Rc<RefCell<dyn Device>>>;
}

/// Shared handle to one physical block controller
///
/// The boot sequence opens the same controller first through the block
/// adapter and later through the streaming driver, so the hardware access
/// is reference-counted. Single execution context, hence `Rc<RefCell<..>>`
/// rather than a lock.
pub struct SharedBlockIo<B: BlockIo> {
    inner: Rc<RefCell<B>>,
}

impl<B: BlockIo> SharedBlockIo<B> {
    /// Wrap a controller driver for shared use
    pub fn new(io: B) -> Self {
        Self {
            inner: Rc::new(RefCell::new(io)),
        }
    }
}

impl<B: BlockIo> Clone for SharedBlockIo<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: BlockIo> BlockIo for SharedBlockIo<B> {
    type Error = B::Error;

    fn block_size(&self) -> BlockSize {
        self.inner.borrow().block_size()
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        self.inner.borrow_mut().num_blocks()
    }

    fn read_blocks(
        &mut self,
        start_lba: Lba,
        dst: &mut [u8],
    ) -> core::result::Result<(), Self::Error> {
        self.inner.borrow_mut().read_blocks(start_lba, dst)
    }

    fn write_blocks(
        &mut self,
        start_lba: Lba,
        src: &[u8],
    ) -> core::result::Result<(), Self::Error> {
        self.inner.borrow_mut().write_blocks(start_lba, src)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.inner.borrow_mut().flush()
    }
}
