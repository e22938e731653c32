//! Block device driver
//!
//! Adapts arbitrary byte-range reads onto whole-block transfers, since the
//! hardware can only move complete blocks. Misaligned boundary blocks are
//! staged through a driver-owned one-block scratch buffer; the aligned
//! interior of a request is transferred directly into the caller's buffer.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use core::cell::RefCell;
use core::cmp::min;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use crate::error::{BootIoError, Result};
use crate::types::ImageSpec;

use super::{Connector, Device};

/// Connector for the scratch-buffered block path
pub struct BlockConnector<B: BlockIo + Clone + 'static> {
    io: B,
    writable: bool,
}

impl<B: BlockIo + Clone + 'static> BlockConnector<B> {
    /// Read-only block path over a controller driver
    pub fn new(io: B) -> Self {
        Self {
            io,
            writable: false,
        }
    }

    /// Enable the optional write path (read-modify-write on boundary blocks)
    pub fn with_write(mut self) -> Self {
        self.writable = true;
        self
    }
}

impl<B: BlockIo + Clone + 'static> Connector for BlockConnector<B> {
    fn kind(&self) -> &'static str {
        "block"
    }

    fn open_device(&mut self) -> Result<Rc<RefCell<dyn Device>>> {
        let device = BlockDevice::new(self.io.clone(), self.writable)?;
        Ok(Rc::new(RefCell::new(device)))
    }
}

/// Byte-addressable view over a fixed-block-size transfer primitive
pub struct BlockDevice<B: BlockIo> {
    io: B,
    block_size: u64,
    device_size: u64,
    scratch: Box<[u8]>,
    window: Option<(u64, u64)>,
    position: u64,
    writable: bool,
}

impl<B: BlockIo> BlockDevice<B> {
    /// Probe the controller and allocate the scratch block
    pub fn new(mut io: B, writable: bool) -> Result<Self> {
        let block_size = io.block_size().to_u64();
        let num_blocks = io.num_blocks().map_err(|_| BootIoError::DeviceError)?;
        Ok(Self {
            io,
            block_size,
            device_size: block_size * num_blocks,
            scratch: vec![0u8; block_size as usize].into_boxed_slice(),
            window: None,
            position: 0,
            writable,
        })
    }

    fn open_window(&self) -> Result<(u64, u64)> {
        self.window.ok_or(BootIoError::InvalidHandle)
    }

    // Bytes the current request may still touch, clipped to window and
    // device end. Saturating so an extreme window or cursor clips to
    // nothing instead of wrapping.
    fn clip(&self, requested: usize) -> Result<usize> {
        let (base, length) = self.open_window()?;
        let end = min(base.saturating_add(length), self.device_size);
        let abs = base.saturating_add(self.position);
        if abs >= end {
            return Ok(0);
        }
        Ok(min(requested as u64, end - abs) as usize)
    }
}

impl<B: BlockIo> Device for BlockDevice<B> {
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
        let (base, _) = self.open_window()?;
        let want = self.clip(buf.len())?;
        if want == 0 {
            return Ok(0);
        }

        let bs = self.block_size;
        let mut abs = base + self.position;
        let mut done = 0usize;
        while done < want {
            let lba = Lba(abs / bs);
            let in_block = (abs % bs) as usize;
            let left = want - done;
            if in_block == 0 && left as u64 >= bs {
                // Aligned interior: transfer straight into the caller's
                // buffer, no copy.
                let whole = ((left as u64 / bs) * bs) as usize;
                self.io
                    .read_blocks(lba, &mut buf[done..done + whole])
                    .map_err(|_| BootIoError::DeviceError)?;
                done += whole;
                abs += whole as u64;
            } else {
                // Boundary block: stage through scratch, copy out the
                // requested bytes only.
                self.io
                    .read_blocks(lba, &mut self.scratch)
                    .map_err(|_| BootIoError::DeviceError)?;
                let take = min(bs as usize - in_block, left);
                buf[done..done + take].copy_from_slice(&self.scratch[in_block..in_block + take]);
                done += take;
                abs += take as u64;
            }
        }

        self.position += want as u64;
        Ok(want)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.open_window()?;
        self.position = pos;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let (base, length) = self.open_window()?;
        Ok(min(length, self.device_size.saturating_sub(base)))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(BootIoError::NotSupported);
        }
        let (base, _) = self.open_window()?;
        let want = self.clip(buf.len())?;
        if want == 0 {
            return Ok(0);
        }

        let bs = self.block_size;
        let mut abs = base + self.position;
        let mut done = 0usize;
        while done < want {
            let lba = Lba(abs / bs);
            let in_block = (abs % bs) as usize;
            let left = want - done;
            if in_block == 0 && left as u64 >= bs {
                let whole = ((left as u64 / bs) * bs) as usize;
                self.io
                    .write_blocks(lba, &buf[done..done + whole])
                    .map_err(|_| BootIoError::DeviceError)?;
                done += whole;
                abs += whole as u64;
            } else {
                // Partial block: read-modify-write through scratch.
                self.io
                    .read_blocks(lba, &mut self.scratch)
                    .map_err(|_| BootIoError::DeviceError)?;
                let take = min(bs as usize - in_block, left);
                self.scratch[in_block..in_block + take].copy_from_slice(&buf[done..done + take]);
                self.io
                    .write_blocks(lba, &self.scratch)
                    .map_err(|_| BootIoError::DeviceError)?;
                done += take;
                abs += take as u64;
            }
        }

        self.position += want as u64;
        Ok(want)
    }

    fn close(&mut self) -> Result<()> {
        if self.writable {
            self.io.flush().map_err(|_| BootIoError::DeviceError)?;
        }
        self.window = None;
        self.position = 0;
        Ok(())
    }
}
