//! Streaming storage driver
//!
//! Second-phase path over the same controller as the block driver, used for
//! the bulk image reads once the partition table is known. Whole blocks go
//! straight from the controller into the caller's buffer; only the ragged
//! request edges touch an inline, hardware-aligned block, so large aligned
//! reads pay no per-call scratch copy.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::cmp::min;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use crate::error::{BootIoError, Result};
use crate::types::{ImageSpec, BLOCK_SIZE};

use super::{Connector, Device};

// DMA-safe staging block for the request edges.
#[repr(align(512))]
struct AlignedBlock([u8; BLOCK_SIZE as usize]);

/// Connector for the streaming path
pub struct StreamConnector<B: BlockIo + Clone + 'static> {
    io: B,
}

impl<B: BlockIo + Clone + 'static> StreamConnector<B> {
    /// Streaming path over a controller driver
    pub fn new(io: B) -> Self {
        Self { io }
    }
}

impl<B: BlockIo + Clone + 'static> Connector for StreamConnector<B> {
    fn kind(&self) -> &'static str {
        "stream"
    }

    fn open_device(&mut self) -> Result<Rc<RefCell<dyn Device>>> {
        let device = StreamDevice::new(self.io.clone())?;
        Ok(Rc::new(RefCell::new(device)))
    }
}

/// Direct-transfer view over the storage controller
pub struct StreamDevice<B: BlockIo> {
    io: B,
    device_size: u64,
    window: Option<(u64, u64)>,
    position: u64,
}

impl<B: BlockIo> StreamDevice<B> {
    /// Probe the controller
    pub fn new(mut io: B) -> Result<Self> {
        if io.block_size().to_u64() != BLOCK_SIZE {
            return Err(BootIoError::NotSupported);
        }
        let num_blocks = io.num_blocks().map_err(|_| BootIoError::DeviceError)?;
        Ok(Self {
            io,
            device_size: BLOCK_SIZE * num_blocks,
            window: None,
            position: 0,
        })
    }

    fn open_window(&self) -> Result<(u64, u64)> {
        self.window.ok_or(BootIoError::InvalidHandle)
    }
}

impl<B: BlockIo> Device for StreamDevice<B> {
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
        let (base, length) = self.open_window()?;
        // Saturating so an extreme window or cursor clips to nothing
        // instead of wrapping.
        let end = min(base.saturating_add(length), self.device_size);
        let mut abs = base.saturating_add(self.position);
        if abs >= end {
            return Ok(0);
        }
        let want = min(buf.len() as u64, end - abs) as usize;

        let bs = BLOCK_SIZE;
        let mut staging = AlignedBlock([0u8; BLOCK_SIZE as usize]);
        let mut done = 0usize;
        while done < want {
            let lba = Lba(abs / bs);
            let in_block = (abs % bs) as usize;
            let left = want - done;
            if in_block == 0 && left as u64 >= bs {
                let whole = ((left as u64 / bs) * bs) as usize;
                self.io
                    .read_blocks(lba, &mut buf[done..done + whole])
                    .map_err(|_| BootIoError::DeviceError)?;
                done += whole;
                abs += whole as u64;
            } else {
                self.io
                    .read_blocks(lba, &mut staging.0)
                    .map_err(|_| BootIoError::DeviceError)?;
                let take = min(bs as usize - in_block, left);
                buf[done..done + take].copy_from_slice(&staging.0[in_block..in_block + take]);
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

    fn close(&mut self) -> Result<()> {
        self.window = None;
        self.position = 0;
        Ok(())
    }
}
