//! Boot orchestrator
//!
//! Wires the storage stack together in a strict, failure-is-fatal order:
//! decode the ROM boot context, bring up the controller, read the partition
//! table over the single-use block path, resolve the required images, then
//! open the streaming and container paths and publish the policy table.
//! There is no retry path; anything unexpected ends the boot attempt.

use alloc::boxed::Box;
use log::{error, info, warn};

use gpt_disk_io::BlockIo;

use crate::device::block::BlockConnector;
use crate::device::container::{resolve_images, ContainerConnector, ImageRequest};
use crate::device::dummy::DummyConnector;
use crate::device::registry::IoRegistry;
use crate::device::stream::StreamConnector;
use crate::device::SharedBlockIo;
use crate::error::{BootIoError, Result};
use crate::partition::{read_partition_table, PartitionTable};
use crate::policy::{device_is_open, ImagePolicy, PolicyEntry};
use crate::types::{BootContext, BootInterface, ImageId, ImageSpec, BLOCK_SIZE, GPT_TABLE_BLOCKS};

/// A preloaded image extent in RAM
#[derive(Debug, Clone, Copy)]
pub struct Region {
    /// Base address the boot ROM placed the image at
    pub base: u64,
    /// Reserved size in bytes
    pub length: u64,
}

/// Build-time description of the platform image layout
pub struct BootConfig {
    /// Extent of the already-resident second-stage loader
    pub second_stage: Region,

    /// Extent of the already-resident secure monitor
    pub secure_monitor: Region,

    /// Container image holding the non-secure loader
    pub loader_image: &'static str,

    /// Every image the container must be able to serve
    pub required: &'static [ImageRequest],
}

/// SoC-specific collaborators the orchestrator drives
///
/// Clock trees, pin muxing and controller registers live behind this trait;
/// the storage core never touches them directly.
pub trait BootPlatform {
    /// Controller driver produced by `init_controller`
    type Controller: BlockIo + 'static;

    /// Map a ROM-reported instance index to its controller register base
    fn instance_base(&self, interface: BootInterface, instance: u8) -> Option<usize>;

    /// Register base used when the ROM-reported instance is unknown
    fn default_base(&self, interface: BootInterface) -> usize;

    /// Bring up the storage controller for the selected interface
    fn init_controller(
        &mut self,
        interface: BootInterface,
        reg_base: usize,
    ) -> Result<Self::Controller>;
}

/// Live storage stack produced by [`setup`]
pub struct BootStorage {
    /// Dispatch core with the dummy, streaming and container devices open
    pub registry: IoRegistry,

    /// Static image source policy
    pub policy: ImagePolicy,

    /// Partitions discovered during orchestration
    pub partitions: PartitionTable,
}

impl BootStorage {
    /// Resolve an image to its device handle and specification
    ///
    /// The only interface the generic boot sequencer needs from this layer.
    pub fn resolve(
        &self,
        id: ImageId,
    ) -> Result<(crate::device::registry::Handle, &ImageSpec)> {
        self.policy.resolve(&self.registry, id)
    }
}

/// Run the boot-storage orchestration
pub fn setup<P: BootPlatform>(
    platform: &mut P,
    ctx: &BootContext,
    config: &BootConfig,
) -> Result<BootStorage> {
    let interface = match ctx.boot_interface() {
        Some(interface) => interface,
        None => {
            error!("boot interface {} not supported", ctx.interface);
            return Err(BootIoError::UnsupportedBootInterface);
        }
    };
    log_boot_source(ctx, interface);

    if !config
        .required
        .iter()
        .any(|r| r.name == config.loader_image)
    {
        error!("loader image {} missing from required list", config.loader_image);
        return Err(BootIoError::InvalidSpec);
    }

    // Instance selection is the one non-fatal step: an unknown index falls
    // back to the interface default.
    let reg_base = match platform.instance_base(interface, ctx.instance) {
        Some(base) => base,
        None => {
            warn!("storage instance {} not known, using default", ctx.instance);
            platform.default_base(interface)
        }
    };

    let controller = platform.init_controller(interface, reg_base).map_err(|e| {
        error!("storage controller init failed at base {:#x}", reg_base);
        e
    })?;
    let io = SharedBlockIo::new(controller);

    let mut probe = io.clone();
    let device_size = probe
        .num_blocks()
        .map_err(|_| BootIoError::DeviceError)?
        * BLOCK_SIZE;

    let mut registry = IoRegistry::new();

    // No-op slots for the images the ROM already placed in RAM.
    let dummy_id = registry.register(Box::new(DummyConnector::new()))?;
    let dummy_dev = registry.open_device(dummy_id)?;

    // Single-use block path: read the partition table, then free the
    // scratch buffer and handle slot before the streaming reopen.
    let block_id = registry.register(Box::new(BlockConnector::new(io.clone())))?;
    let block_dev = registry.open_device(block_id)?;
    let gpt_io = registry.open(
        block_dev,
        &ImageSpec::Range {
            offset: 0,
            length: GPT_TABLE_BLOCKS * BLOCK_SIZE,
        },
    )?;
    let partitions = read_partition_table(&mut registry, gpt_io)?;
    registry.close(gpt_io)?;
    registry.close_device(block_dev)?;

    // Required images must all be present before any streaming handle
    // exists.
    let descriptors = resolve_images(config.required, &partitions)?;

    // Streaming reopen of the same controller for the bulk image reads.
    let stream_id = registry.register(Box::new(StreamConnector::new(io.clone())))?;
    let stream_dev = registry.open_device(stream_id)?;

    let storage = registry.shared_device(stream_dev)?;
    let container_id = registry.register(Box::new(ContainerConnector::new(descriptors, storage)))?;
    let container_dev = registry.open_device(container_id)?;

    let mut policy = ImagePolicy::new();
    policy.set(
        ImageId::SecondStage,
        PolicyEntry {
            device: dummy_dev,
            spec: ImageSpec::Range {
                offset: config.second_stage.base,
                length: config.second_stage.length,
            },
            check: device_is_open,
        },
    );
    policy.set(
        ImageId::SecureMonitor,
        PolicyEntry {
            device: dummy_dev,
            spec: ImageSpec::Range {
                offset: config.secure_monitor.base,
                length: config.secure_monitor.length,
            },
            check: device_is_open,
        },
    );
    policy.set(
        ImageId::NonSecureLoader,
        PolicyEntry {
            device: container_dev,
            spec: ImageSpec::Image(config.loader_image),
            check: device_is_open,
        },
    );
    policy.set(
        ImageId::PartitionTable,
        PolicyEntry {
            device: stream_dev,
            spec: ImageSpec::Range {
                offset: 0,
                length: GPT_TABLE_BLOCKS * BLOCK_SIZE,
            },
            check: device_is_open,
        },
    );
    policy.set(
        ImageId::ImageContainer,
        PolicyEntry {
            device: stream_dev,
            spec: ImageSpec::Range {
                offset: 0,
                length: device_size,
            },
            check: device_is_open,
        },
    );

    Ok(BootStorage {
        registry,
        policy,
        partitions,
    })
}

fn log_boot_source(ctx: &BootContext, interface: BootInterface) {
    match interface {
        BootInterface::Sd => info!("using SD card"),
        BootInterface::Emmc => info!("using eMMC"),
    }
    if ctx.instance != 0 {
        info!("  instance {}", ctx.instance);
    }
    if ctx.partition_used == 1 || ctx.partition_used == 2 {
        info!("boot used first-stage copy {}", ctx.partition_used);
    }
}
