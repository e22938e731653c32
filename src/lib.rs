//! Boot Storage and Image Resolution Layer
//!
//! A `no_std` storage I/O framework for pre-OS secure boot firmware: locate,
//! open and stream a fixed set of named firmware images out of raw SD/eMMC
//! storage, with a few kilobytes of scratch RAM and a single execution
//! context.
//!
//! # Overview
//!
//! The crate provides:
//! - A registry of swappable storage-device drivers with opaque handles
//! - A block-device adapter with alignment-safe scratch buffering
//! - A GUID Partition Table reader over a block-path handle
//! - An image-container overlay mapping named images to partition sub-ranges
//! - A boot orchestrator wiring these together in a strict, fatal-on-error
//!   order, and a policy resolver answering "where do I get image X from"
//!
//! # Architecture
//!
//! The implementation is layered, leaves first:
//! 1. **Device layer** - drivers behind the [`Device`]/[`Connector`] traits,
//!    dispatched through the [`IoRegistry`] handle table
//! 2. **Partition layer** - GPT parsing into a bounded [`PartitionTable`]
//! 3. **Container layer** - per-image descriptors over one streaming path
//! 4. **Boot layer** - orchestration and the static [`ImagePolicy`]
//!
//! # Usage
//!
//! ```ignore
//! use bootio::{setup, BootConfig, BootContext, ImageId};
//!
//! // Orchestrate the storage stack from the ROM boot context
//! let storage = setup(&mut platform, &boot_context, &config)?;
//!
//! // Resolve an image and stream it
//! let (device, spec) = storage.resolve(ImageId::NonSecureLoader)?;
//! let io = storage.registry.open(device, spec)?;
//! let len = storage.registry.size(io)?;
//! storage.registry.read(io, &mut load_buffer)?;
//! ```
//!
//! Cryptographic image authentication, SoC bring-up and the post-load power
//! state machine are external collaborators; they consume the handles and
//! descriptors produced here.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod boot;
pub mod device;
pub mod error;
pub mod partition;
pub mod policy;
pub mod types;

pub use error::{BootIoError, Result};
pub use types::{BootContext, BootInterface, ImageId, ImageSpec, PartName};

// High-level API exports
pub use boot::{setup, BootConfig, BootPlatform, BootStorage, Region};
pub use device::container::{ImageDescriptor, ImageRequest};
pub use device::registry::{ConnectorId, Handle, IoHandle, IoRegistry};
pub use device::{Connector, Device, SharedBlockIo};
pub use partition::{read_partition_table, PartitionEntry, PartitionTable};
pub use policy::{ImagePolicy, PolicyEntry};
