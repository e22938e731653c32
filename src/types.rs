//! Common types and constants for the boot storage layer

use arrayvec::ArrayString;

/// Transfer block size of the backing medium (SD/eMMC sector)
pub const BLOCK_SIZE: u64 = 512;

/// Size of the GPT header region in blocks (protective MBR + header + entries)
pub const GPT_TABLE_BLOCKS: u64 = 34;

/// Maximum partitions kept from the on-disk table
pub const MAX_PARTITIONS: usize = 16;

/// Maximum images described by one container device
pub const MAX_CONTAINER_IMAGES: usize = 8;

/// Maximum registered driver kinds
pub const MAX_CONNECTORS: usize = 8;

/// Maximum UTF-8 bytes kept of a partition name (GPT names are 36 UTF-16 units)
pub const PART_NAME_LEN: usize = 36;

/// Fixed-capacity partition/image name
pub type PartName = ArrayString<PART_NAME_LEN>;

/// Identifiers of the images this loader can be asked to locate
///
/// The identifier space is fixed at build time; every variant has exactly
/// one policy entry once orchestration completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageId {
    /// Second-stage loader, already resident in RAM
    SecondStage,
    /// Secure monitor, already resident in RAM
    SecureMonitor,
    /// Non-secure loader, streamed out of the image container
    NonSecureLoader,
    /// The GPT header region itself
    PartitionTable,
    /// The whole platform image container
    ImageContainer,
}

impl ImageId {
    /// All identifiers, in policy-table order
    pub const ALL: [ImageId; 5] = [
        ImageId::SecondStage,
        ImageId::SecureMonitor,
        ImageId::NonSecureLoader,
        ImageId::PartitionTable,
        ImageId::ImageContainer,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ImageId::SecondStage => 0,
            ImageId::SecureMonitor => 1,
            ImageId::NonSecureLoader => 2,
            ImageId::PartitionTable => 3,
            ImageId::ImageContainer => 4,
        }
    }
}

/// Where an image lives relative to its device
///
/// Each driver only accepts the spec shapes it understands; a mismatch is
/// caught as [`InvalidSpec`](crate::BootIoError::InvalidSpec) at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSpec {
    /// Fixed byte range on the backing device
    Range {
        /// Start offset in bytes
        offset: u64,
        /// Length in bytes
        length: u64,
    },
    /// Named lookup key inside a container device
    Image(&'static str),
}

/// Physical interface the boot ROM loaded the first stage from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootInterface {
    /// SD card slot
    Sd,
    /// Embedded MMC
    Emmc,
}

/// ROM-provided selector value for SD
pub const BOOT_IF_SD: u8 = 1;

/// ROM-provided selector value for eMMC
pub const BOOT_IF_EMMC: u8 = 2;

/// Read-only boot context handed over by the boot ROM
///
/// Consumed once at orchestration start, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct BootContext {
    /// Selected interface (`BOOT_IF_SD` / `BOOT_IF_EMMC`)
    pub interface: u8,

    /// Controller instance index used by the ROM (0 = unspecified)
    pub instance: u8,

    /// Which first-stage copy booted (1 or 2, 0 = unknown)
    pub partition_used: u8,
}

impl BootContext {
    /// Decode the ROM interface selector
    pub fn boot_interface(&self) -> Option<BootInterface> {
        match self.interface {
            BOOT_IF_SD => Some(BootInterface::Sd),
            BOOT_IF_EMMC => Some(BootInterface::Emmc),
            _ => None,
        }
    }
}
