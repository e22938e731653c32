//! Error types for boot storage operations

use core::fmt;

/// Result type for boot storage operations
pub type Result<T> = core::result::Result<T, BootIoError>;

/// Errors that can occur while resolving and reading boot images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootIoError {
    /// A driver kind was registered twice
    DuplicateRegistration,

    /// No free connector slots left in the registry
    RegistryFull,

    /// Handle does not refer to an open device or entity
    InvalidHandle,

    /// Device (or its entity slot) is already open
    AlreadyOpen,

    /// Device still has an open entity
    Busy,

    /// Operation not offered by this driver
    NotSupported,

    /// Specification shape not understood by this driver
    InvalidSpec,

    /// Underlying block transfer failed
    DeviceError,

    /// Partition table signature or checksum invalid
    InvalidPartitionTable,

    /// Named partition absent from the partition table
    PartitionNotFound,

    /// Required container image absent from the medium
    ImageNotFound,

    /// Storage controller bring-up failed
    HardwareInit,

    /// ROM boot context names an interface this loader cannot drive
    UnsupportedBootInterface,

    /// No policy entry for the requested image identifier
    UnknownImageId,

    /// Policy entry references a device that is not open
    DeviceNotOpen,
}

impl fmt::Display for BootIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRegistration => write!(f, "driver kind registered twice"),
            Self::RegistryFull => write!(f, "device registry is full"),
            Self::InvalidHandle => write!(f, "handle is not open"),
            Self::AlreadyOpen => write!(f, "device instance already open"),
            Self::Busy => write!(f, "device has an open entity"),
            Self::NotSupported => write!(f, "operation not supported by driver"),
            Self::InvalidSpec => write!(f, "specification not understood by driver"),
            Self::DeviceError => write!(f, "block transfer failed"),
            Self::InvalidPartitionTable => write!(f, "partition table invalid"),
            Self::PartitionNotFound => write!(f, "partition not found"),
            Self::ImageNotFound => write!(f, "required image not found"),
            Self::HardwareInit => write!(f, "storage controller init failed"),
            Self::UnsupportedBootInterface => write!(f, "boot interface not supported"),
            Self::UnknownImageId => write!(f, "no policy for image identifier"),
            Self::DeviceNotOpen => write!(f, "backing device not open"),
        }
    }
}
