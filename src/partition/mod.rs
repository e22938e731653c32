//! GUID Partition Table reader
//!
//! Parses the fixed GPT header region at the start of the medium through an
//! open block-path entity and keeps the named partitions in a bounded
//! in-memory table. A bad signature or checksum is fatal and never yields a
//! partially populated table; there is no fallback layout.

use alloc::vec;
use arrayvec::ArrayVec;
use log::error;

use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::{BlockSize, GptPartitionName, Lba};

use crate::device::registry::{IoHandle, IoRegistry};
use crate::error::{BootIoError, Result};
use crate::types::{PartName, BLOCK_SIZE, MAX_PARTITIONS};

// Upper bound accepted for the on-disk entry array (128 entries of 128
// bytes, the usual layout).
const MAX_ENTRY_ARRAY_BYTES: usize = 16 * 1024;

/// One discovered partition, in byte units
#[derive(Debug, Clone)]
pub struct PartitionEntry {
    /// Partition name from the GPT entry
    pub name: PartName,
    /// Start offset on the medium in bytes
    pub start: u64,
    /// Length in bytes
    pub length: u64,
}

/// Bounded table of discovered partitions
///
/// Populated once per boot sequence, never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    entries: ArrayVec<PartitionEntry, MAX_PARTITIONS>,
}

impl PartitionTable {
    /// Look up a partition by exact name
    pub fn find(&self, name: &str) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.name.as_str() == name)
    }

    /// Iterate over the discovered partitions
    pub fn iter(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries.iter()
    }

    /// Number of discovered partitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no partitions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the GPT through an open block-path entity
///
/// The entity is expected to cover the header region at block 0 (see
/// [`GPT_TABLE_BLOCKS`](crate::types::GPT_TABLE_BLOCKS)). Signature and
/// both CRCs are verified before any entry is kept.
pub fn read_partition_table(reg: &mut IoRegistry, io: IoHandle) -> Result<PartitionTable> {
    let adapter = EntityBlockIo { reg, io };
    let mut disk = Disk::new(adapter).map_err(|_| BootIoError::InvalidPartitionTable)?;

    let mut block_buf = [0u8; BLOCK_SIZE as usize];
    let header = disk
        .read_primary_gpt_header(&mut block_buf)
        .map_err(|_| {
            error!("GPT header unreadable");
            BootIoError::InvalidPartitionTable
        })?;

    if !header.is_signature_valid() {
        error!("GPT signature invalid");
        return Err(BootIoError::InvalidPartitionTable);
    }
    let mut check = header.clone();
    check.update_header_crc32();
    if check.header_crc32 != header.header_crc32 {
        error!("GPT header checksum mismatch");
        return Err(BootIoError::InvalidPartitionTable);
    }

    let layout = header
        .get_partition_entry_array_layout()
        .map_err(|_| BootIoError::InvalidPartitionTable)?;

    let mut entry_buf = vec![0u8; MAX_ENTRY_ARRAY_BYTES];
    let entry_array = disk
        .read_gpt_partition_entry_array(layout, &mut entry_buf)
        .map_err(|_| {
            error!("GPT entry array unreadable");
            BootIoError::InvalidPartitionTable
        })?;
    if entry_array.calculate_crc32() != header.partition_entry_array_crc32 {
        error!("GPT entry array checksum mismatch");
        return Err(BootIoError::InvalidPartitionTable);
    }

    let mut table = PartitionTable::default();
    for i in 0..layout.num_entries {
        let entry = match entry_array.get_partition_entry(i) {
            Some(e) => e,
            None => break,
        };
        if !entry.is_used() {
            continue;
        }

        let start_lba = entry.starting_lba.to_u64();
        let end_lba = entry.ending_lba.to_u64();
        if end_lba < start_lba {
            error!("GPT entry {} has an inverted range", i);
            return Err(BootIoError::InvalidPartitionTable);
        }

        // Checked conversion to byte units: a CRC-valid entry can still
        // carry LBAs past the addressable range.
        let start = start_lba.checked_mul(BLOCK_SIZE);
        let length = (end_lba - start_lba)
            .checked_add(1)
            .and_then(|blocks| blocks.checked_mul(BLOCK_SIZE));
        let (start, length) = match (start, length) {
            (Some(start), Some(length)) => (start, length),
            _ => {
                error!("GPT entry {} exceeds the addressable range", i);
                return Err(BootIoError::InvalidPartitionTable);
            }
        };

        let parsed = PartitionEntry {
            name: decode_name(&entry.name),
            start,
            length,
        };
        if table.entries.try_push(parsed).is_err() {
            break; // table full
        }
    }

    Ok(table)
}

// GPT names are UTF-16LE, 36 units, NUL-terminated when shorter.
fn decode_name(name: &GptPartitionName) -> PartName {
    let mut out = PartName::new();
    for unit in name.0.chunks_exact(2) {
        let c = u16::from_le_bytes([unit[0], unit[1]]);
        if c == 0 {
            break;
        }
        let ch = match char::from_u32(u32::from(c)) {
            Some(ch) => ch,
            None => break,
        };
        if out.try_push(ch).is_err() {
            break;
        }
    }
    out
}

// gpt_disk_io view of an open block-path entity; routes block reads
// through the dispatch core.
struct EntityBlockIo<'a> {
    reg: &'a mut IoRegistry,
    io: IoHandle,
}

impl BlockIo for EntityBlockIo<'_> {
    type Error = BootIoError;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        Ok(self.reg.size(self.io)? / BLOCK_SIZE)
    }

    fn read_blocks(
        &mut self,
        start_lba: Lba,
        dst: &mut [u8],
    ) -> core::result::Result<(), Self::Error> {
        self.reg.seek(self.io, start_lba.0 * BLOCK_SIZE)?;
        let mut done = 0;
        while done < dst.len() {
            let n = self.reg.read(self.io, &mut dst[done..])?;
            if n == 0 {
                // Header region ended before the requested blocks.
                return Err(BootIoError::DeviceError);
            }
            done += n;
        }
        Ok(())
    }

    fn write_blocks(
        &mut self,
        _start_lba: Lba,
        _src: &[u8],
    ) -> core::result::Result<(), Self::Error> {
        Err(BootIoError::NotSupported)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}
