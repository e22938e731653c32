//! Common test utilities: in-memory block device, GPT builders, platform stub

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::io;

use bootio::{
    BootConfig, BootInterface, BootPlatform, ImageRequest, Region, Result as BootResult,
    SharedBlockIo,
};
use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::{
    guid, BlockSize, GptHeader, GptPartitionEntryArray, GptPartitionName, GptPartitionType, Lba,
    LbaLe, U32Le,
};

/// Medium block size used throughout the tests
pub const BS: usize = 512;

/// In-memory block device standing in for the SD/eMMC controller
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
}

impl MemoryBlockDevice {
    /// Create a zero-filled device of `blocks` blocks
    pub fn new(blocks: u64) -> Self {
        Self {
            data: vec![0u8; blocks as usize * BS],
        }
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / BS) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * BS;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * BS;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Shared handle type used by every test
pub type SharedMem = SharedBlockIo<MemoryBlockDevice>;

/// Shared handle to a fresh zero-filled device
pub fn make_device(blocks: u64) -> SharedBlockIo<MemoryBlockDevice> {
    SharedBlockIo::new(MemoryBlockDevice::new(blocks))
}

/// Encode a partition name as UTF-16LE
pub fn part_name(s: &str) -> GptPartitionName {
    let mut name = GptPartitionName::default();
    for (i, ch) in s.chars().enumerate() {
        name.0[i * 2..i * 2 + 2].copy_from_slice(&(ch as u16).to_le_bytes());
    }
    name
}

/// Write a valid GPT whose entries carry explicit starting and ending LBAs
///
/// The entry array is kept to 8 entries (two blocks at LBA 2-3) so that
/// partition content starting at LBA 4 never overlaps the table itself.
pub fn format_gpt_with_ends(io: &SharedBlockIo<MemoryBlockDevice>, parts: &[(&str, u64, u64)]) {
    let num_blocks = io.clone().num_blocks().expect("device size");
    let mut disk = Disk::new(io.clone()).expect("disk handle");

    let mut header = GptHeader {
        my_lba: LbaLe::from_u64(1),
        alternate_lba: LbaLe::from_u64(num_blocks - 1),
        first_usable_lba: LbaLe::from_u64(4),
        last_usable_lba: LbaLe::from_u64(num_blocks - 4),
        disk_guid: guid!("12345678-1234-1234-1234-123456789012"),
        partition_entry_lba: LbaLe::from_u64(2),
        number_of_partition_entries: U32Le::from_u32(8),
        ..Default::default()
    };

    let layout = header
        .get_partition_entry_array_layout()
        .expect("entry array layout");

    let mut entry_buf = vec![0u8; 1024];
    let mut entry_array = GptPartitionEntryArray::new(layout, BlockSize::BS_512, &mut entry_buf)
        .expect("entry array");

    for (i, (name, start_lba, end_lba)) in parts.iter().enumerate() {
        let entry = entry_array
            .get_partition_entry_mut(i as u32)
            .expect("entry slot");
        entry.partition_type_guid =
            GptPartitionType(guid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b"));
        entry.unique_partition_guid = guid!("12345678-1234-5678-1234-567812345678");
        entry.starting_lba = LbaLe::from_u64(*start_lba);
        entry.ending_lba = LbaLe::from_u64(*end_lba);
        entry.attributes = Default::default();
        entry.name = part_name(name);
    }

    header.partition_entry_array_crc32 = entry_array.calculate_crc32();
    header.update_header_crc32();

    let mut block_buf = [0u8; BS];
    disk.write_protective_mbr(&mut block_buf).expect("mbr");
    disk.write_primary_gpt_header(&header, &mut block_buf)
        .expect("gpt header");
    disk.write_gpt_partition_entry_array(&entry_array)
        .expect("entry array write");
    disk.flush().expect("flush");
}

/// Write a valid GPT with the given partitions (name, start LBA, length in blocks)
pub fn format_gpt(io: &SharedBlockIo<MemoryBlockDevice>, parts: &[(&str, u64, u64)]) {
    let with_ends: Vec<(&str, u64, u64)> = parts
        .iter()
        .map(|(name, start_lba, len_blocks)| (*name, *start_lba, start_lba + len_blocks - 1))
        .collect();
    format_gpt_with_ends(io, &with_ends);
}

/// Standard test layout: fsbl at byte 2048 (8 KiB), ssbl at byte 10240 (16 KiB)
pub const FSBL_START_LBA: u64 = 4;
pub const FSBL_BLOCKS: u64 = 16;
pub const SSBL_START_LBA: u64 = 20;
pub const SSBL_BLOCKS: u64 = 32;

/// Format the standard two-partition layout
pub fn format_standard_gpt(io: &SharedBlockIo<MemoryBlockDevice>) {
    format_gpt(
        io,
        &[
            ("fsbl", FSBL_START_LBA, FSBL_BLOCKS),
            ("ssbl", SSBL_START_LBA, SSBL_BLOCKS),
        ],
    );
}

/// Deterministic byte pattern for content checks
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Write block-aligned bytes at a block offset
pub fn write_blocks_at(io: &SharedBlockIo<MemoryBlockDevice>, start_lba: u64, data: &[u8]) {
    assert_eq!(data.len() % BS, 0, "test data must be block aligned");
    io.clone()
        .write_blocks(Lba(start_lba), data)
        .expect("raw write");
}

/// Flip the GPT signature in place
pub fn corrupt_gpt_signature(io: &SharedBlockIo<MemoryBlockDevice>) {
    let mut io = io.clone();
    let mut block = [0u8; BS];
    io.read_blocks(Lba(1), &mut block).expect("header read");
    block[0] ^= 0xFF;
    io.write_blocks(Lba(1), &block).expect("header write");
}

/// Flip one byte inside the partition entry array without fixing the CRC
pub fn corrupt_entry_array(io: &SharedBlockIo<MemoryBlockDevice>) {
    let mut io = io.clone();
    let mut block = [0u8; BS];
    io.read_blocks(Lba(2), &mut block).expect("entry read");
    block[40] ^= 0x01; // starting LBA of the first entry
    io.write_blocks(Lba(2), &block).expect("entry write");
}

/// Register bases handed out by the platform stub
pub const SDMMC1_BASE: usize = 0x5800_0000;
pub const SDMMC2_BASE: usize = 0x5800_1000;

/// Platform stub: two known instances, recorded controller bring-ups
pub struct TestPlatform {
    pub disk: SharedBlockIo<MemoryBlockDevice>,
    pub init_bases: Vec<usize>,
    pub fail_init: bool,
}

impl TestPlatform {
    pub fn new(disk: SharedBlockIo<MemoryBlockDevice>) -> Self {
        Self {
            disk,
            init_bases: Vec::new(),
            fail_init: false,
        }
    }
}

impl BootPlatform for TestPlatform {
    type Controller = SharedBlockIo<MemoryBlockDevice>;

    fn instance_base(&self, _interface: BootInterface, instance: u8) -> Option<usize> {
        match instance {
            1 => Some(SDMMC1_BASE),
            2 => Some(SDMMC2_BASE),
            _ => None,
        }
    }

    fn default_base(&self, interface: BootInterface) -> usize {
        match interface {
            BootInterface::Sd => SDMMC1_BASE,
            BootInterface::Emmc => SDMMC2_BASE,
        }
    }

    fn init_controller(
        &mut self,
        _interface: BootInterface,
        reg_base: usize,
    ) -> BootResult<Self::Controller> {
        self.init_bases.push(reg_base);
        if self.fail_init {
            return Err(bootio::BootIoError::HardwareInit);
        }
        Ok(self.disk.clone())
    }
}

/// Required container images for the standard layout
pub const REQUIRED_IMAGES: &[ImageRequest] = &[ImageRequest {
    name: "ssbl",
    binary_type: 0x10,
}];

/// Boot configuration matching the standard layout
pub fn test_config() -> BootConfig {
    BootConfig {
        second_stage: Region {
            base: 0x2FFC_0000,
            length: 0x2_0000,
        },
        secure_monitor: Region {
            base: 0x2FFF_0000,
            length: 0x1_0000,
        },
        loader_image: "ssbl",
        required: REQUIRED_IMAGES,
    }
}
