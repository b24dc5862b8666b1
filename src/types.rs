//! Classify partitions by the type their table declares. No filesystem is ever inspected.

use crate::guid::Guid;
use crate::mbr::{EMPTY_TYPE, PROTECTIVE_TYPE};
use crate::volume::VolumeClass;

pub const FAT12: u8 = 0x01;
pub const FAT16_SMALL: u8 = 0x04;
pub const FAT16: u8 = 0x06;
pub const FAT32_CHS: u8 = 0x0b;
pub const FAT32_LBA: u8 = 0x0c;
pub const FAT16_LBA: u8 = 0x0e;
pub const EFI_SYSTEM: u8 = 0xef;

pub fn mbr_type_to_class(type_code: u8) -> VolumeClass {
    match type_code {
        FAT12 | FAT16_SMALL | FAT16 | FAT32_CHS | FAT32_LBA | FAT16_LBA | EFI_SYSTEM => {
            VolumeClass::Fat
        }
        EMPTY_TYPE | PROTECTIVE_TYPE => VolumeClass::Unknown,
        _ => VolumeClass::Unclassified,
    }
}

pub fn gpt_type_to_class(type_guid: &Guid) -> VolumeClass {
    if Guid::EFI_SYSTEM == *type_guid {
        VolumeClass::Fat
    } else if Guid::MICROSOFT_BASIC_DATA == *type_guid || Guid::LINUX_FILESYSTEM_DATA == *type_guid
    {
        VolumeClass::BasicData
    } else {
        VolumeClass::Unclassified
    }
}
