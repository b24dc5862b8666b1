//! Volumes and the registry that holds them.
//!
//! The registry is append-only and addressed by index. Nothing hands out a reference that
//! outlives a call, so growing it can never invalidate anything a caller holds.

use core::fmt;

use heapless::Vec;

use crate::Error;

/// The block-device backend that serves a volume.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AccessMethod {
    /// Legacy BIOS extended disk services.
    Bios,
    /// UEFI block I/O protocol.
    Uefi,
    /// A disk image already resident in memory.
    Memory,
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMethod::Bios => "bios",
            AccessMethod::Uefi => "uefi",
            AccessMethod::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VolumeClass {
    /// Not yet classified, or nothing to classify.
    Unknown,
    MbrContainer,
    GptContainer,
    /// A FAT12/16/32 or EFI system partition.
    Fat,
    BasicData,
    /// A partition whose declared type we don't recognise.
    Unclassified,
}

impl fmt::Display for VolumeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeClass::Unknown => "unknown",
            VolumeClass::MbrContainer => "mbr",
            VolumeClass::GptContainer => "gpt",
            VolumeClass::Fat => "fat",
            VolumeClass::BasicData => "basic-data",
            VolumeClass::Unclassified => "unclassified",
        })
    }
}

/// An entire device, or one partition inside it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Volume {
    pub method: AccessMethod,
    pub device_id: u32,
    /// Index in the parent's partition table; `None` for a whole device.
    pub partition: Option<u32>,
    /// Required byte alignment of transfer buffers.
    pub alignment: u32,
    pub sector_size: u32,
    /// Backend-specific media identifier, e.g. the UEFI media id.
    pub media_id: u32,
    pub sector_count: u64,
    /// Offset of this volume's first byte on its device.
    pub first_byte: u64,
    pub class: VolumeClass,
}

impl Volume {
    /// A whole device, unclassified, with no transfer alignment requirement.
    pub fn disk(method: AccessMethod, device_id: u32, sector_size: u32, sector_count: u64) -> Volume {
        Volume {
            method,
            device_id,
            partition: None,
            alignment: 1,
            sector_size,
            media_id: 0,
            sector_count,
            first_byte: 0,
            class: VolumeClass::Unknown,
        }
    }

    /// A partition of `parent`. Device-level attributes are copied from the parent.
    pub fn partition_of(
        parent: &Volume,
        index: u32,
        first_byte: u64,
        sector_count: u64,
        class: VolumeClass,
    ) -> Volume {
        Volume {
            partition: Some(index),
            sector_count,
            first_byte: parent.first_byte + first_byte,
            class,
            ..*parent
        }
    }

    pub fn is_partition(&self) -> bool {
        self.partition.is_some()
    }

    pub fn byte_len(&self) -> u64 {
        self.sector_count.saturating_mul(u64::from(self.sector_size))
    }
}

/// Fixed-capacity, append-only collection of volumes.
#[derive(Debug, Default)]
pub struct VolumeRegistry<const N: usize> {
    volumes: Vec<Volume, N>,
}

impl<const N: usize> VolumeRegistry<N> {
    pub fn new() -> Self {
        VolumeRegistry { volumes: Vec::new() }
    }

    /// Register a whole device found by device enumeration.
    pub fn seed(&mut self, volume: Volume) -> Result<usize, Error> {
        if volume.is_partition() {
            return Err(Error::InvalidStatic {
                message: "only whole devices can be seeded",
            });
        }

        if 0 == volume.sector_size {
            return Err(Error::InvalidStatic {
                message: "sector size must be non-zero",
            });
        }

        self.append(volume).ok_or(Error::RegistryFull)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.volumes.is_full()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn get(&self, index: usize) -> Option<&Volume> {
        self.volumes.get(index)
    }

    pub fn volume(&self, index: usize) -> Result<&Volume, Error> {
        self.get(index).ok_or(Error::NoSuchVolume { index })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter()
    }

    /// Append, returning the new index, or `None` if there is no room.
    pub(crate) fn append(&mut self, volume: Volume) -> Option<usize> {
        let index = self.volumes.len();
        self.volumes.push(volume).ok()?;
        Some(index)
    }

    /// Record the table kind found on a container. Only possible once per volume.
    pub(crate) fn classify(&mut self, index: usize, class: VolumeClass) -> Result<(), Error> {
        let volume = self
            .volumes
            .get_mut(index)
            .ok_or(Error::NoSuchVolume { index })?;

        if volume.is_partition() || VolumeClass::Unknown != volume.class {
            return Err(Error::InvalidStatic {
                message: "volume has already been classified",
            });
        }

        volume.class = class;
        Ok(())
    }
}
