//! Find the volumes on firmware block devices before anything else in the boot is running.
//!
//! Whole devices are seeded into a fixed-capacity [`VolumeRegistry`] by device enumeration.
//! [`Scanner::discover_volumes`] then reads each one's first sector, validates any MBR or
//! GPT it finds, and appends the partitions it describes. Filesystems are left alone.

#![cfg_attr(not(feature = "std"), no_std)]

mod checksum;
mod chs;
mod detect;
mod discover;
mod errors;
mod gpt;
mod guid;
mod io;
mod le;
mod mbr;
mod scratch;
mod types;
mod volume;

pub use crate::checksum::{crc32, crc32_with_hole};
pub use crate::chs::{chs_to_lba, Chs, HEADS, SECTORS_PER_TRACK};
pub use crate::detect::Detection;
pub use crate::errors::Error;
pub use crate::gpt::{GptEntry, GptHeader, HeaderSlot, Label};
pub use crate::guid::Guid;
pub use crate::io::{BlockRead, ReadAt};
pub use crate::mbr::{Mbr, MbrEntry};
pub use crate::scratch::{Arena, ScratchAllocator, ScratchBuf};
pub use crate::types::{gpt_type_to_class, mbr_type_to_class};
pub use crate::volume::{AccessMethod, Volume, VolumeClass, VolumeRegistry};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadMBR {
    /// Legacy partition tables are read, with CHS used only where linear addresses are missing.
    Modern,
    /// Only GPT disks are partitioned. A legacy table is left for filesystem probing.
    Never,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadGPT {
    /// A valid GPT partition table as of revision 1 (2010-2017 and counting)
    RevisionOne,

    /// The protective MBR is read literally, which yields no partitions.
    Never,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Options {
    pub mbr: ReadMBR,
    pub gpt: ReadGPT,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            mbr: ReadMBR::Modern,
            gpt: ReadGPT::RevisionOne,
        }
    }
}

/// Everything volume discovery needs from the rest of the boot environment.
pub struct Scanner<'a, D, A, const N: usize>
where
    D: BlockRead + ?Sized,
    A: ScratchAllocator + ?Sized,
{
    disks: &'a mut D,
    scratch: &'a A,
    registry: &'a mut VolumeRegistry<N>,
    options: Options,
}

impl<'a, D, A, const N: usize> Scanner<'a, D, A, N>
where
    D: BlockRead + ?Sized,
    A: ScratchAllocator + ?Sized,
{
    pub fn new(
        disks: &'a mut D,
        scratch: &'a A,
        registry: &'a mut VolumeRegistry<N>,
        options: Options,
    ) -> Self {
        Scanner {
            disks,
            scratch,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &VolumeRegistry<N> {
        &*self.registry
    }
}
