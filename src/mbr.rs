use core::ops::Range;

use crate::chs::{chs_to_lba, Chs};
use crate::le;
use crate::volume::Volume;
use crate::Error;

pub const SECTOR_SIZE: usize = 512;

pub const EMPTY_TYPE: u8 = 0x00;
pub const PROTECTIVE_TYPE: u8 = 0xee;

const FIRST_ENTRY_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;
const SIGNATURE_OFFSET: usize = 510;
const SIGNATURE: u16 = 0xaa55;

/// One of the four primary partition entries.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct MbrEntry {
    pub status: u8,
    pub first_chs: Chs,
    pub type_code: u8,
    pub last_chs: Chs,
    pub first_lba: u32,
    pub sectors: u32,
}

impl MbrEntry {
    fn parse(entry: &[u8]) -> MbrEntry {
        MbrEntry {
            status: entry[0],
            first_chs: Chs::from_packed(le::array_at(entry, 1)),
            type_code: entry[4],
            last_chs: Chs::from_packed(le::array_at(entry, 5)),
            first_lba: le::u32_at(entry, 8),
            sectors: le::u32_at(entry, 12),
        }
    }

    pub fn is_empty(&self) -> bool {
        EMPTY_TYPE == self.type_code
    }

    pub fn is_protective(&self) -> bool {
        PROTECTIVE_TYPE == self.type_code
    }

    pub fn bootable(&self) -> bool {
        0x80 == self.status
    }

    /// The sectors covered by this entry, end exclusive.
    ///
    /// The linear fields win whenever a sector count is present; otherwise the CHS triples
    /// are translated, with the last CHS address being inclusive.
    pub fn sector_range(&self) -> Range<u64> {
        if 0 != self.sectors {
            let first = u64::from(self.first_lba);
            first..first + u64::from(self.sectors)
        } else {
            let first = chs_to_lba(self.first_chs);
            let last = chs_to_lba(self.last_chs);
            first..last.saturating_add(1)
        }
    }

    /// The bytes covered by this entry, end exclusive, or `None` if they can't be addressed.
    pub fn byte_range(&self, sector_size: u64) -> Option<Range<u64>> {
        let sectors = self.sector_range();
        Some(sectors.start.checked_mul(sector_size)?..sectors.end.checked_mul(sector_size)?)
    }
}

/// A classic DOS partition table, as found in a device's first sector.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Mbr {
    pub entries: [MbrEntry; 4],
    pub signature: u16,
}

impl Mbr {
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Mbr {
        let mut entries = [MbrEntry::default(); 4];
        for (entry_id, entry) in entries.iter_mut().enumerate() {
            let offset = FIRST_ENTRY_OFFSET + entry_id * ENTRY_SIZE;
            *entry = MbrEntry::parse(&sector[offset..offset + ENTRY_SIZE]);
        }

        Mbr {
            entries,
            signature: le::u16_at(sector, SIGNATURE_OFFSET),
        }
    }

    /// The index of the first entry announcing a GPT disk, if any.
    pub fn protective_entry(&self) -> Option<usize> {
        self.entries.iter().position(MbrEntry::is_protective)
    }

    /// Check that this table can be trusted to describe `volume`.
    ///
    /// Four empty entries are "no table here", reported as [`Error::NotFound`].
    pub fn validate(&self, volume: &Volume) -> Result<(), Error> {
        if SIGNATURE != self.signature {
            return Err(Error::InvalidStatic {
                message: "missing boot signature",
            });
        }

        if volume.is_partition() {
            return Err(Error::InvalidStatic {
                message: "partitions can't contain partition tables",
            });
        }

        let sector_size = u64::from(volume.sector_size);
        let volume_len = volume.byte_len();
        let mut populated = 0;

        for entry in self.entries.iter().filter(|entry| !entry.is_empty()) {
            populated += 1;

            match entry.status {
                0x00 | 0x80 => {}
                _ => {
                    return Err(Error::InvalidStatic {
                        message: "invalid status code in partition entry",
                    })
                }
            }

            let bytes = entry
                .byte_range(sector_size)
                .ok_or(Error::InvalidStatic {
                    message: "partition is beyond addressable space",
                })?;

            if 0 == bytes.start {
                return Err(Error::InvalidStatic {
                    message: "partition overlaps the partition table",
                });
            }

            // A protective entry may claim more than the disk has; it only needs to exist.
            if bytes.end > volume_len && !entry.is_protective() {
                return Err(Error::InvalidStatic {
                    message: "partition extends past the end of the disk",
                });
            }

            if bytes.start >= bytes.end {
                return Err(Error::InvalidStatic {
                    message: "partition ends before it starts",
                });
            }
        }

        if 0 == populated {
            return Err(Error::NotFound);
        }

        Ok(())
    }
}
