use core::convert::TryFrom;
use core::fmt::{self, Write};

use crate::checksum::{crc32, crc32_with_hole};
use crate::guid::Guid;
use crate::le;
use crate::Error;

pub const SIGNATURE: &[u8; 8] = b"EFI PART";
pub const MIN_REVISION: u32 = 0x0001_0000;
pub const MIN_HEADER_SIZE: u32 = 92;
pub const MIN_ENTRY_SIZE: u32 = 128;

const CRC_FIELD: core::ops::Range<usize> = 0x10..0x14;

/// Which of the two copies of the header a sector is supposed to hold.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HeaderSlot {
    /// LBA 1.
    Primary,
    /// The last LBA of the disk.
    Backup,
}

impl HeaderSlot {
    /// Where this header, and its counterpart, must live on a disk of `total_sectors`.
    fn expected_lbas(self, total_sectors: u64) -> Option<(u64, u64)> {
        let last = total_sectors.checked_sub(1)?;
        Some(match self {
            HeaderSlot::Primary => (1, last),
            HeaderSlot::Backup => (last, 1),
        })
    }
}

/// A validated GPT header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc: u32,
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub entries_lba: u64,
    pub entry_count: u32,
    pub entry_size: u32,
    pub entries_crc: u32,
}

impl GptHeader {
    /// Parse and validate the header held in `sector`, one full sector read from `slot`.
    ///
    /// `sector` is only borrowed: the checksum is computed as if its own field were zero.
    pub fn validate(
        sector: &[u8],
        slot: HeaderSlot,
        sector_size: u64,
        total_sectors: u64,
    ) -> Result<GptHeader, Error> {
        let sector_len = usize::try_from(sector_size).map_err(|_| Error::BiggerThanMemory)?;

        if sector.len() < sector_len || sector_len < MIN_HEADER_SIZE as usize {
            return Err(Error::InvalidStatic {
                message: "header buffer is smaller than a sector",
            });
        }
        let sector = &sector[..sector_len];

        if SIGNATURE != &sector[0x00..0x08] {
            return Err(Error::InvalidStatic {
                message: "bad EFI signature",
            });
        }

        let revision = le::u32_at(sector, 0x08);
        if revision < MIN_REVISION {
            return Err(Error::InvalidStatic {
                message: "unsupported revision",
            });
        }

        let header_size = le::u32_at(sector, 0x0c);
        if header_size < MIN_HEADER_SIZE {
            return Err(Error::InvalidStatic {
                message: "header too short",
            });
        }

        if u64::from(header_size) > sector_size {
            return Err(Error::InvalidStatic {
                message: "header larger than a sector",
            });
        }

        let header_len = header_size as usize;

        let header_crc = le::u32_at(sector, 0x10);
        if header_crc != crc32_with_hole(&sector[..header_len], CRC_FIELD) {
            return Err(Error::InvalidStatic {
                message: "header checksum mismatch",
            });
        }

        if 0 != le::u32_at(sector, 0x14) {
            return Err(Error::InvalidStatic {
                message: "unsupported data in reserved field 0x14",
            });
        }

        let (expected_mine, expected_alternate) =
            slot.expected_lbas(total_sectors)
                .ok_or(Error::InvalidStatic {
                    message: "disk too small for a GPT",
                })?;

        let my_lba = le::u64_at(sector, 0x18);
        if expected_mine != my_lba {
            return Err(Error::InvalidStatic {
                message: "header is not where it claims to be",
            });
        }

        let alternate_lba = le::u64_at(sector, 0x20);
        if expected_alternate != alternate_lba {
            return Err(Error::InvalidStatic {
                message: "alternate header is not at the other end of the disk",
            });
        }

        let first_usable_lba = le::u64_at(sector, 0x28);
        let last_usable_lba = le::u64_at(sector, 0x30);

        if first_usable_lba > last_usable_lba {
            return Err(Error::InvalidStatic {
                message: "usable lbas are backwards?!",
            });
        }

        if last_usable_lba > (u64::MAX / sector_size) {
            return Err(Error::InvalidStatic {
                message: "everything must be below the 2^64 point (~ eighteen million TB)",
            });
        }

        if last_usable_lba >= my_lba.max(alternate_lba) {
            return Err(Error::InvalidStatic {
                message: "usable area runs into the backup header",
            });
        }

        let disk_guid = Guid::from_bytes(le::array_at(sector, 0x38));

        let entries_lba = le::u64_at(sector, 0x48);
        if entries_lba <= my_lba.min(alternate_lba) || entries_lba >= my_lba.max(alternate_lba) {
            return Err(Error::InvalidStatic {
                message: "entry array is not between the headers",
            });
        }

        let entry_count = le::u32_at(sector, 0x50);
        if 0 == entry_count {
            return Err(Error::InvalidStatic {
                message: "no partition entries",
            });
        }

        let entry_size = le::u32_at(sector, 0x54);
        if entry_size < MIN_ENTRY_SIZE || 0 != entry_size % 8 {
            return Err(Error::InvalidStatic {
                message: "entry size is implausible",
            });
        }

        let entries_crc = le::u32_at(sector, 0x58);

        if !all_zero(&sector[header_len..]) {
            return Err(Error::InvalidStatic {
                message: "reserved header tail is not all empty",
            });
        }

        Ok(GptHeader {
            revision,
            header_size,
            header_crc,
            my_lba,
            alternate_lba,
            first_usable_lba,
            last_usable_lba,
            disk_guid,
            entries_lba,
            entry_count,
            entry_size,
            entries_crc,
        })
    }

    /// Size of the entry array in bytes.
    pub fn table_len(&self) -> Result<usize, Error> {
        let len = u64::from(self.entry_count) * u64::from(self.entry_size);
        usize::try_from(len).map_err(|_| Error::BiggerThanMemory)
    }

    /// Check a freshly read entry array against this header.
    ///
    /// The whole array must match the stored checksum, and every used entry must sit inside
    /// the usable area. Nothing in the array is trusted unless all of it is.
    pub fn check_table(&self, table: &[u8]) -> Result<(), Error> {
        let table = table
            .get(..self.table_len()?)
            .ok_or(Error::InvalidStatic {
                message: "entry array is truncated",
            })?;

        if self.entries_crc != crc32(table) {
            return Err(Error::InvalidStatic {
                message: "table crc invalid",
            });
        }

        for (_, entry) in self.entries(table) {
            if entry.first_lba > entry.last_lba
                || entry.first_lba < self.first_usable_lba
                || entry.last_lba > self.last_usable_lba
            {
                return Err(Error::InvalidStatic {
                    message: "partition entry is out of range",
                });
            }
        }

        Ok(())
    }

    /// The used entries of `table`, with their index in the array.
    pub fn entries<'t>(&self, table: &'t [u8]) -> impl Iterator<Item = (usize, GptEntry)> + 't {
        let entry_size = (self.entry_size as usize).max(MIN_ENTRY_SIZE as usize);
        let count = self.entry_count as usize;
        table
            .chunks_exact(entry_size)
            .take(count)
            .map(GptEntry::parse)
            .enumerate()
            .filter(|(_, entry)| !entry.type_guid.is_unused())
    }
}

/// One entry of the partition array.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GptEntry {
    pub type_guid: Guid,
    pub partition_guid: Guid,
    pub first_lba: u64,
    /// Inclusive.
    pub last_lba: u64,
    pub attributes: u64,
    name: [u16; 36],
}

impl GptEntry {
    /// `entry` must be at least 128 bytes.
    pub fn parse(entry: &[u8]) -> GptEntry {
        let mut name = [0u16; 36];
        for (idx, unit) in name.iter_mut().enumerate() {
            *unit = le::u16_at(entry, 0x38 + 2 * idx);
        }

        GptEntry {
            type_guid: Guid::from_bytes(le::array_at(entry, 0x00)),
            partition_guid: Guid::from_bytes(le::array_at(entry, 0x10)),
            first_lba: le::u64_at(entry, 0x20),
            last_lba: le::u64_at(entry, 0x28),
            attributes: le::u64_at(entry, 0x30),
            name,
        }
    }

    pub fn sectors(&self) -> u64 {
        self.last_lba.saturating_sub(self.first_lba).saturating_add(1)
    }

    pub fn label(&self) -> Label<'_> {
        Label(self)
    }

    /// The partition's label. Unpaired surrogates come out as U+FFFD.
    pub fn name(&self) -> impl Iterator<Item = char> + '_ {
        core::char::decode_utf16(self.name.iter().copied().take_while(|unit| 0 != *unit))
            .map(|c| c.unwrap_or(core::char::REPLACEMENT_CHARACTER))
    }
}

/// Displays a [`GptEntry`]'s label without allocating.
pub struct Label<'e>(&'e GptEntry);

impl fmt::Display for Label<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.name() {
            f.write_char(c)?;
        }
        Ok(())
    }
}

fn all_zero(val: &[u8]) -> bool {
    val.iter().all(|x| 0 == *x)
}
