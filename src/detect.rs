use core::convert::TryFrom;

use log::{debug, warn};

use crate::gpt::{GptHeader, HeaderSlot};
use crate::io::BlockRead;
use crate::mbr::Mbr;
use crate::scratch::{ScratchAllocator, ScratchBuf};
use crate::types::{gpt_type_to_class, mbr_type_to_class};
use crate::volume::{Volume, VolumeClass};
use crate::{Error, ReadGPT, ReadMBR, Scanner};

/// What one partition-map detection added to the registry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Detection {
    /// Registry length before detection; the new partitions are `first..first + added`.
    pub first: usize,
    pub added: usize,
    /// `MbrContainer` or `GptContainer`, as written to the parent.
    pub class: VolumeClass,
    /// The GPT header the table came from. `Backup` means the primary was unusable.
    pub header: Option<HeaderSlot>,
    /// Partitions were dropped because the registry filled up.
    pub truncated: bool,
}

enum HeaderState {
    TryPrimary,
    TryBackup,
    Validated(HeaderSlot, GptHeader),
    Failed(Error),
}

/// Pick the header to trust: the primary if it validates, otherwise the backup.
fn select_header(
    primary: &[u8],
    backup: &[u8],
    sector_size: u64,
    total_sectors: u64,
) -> Result<(HeaderSlot, GptHeader), Error> {
    let mut state = HeaderState::TryPrimary;
    loop {
        state = match state {
            HeaderState::TryPrimary => {
                match GptHeader::validate(primary, HeaderSlot::Primary, sector_size, total_sectors) {
                    Ok(header) => HeaderState::Validated(HeaderSlot::Primary, header),
                    Err(e) => {
                        warn!("primary GPT header rejected: {}", e);
                        HeaderState::TryBackup
                    }
                }
            }
            HeaderState::TryBackup => {
                match GptHeader::validate(backup, HeaderSlot::Backup, sector_size, total_sectors) {
                    Ok(header) => {
                        warn!("using backup GPT header at lba {}", header.my_lba);
                        HeaderState::Validated(HeaderSlot::Backup, header)
                    }
                    Err(e) => HeaderState::Failed(e),
                }
            }
            HeaderState::Validated(slot, header) => return Ok((slot, header)),
            HeaderState::Failed(e) => return Err(e),
        }
    }
}

fn bytes_at(lba: u64, sector_size: u64) -> Result<u64, Error> {
    lba.checked_mul(sector_size).ok_or(Error::InvalidStatic {
        message: "address is beyond 2^64 bytes",
    })
}

impl<'a, D, A, const N: usize> Scanner<'a, D, A, N>
where
    D: BlockRead + ?Sized,
    A: ScratchAllocator + ?Sized,
{
    /// Read the partition table announced by `mbr`, the validated first sector of volume
    /// `parent`, and append its partitions to the registry.
    ///
    /// Returns the registry length from before the call: the appended volumes are those from
    /// there to the current end. On any failure nothing is appended and the parent is left
    /// unclassified.
    pub fn detect_partition_map(&mut self, mbr: &Mbr, parent: usize) -> usize {
        let first = self.registry.len();
        if let Err(e) = self.try_detect(mbr, parent) {
            warn!("volume {}: partition table not used: {}", parent, e);
        }
        first
    }

    /// [`Scanner::detect_partition_map`], reporting what happened.
    pub fn try_detect(&mut self, mbr: &Mbr, parent: usize) -> Result<Detection, Error> {
        let first = self.registry.len();
        let volume = *self.registry.volume(parent)?;

        if volume.is_partition() || VolumeClass::Unknown != volume.class {
            return Err(Error::InvalidStatic {
                message: "volume has already been scanned",
            });
        }

        let gpt = ReadGPT::RevisionOne == self.options.gpt && mbr.protective_entry().is_some();

        let (class, header, truncated) = if gpt {
            let (header, truncated) = self.append_gpt(&volume)?;
            (VolumeClass::GptContainer, Some(header), truncated)
        } else {
            let truncated = self.append_mbr(mbr, &volume)?;
            (VolumeClass::MbrContainer, None, truncated)
        };

        self.registry.classify(parent, class)?;

        Ok(Detection {
            first,
            added: self.registry.len() - first,
            class,
            header,
            truncated,
        })
    }

    fn append_gpt(&mut self, parent: &Volume) -> Result<(HeaderSlot, bool), Error> {
        let sector_size = u64::from(parent.sector_size);
        let sector_len = usize::try_from(sector_size).map_err(|_| Error::BiggerThanMemory)?;
        let total_sectors = parent.sector_count;
        let backup_lba = total_sectors.checked_sub(1).ok_or(Error::InvalidStatic {
            message: "disk too small for a GPT",
        })?;

        let mut primary = ScratchBuf::new(self.scratch, sector_len)?;
        let mut backup = ScratchBuf::new(self.scratch, sector_len)?;

        self.disks
            .read_disk(parent, sector_size, &mut primary[..sector_len])?;
        self.disks.read_disk(
            parent,
            bytes_at(backup_lba, sector_size)?,
            &mut backup[..sector_len],
        )?;

        let (slot, header) = select_header(&primary, &backup, sector_size, total_sectors)?;

        let table_len = header.table_len()?;
        let read_len = table_len
            .checked_add(sector_len - 1)
            .map(|len| len / sector_len * sector_len)
            .ok_or(Error::BiggerThanMemory)?;

        let mut table = ScratchBuf::new(self.scratch, read_len)?;
        self.disks.read_disk(
            parent,
            bytes_at(header.entries_lba, sector_size)?,
            &mut table[..read_len],
        )?;

        let table = &table[..table_len];
        header.check_table(table)?;

        debug!(
            "gpt disk {} from {:?} header: {} entries of {} bytes",
            header.disk_guid, slot, header.entry_count, header.entry_size
        );

        for (index, entry) in header.entries(table) {
            let volume = Volume::partition_of(
                parent,
                index as u32,
                entry.first_lba * sector_size,
                entry.sectors(),
                gpt_type_to_class(&entry.type_guid),
            );

            if self.registry.append(volume).is_none() {
                warn!(
                    "volume registry full ({} entries); ignoring the rest of the gpt",
                    self.registry.capacity()
                );
                return Ok((slot, true));
            }

            debug!(
                "gpt entry {}: type {} \"{}\" lba {}..={}",
                index,
                entry.type_guid,
                entry.label(),
                entry.first_lba,
                entry.last_lba
            );
        }

        Ok((slot, false))
    }

    fn append_mbr(&mut self, mbr: &Mbr, parent: &Volume) -> Result<bool, Error> {
        if ReadMBR::Never == self.options.mbr {
            return Err(Error::NotFound);
        }

        mbr.validate(parent)?;

        let sector_size = u64::from(parent.sector_size);

        for (index, entry) in mbr.entries.iter().enumerate() {
            if entry.is_empty() || entry.is_protective() {
                continue;
            }

            let sectors = entry.sector_range();
            let volume = Volume::partition_of(
                parent,
                index as u32,
                sectors.start * sector_size,
                sectors.end - sectors.start,
                mbr_type_to_class(entry.type_code),
            );

            if self.registry.append(volume).is_none() {
                warn!(
                    "volume registry full ({} entries); ignoring the rest of the mbr",
                    self.registry.capacity()
                );
                return Ok(true);
            }

            debug!(
                "mbr entry {}: type {:#04x}{} lba {}+{}",
                index,
                entry.type_code,
                if entry.bootable() { " (boot)" } else { "" },
                sectors.start,
                sectors.end - sectors.start
            );
        }

        Ok(false)
    }
}
