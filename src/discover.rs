use core::convert::TryFrom;

use log::{debug, error, info, warn};

use crate::io::BlockRead;
use crate::mbr::{self, Mbr};
use crate::scratch::{ScratchAllocator, ScratchBuf};
use crate::volume::Volume;
use crate::{Error, Scanner};

impl<'a, D, A, const N: usize> Scanner<'a, D, A, N>
where
    D: BlockRead + ?Sized,
    A: ScratchAllocator + ?Sized,
{
    /// Look for partition tables on every volume registered so far.
    ///
    /// Partitions appended during the pass are not themselves scanned. Volumes without a
    /// valid MBR are left as they are, for filesystem probing later in the boot.
    ///
    /// Returns whether any volume could be read at all, whatever was found on it.
    pub fn discover_volumes(&mut self) -> bool {
        let seeded = self.registry.len();
        if 0 == seeded {
            error!("no volumes to scan");
            return false;
        }

        let mut readable = false;

        for index in 0..seeded {
            let volume = match self.registry.get(index) {
                Some(volume) => *volume,
                None => break,
            };

            let mbr = match self.read_boot_sector(&volume) {
                Ok(mbr) => mbr,
                Err(e) => {
                    warn!("volume {}: unreadable, skipping: {}", index, e);
                    continue;
                }
            };

            readable = true;

            if let Err(e) = mbr.validate(&volume) {
                debug!("volume {}: no partition table: {}", index, e);
                continue;
            }

            let first = self.detect_partition_map(&mbr, index);
            for child in first..self.registry.len() {
                if let Some(child_volume) = self.registry.get(child) {
                    report(child, child_volume);
                }
            }
        }

        if readable {
            info!("ok: {} volumes after discovery", self.registry.len());
        } else {
            error!("none of the {} volumes could be read", seeded);
        }

        readable
    }

    fn read_boot_sector(&mut self, volume: &Volume) -> Result<Mbr, Error> {
        let sector_len =
            usize::try_from(volume.sector_size).map_err(|_| Error::BiggerThanMemory)?;
        let read_len = sector_len.max(mbr::SECTOR_SIZE);

        let mut buf = ScratchBuf::new(self.scratch, read_len)?;
        self.disks.read_disk(volume, 0, &mut buf[..read_len])?;

        let mut sector = [0u8; mbr::SECTOR_SIZE];
        sector.copy_from_slice(&buf[..mbr::SECTOR_SIZE]);
        Ok(Mbr::parse(&sector))
    }
}

fn report(index: usize, volume: &Volume) {
    info!(
        "volume {}: {} device {} partition {} {}: {} sectors of {} bytes, {} bytes at {}",
        index,
        volume.method,
        volume.device_id,
        volume.partition.unwrap_or(u32::MAX),
        volume.class,
        volume.sector_count,
        volume.sector_size,
        volume.byte_len(),
        volume.first_byte,
    );
}
