use crate::volume::Volume;
use crate::Error;

/// The firmware's block-read service, as seen by volume discovery.
///
/// Reads are all-or-nothing: on `Err` the contents of `buf` are unspecified and are never
/// interpreted. A slow or stuck device is the implementation's problem to bound.
pub trait BlockRead {
    /// Fill `buf` from `volume`, starting `pos` bytes into the volume.
    fn read_disk(&mut self, volume: &Volume, pos: u64, buf: &mut [u8]) -> Result<(), Error>;
}

/// Positioned reads from a single device.
pub trait ReadAt {
    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<(), Error>;
}

#[cfg(feature = "std")]
impl<R: positioned_io2::ReadAt> ReadAt for R {
    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<(), Error> {
        use crate::errors::IoSnafu;
        use snafu::prelude::*;
        positioned_io2::ReadAt::read_exact_at(self, pos, buf).context(IoSnafu { pos })
    }
}

/// Out-of-range reads are reported against device 0; [`BlockRead`] for `[R]` fills in the
/// real device.
#[cfg(not(feature = "std"))]
impl<'a> ReadAt for &'a [u8] {
    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<(), Error> {
        use core::convert::TryFrom;
        let read_len = u64::try_from(buf.len()).map_err(|_| Error::BiggerThanMemory)?;
        let self_len = u64::try_from(self.len()).map_err(|_| Error::BiggerThanMemory)?;
        if pos.checked_add(read_len).map_or(true, |end| end > self_len) {
            return Err(Error::Read {
                device: 0,
                pos,
                len: buf.len(),
            });
        }
        let start = usize::try_from(pos).map_err(|_| Error::BiggerThanMemory)?;
        let end = start
            .checked_add(buf.len())
            .ok_or(Error::BiggerThanMemory)?;

        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

/// A set of devices indexed by [`Volume::device_id`]; partitions read through their parent
/// device at their byte offset.
impl<R: ReadAt> BlockRead for [R] {
    fn read_disk(&mut self, volume: &Volume, pos: u64, buf: &mut [u8]) -> Result<(), Error> {
        let failed = Error::Read {
            device: volume.device_id,
            pos,
            len: buf.len(),
        };

        let device = match self.get(volume.device_id as usize) {
            Some(device) => device,
            None => return Err(failed),
        };

        let end = pos.checked_add(buf.len() as u64);
        if end.map_or(true, |end| end > volume.byte_len()) {
            return Err(failed);
        }

        let absolute = match volume.first_byte.checked_add(pos) {
            Some(absolute) => absolute,
            None => return Err(failed),
        };

        device
            .read_exact_at(absolute, buf)
            .map_err(|e| match e {
                Error::Read { len, .. } => Error::Read {
                    device: volume.device_id,
                    pos,
                    len,
                },
                other => other,
            })
    }
}

#[cfg(all(test, not(feature = "std")))]
mod tests {
    use super::*;
    use crate::volume::AccessMethod;

    #[test]
    fn slice_bounds() {
        let image = [7u8; 1024];
        let device: &[u8] = &image;

        let mut buf = [0u8; 512];
        device.read_exact_at(512, &mut buf).unwrap();
        assert!(buf.iter().all(|b| 7 == *b));

        assert!(matches!(
            device.read_exact_at(513, &mut buf),
            Err(Error::Read {
                device: 0,
                pos: 513,
                len: 512
            })
        ));
        assert!(device.read_exact_at(u64::MAX, &mut buf).is_err());
    }

    #[test]
    fn failures_name_the_device() {
        let first = [1u8; 512];
        let second = [2u8; 512];
        let mut devices: [&[u8]; 2] = [&first, &second];
        let disks: &mut [&[u8]] = &mut devices;

        // claims more sectors than the image holds
        let volume = Volume::disk(AccessMethod::Memory, 1, 512, 4);
        let mut buf = [0u8; 512];

        disks.read_disk(&volume, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|b| 2 == *b));

        assert!(matches!(
            disks.read_disk(&volume, 1024, &mut buf),
            Err(Error::Read {
                device: 1,
                pos: 1024,
                len: 512
            })
        ));

        // past the volume itself, caught before the device is asked
        assert!(matches!(
            disks.read_disk(&volume, 4 * 512, &mut buf),
            Err(Error::Read { device: 1, .. })
        ));
    }
}
