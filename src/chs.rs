//! Legacy cylinder/head/sector addressing.
//!
//! Only consulted when an MBR entry has no linear address. Every conversion in the crate uses
//! the 255 heads / 63 sectors-per-track translation that BIOSes have used for LBA-assisted
//! disks since the late nineties.

/// Heads per cylinder assumed for every CHS address.
pub const HEADS: u64 = 255;

/// Sectors per track assumed for every CHS address.
pub const SECTORS_PER_TRACK: u64 = 63;

/// A decoded CHS address. `sector` is 1-indexed, as stored on disk.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl Chs {
    /// Decode the packed 3-byte form found in a partition entry:
    /// head, then sector in the low six bits with cylinder bits 8-9 above it, then cylinder bits 0-7.
    pub fn from_packed(packed: [u8; 3]) -> Chs {
        Chs {
            head: packed[0],
            sector: packed[1] & 0x3f,
            cylinder: (u16::from(packed[1] & 0xc0) << 2) | u16::from(packed[2]),
        }
    }
}

/// Convert a CHS address to a linear block address.
///
/// A sector component of zero is invalid on disk; it is clamped rather than wrapped. The
/// largest input, 65535/255/255, is just under 2^30, so this cannot overflow.
pub fn chs_to_lba(chs: Chs) -> u64 {
    (u64::from(chs.cylinder) * HEADS + u64::from(chs.head)) * SECTORS_PER_TRACK
        + u64::from(chs.sector.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sector() {
        let chs = Chs {
            cylinder: 0,
            head: 0,
            sector: 1,
        };
        assert_eq!(0, chs_to_lba(chs));
    }

    #[test]
    fn classic_dos_partition_start() {
        // fdisk's historical first partition: cylinder 0, head 1, sector 1 => LBA 63
        let chs = Chs::from_packed([0x01, 0x01, 0x00]);
        assert_eq!(63, chs_to_lba(chs));
    }

    #[test]
    fn packed_cylinder_high_bits() {
        // 1023/254/63: the largest address CHS can express
        let chs = Chs::from_packed([0xfe, 0xff, 0xff]);
        assert_eq!(1023, chs.cylinder);
        assert_eq!(254, chs.head);
        assert_eq!(63, chs.sector);
        assert_eq!(16_450_559, chs_to_lba(chs));
    }

    #[test]
    fn out_of_range_components_do_not_overflow() {
        let packed = Chs::from_packed([0xff, 0xff, 0xff]);
        assert_eq!((1023 * 255 + 255) * 63 + 62, chs_to_lba(packed));

        let widest = Chs {
            cylinder: u16::MAX,
            head: u8::MAX,
            sector: u8::MAX,
        };
        assert_eq!((65535 * 255 + 255) * 63 + 254, chs_to_lba(widest));
    }

    #[test]
    fn zero_sector_clamps() {
        let chs = Chs {
            cylinder: 0,
            head: 1,
            sector: 0,
        };
        assert_eq!(63, chs_to_lba(chs));
    }
}
