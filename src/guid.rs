use core::fmt;

/// A GUID exactly as stored on disk.
///
/// The first three groups are little-endian, the last eight bytes are raw. Equality is over
/// the stored bytes, and there is no ordering.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct Guid([u8; 16]);

impl Guid {
    pub const UNUSED: Guid = Guid([0; 16]);

    /// C12A7328-F81F-11D2-BA4B-00A0C93EC93B
    pub const EFI_SYSTEM: Guid = Guid::from_fields(
        0xc12a_7328,
        0xf81f,
        0x11d2,
        [0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b],
    );

    /// EBD0A0A2-B9E5-4433-87C0-68B6B72699C7
    pub const MICROSOFT_BASIC_DATA: Guid = Guid::from_fields(
        0xebd0_a0a2,
        0xb9e5,
        0x4433,
        [0x87, 0xc0, 0x68, 0xb6, 0xb7, 0x26, 0x99, 0xc7],
    );

    /// 0FC63DAF-8483-4772-8E79-3D69D8477DE4
    pub const LINUX_FILESYSTEM_DATA: Guid = Guid::from_fields(
        0x0fc6_3daf,
        0x8483,
        0x4772,
        [0x8e, 0x79, 0x3d, 0x69, 0xd8, 0x47, 0x7d, 0xe4],
    );

    pub const fn from_bytes(bytes: [u8; 16]) -> Guid {
        Guid(bytes)
    }

    /// Build the on-disk layout from the groups of the canonical text form.
    pub const fn from_fields(time_low: u32, time_mid: u16, time_hi: u16, tail: [u8; 8]) -> Guid {
        let a = time_low.to_le_bytes();
        let b = time_mid.to_le_bytes();
        let c = time_hi.to_le_bytes();
        Guid([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], tail[0], tail[1], tail[2], tail[3],
            tail[4], tail[5], tail[6], tail[7],
        ])
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_unused(&self) -> bool {
        *self == Guid::UNUSED
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9],
        )?;
        for byte in &b[10..] {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}
