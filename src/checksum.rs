use core::ops::Range;

use crc::Crc;

// GPT uses the zlib/gzip CRC-32: polynomial 0x04c11db7, reflected, init and xorout 0xffffffff.
// The crc catalogue calls this one CRC-32/ISO-HDLC.
static CRC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// CRC-32 of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC.checksum(bytes)
}

/// CRC-32 of `bytes` as if every byte in `hole` were zero.
///
/// This is how a GPT header checksums itself: the stored checksum field is zeroed for the
/// computation. The buffer is only borrowed, so the stored value can never be disturbed.
pub fn crc32_with_hole(bytes: &[u8], hole: Range<usize>) -> u32 {
    let mut digest = CRC.digest();
    digest.update(&bytes[..hole.start]);
    for _ in hole.clone() {
        digest.update(&[0]);
    }
    digest.update(&bytes[hole.end..]);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_check_value() {
        assert_eq!(0xcbf4_3926, crc32(b"123456789"));
    }

    #[test]
    fn deterministic() {
        let data = [0x5au8; 300];
        assert_eq!(crc32(&data), crc32(&data));
    }

    #[test]
    fn hole_matches_zeroed_copy() {
        let mut data = [0u8; 92];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = data;

        let with_hole = crc32_with_hole(&data, 0x10..0x14);
        assert_eq!(original, data);

        data[0x10..0x14].copy_from_slice(&[0; 4]);
        assert_eq!(crc32(&data), with_hole);
    }
}
