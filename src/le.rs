//! Little-endian field access for the on-disk table layouts.
//!
//! Callers guarantee the field lies inside `buf`; every table is length-checked before its
//! fields are read.

use core::convert::TryInto;

#[inline]
pub fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(array_at(buf, offset))
}

#[inline]
pub fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(array_at(buf, offset))
}

#[inline]
pub fn u64_at(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(array_at(buf, offset))
}

#[inline]
pub fn array_at<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    buf[offset..offset + N].try_into().expect("fixed size slice")
}
