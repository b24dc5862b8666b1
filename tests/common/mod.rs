//! In-memory disks, a strict scratch allocator, and image builders.

#![allow(dead_code)]

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use bootvol::{crc32, BlockRead, Error, Guid, ScratchAllocator, Volume};

pub const SECTOR: usize = 512;

/// Disk images indexed by device id, with reads that can be made to fail.
pub struct MemDisks {
    pub images: Vec<Vec<u8>>,
    /// (device id, absolute byte offset) pairs whose reads fail.
    pub fail_at: Vec<(u32, u64)>,
    /// Every read attempted: device id, absolute byte offset, length.
    pub reads: Vec<(u32, u64, usize)>,
}

impl MemDisks {
    pub fn new(images: Vec<Vec<u8>>) -> MemDisks {
        MemDisks {
            images,
            fail_at: Vec::new(),
            reads: Vec::new(),
        }
    }
}

impl BlockRead for MemDisks {
    fn read_disk(&mut self, volume: &Volume, pos: u64, buf: &mut [u8]) -> Result<(), Error> {
        let absolute = volume.first_byte + pos;
        self.reads.push((volume.device_id, absolute, buf.len()));

        let failed = Error::Read {
            device: volume.device_id,
            pos,
            len: buf.len(),
        };

        if self.fail_at.contains(&(volume.device_id, absolute)) {
            return Err(failed);
        }

        let image = match self.images.get(volume.device_id as usize) {
            Some(image) => image,
            None => return Err(failed),
        };

        let start = absolute as usize;
        let end = start + buf.len();
        if end > image.len() {
            return Err(failed);
        }

        buf.copy_from_slice(&image[start..end]);
        Ok(())
    }
}

/// Rounds every request up to 64 bytes, and panics on any release that doesn't exactly match
/// an outstanding allocation.
pub struct CountingAlloc {
    allow: Cell<usize>,
    acquired: Cell<usize>,
    released: Cell<usize>,
    outstanding: RefCell<Vec<(usize, usize)>>,
}

impl CountingAlloc {
    pub fn new() -> CountingAlloc {
        CountingAlloc::failing_after(usize::MAX)
    }

    /// Only the first `allow` allocations succeed.
    pub fn failing_after(allow: usize) -> CountingAlloc {
        CountingAlloc {
            allow: Cell::new(allow),
            acquired: Cell::new(0),
            released: Cell::new(0),
            outstanding: RefCell::new(Vec::new()),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.get()
    }

    pub fn assert_balanced(&self) {
        assert_eq!(self.acquired.get(), self.released.get());
        assert!(self.outstanding.borrow().is_empty());
    }
}

unsafe impl ScratchAllocator for CountingAlloc {
    fn allocate(&self, size: &mut usize) -> Option<NonNull<u8>> {
        if self.acquired.get() >= self.allow.get() {
            return None;
        }

        let granted = ((*size).max(1) + 63) / 64 * 64;
        let layout = Layout::from_size_align(granted, 16).ok()?;
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;

        *size = granted;
        self.acquired.set(self.acquired.get() + 1);
        self.outstanding
            .borrow_mut()
            .push((ptr.as_ptr() as usize, granted));
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> bool {
        let mut outstanding = self.outstanding.borrow_mut();
        let found = outstanding
            .iter()
            .position(|&(addr, granted)| addr == ptr.as_ptr() as usize && granted == size);

        let index = found.expect("released something that isn't outstanding");
        outstanding.remove(index);
        alloc::dealloc(
            ptr.as_ptr(),
            Layout::from_size_align(size, 16).expect("layout"),
        );
        self.released.set(self.released.get() + 1);
        true
    }
}

/// (type code, first lba, sector count) per entry slot.
pub fn mbr_sector(entries: &[(usize, u8, u32, u32)]) -> [u8; SECTOR] {
    let mut sector = [0u8; SECTOR];
    for &(slot, type_code, first_lba, sectors) in entries {
        let offset = 446 + slot * 16;
        sector[offset + 4] = type_code;
        sector[offset + 8..offset + 12].copy_from_slice(&first_lba.to_le_bytes());
        sector[offset + 12..offset + 16].copy_from_slice(&sectors.to_le_bytes());
    }
    sector[510] = 0x55;
    sector[511] = 0xaa;
    sector
}

pub fn mbr_image(total_sectors: usize, entries: &[(usize, u8, u32, u32)]) -> Vec<u8> {
    let mut image = vec![0u8; total_sectors * SECTOR];
    image[..SECTOR].copy_from_slice(&mbr_sector(entries));
    image
}

pub struct GptPart {
    pub slot: usize,
    pub type_guid: Guid,
    pub first_lba: u64,
    pub last_lba: u64,
    pub name: &'static str,
}

pub const ENTRIES: usize = 128;
pub const ENTRY_SIZE: usize = 128;
pub const TABLE_SECTORS: u64 = (ENTRIES * ENTRY_SIZE / SECTOR) as u64;

/// A protective MBR, both headers, and both copies of the entry array.
pub fn gpt_image(total_sectors: u64, parts: &[GptPart]) -> Vec<u8> {
    let mut image = vec![0u8; total_sectors as usize * SECTOR];

    let protective_len = (total_sectors - 1).min(u64::from(u32::MAX)) as u32;
    image[..SECTOR].copy_from_slice(&mbr_sector(&[(0, 0xee, 1, protective_len)]));

    let mut table = vec![0u8; ENTRIES * ENTRY_SIZE];
    for part in parts {
        let entry = &mut table[part.slot * ENTRY_SIZE..(part.slot + 1) * ENTRY_SIZE];
        entry[0x00..0x10].copy_from_slice(part.type_guid.as_bytes());
        entry[0x10..0x20].copy_from_slice(&[part.slot as u8 + 1; 16]);
        entry[0x20..0x28].copy_from_slice(&part.first_lba.to_le_bytes());
        entry[0x28..0x30].copy_from_slice(&part.last_lba.to_le_bytes());
        for (i, unit) in part.name.encode_utf16().enumerate() {
            entry[0x38 + 2 * i..0x3a + 2 * i].copy_from_slice(&unit.to_le_bytes());
        }
    }
    let table_crc = crc32(&table);

    let last = total_sectors - 1;
    let backup_table = last - TABLE_SECTORS;

    write_at(&mut image, 2, &table);
    write_at(&mut image, backup_table, &table);
    write_header(&mut image, total_sectors, 1, last, 2, table_crc);
    write_header(&mut image, total_sectors, last, 1, backup_table, table_crc);

    image
}

fn write_at(image: &mut [u8], lba: u64, bytes: &[u8]) {
    let start = lba as usize * SECTOR;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}

fn write_header(
    image: &mut [u8],
    total_sectors: u64,
    mine: u64,
    alternate: u64,
    entries_lba: u64,
    table_crc: u32,
) {
    let mut header = [0u8; SECTOR];
    header[0x00..0x08].copy_from_slice(b"EFI PART");
    header[0x08..0x0c].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    header[0x0c..0x10].copy_from_slice(&92u32.to_le_bytes());
    header[0x18..0x20].copy_from_slice(&mine.to_le_bytes());
    header[0x20..0x28].copy_from_slice(&alternate.to_le_bytes());
    header[0x28..0x30].copy_from_slice(&(2 + TABLE_SECTORS).to_le_bytes());
    header[0x30..0x38].copy_from_slice(&(total_sectors - 2 - TABLE_SECTORS).to_le_bytes());
    header[0x38..0x48].copy_from_slice(&[0x42; 16]);
    header[0x48..0x50].copy_from_slice(&entries_lba.to_le_bytes());
    header[0x50..0x54].copy_from_slice(&(ENTRIES as u32).to_le_bytes());
    header[0x54..0x58].copy_from_slice(&(ENTRY_SIZE as u32).to_le_bytes());
    header[0x58..0x5c].copy_from_slice(&table_crc.to_le_bytes());
    let crc = crc32(&header[..92]);
    header[0x10..0x14].copy_from_slice(&crc.to_le_bytes());
    write_at(image, mine, &header);
}

/// Byte offset of a header field in the image.
pub fn header_byte(lba: u64, field: usize) -> usize {
    lba as usize * SECTOR + field
}
