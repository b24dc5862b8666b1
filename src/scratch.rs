//! Scratch memory for table reads.
//!
//! Early boot has no heap. Buffers come from a boot-time arena through [`ScratchAllocator`]
//! and are held in a [`ScratchBuf`], which hands them back exactly once when dropped.

use core::cell::Cell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::slice;

use crate::Error;

/// A source of scratch buffers.
///
/// # Safety
///
/// Memory returned by `allocate` must be valid for reads and writes of the granted size, and
/// must not be handed out again until it has been passed back to `free`.
pub unsafe trait ScratchAllocator {
    /// Allocate at least `*size` bytes. The allocator may round up; the granted size is
    /// written back to `size`.
    fn allocate(&self, size: &mut usize) -> Option<NonNull<u8>>;

    /// Release an allocation.
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must be exactly a pointer and granted size returned by `allocate` on
    /// this allocator, and must not have been freed already.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> bool;
}

/// A zeroed scratch buffer, released when dropped.
pub struct ScratchBuf<'a, A: ScratchAllocator + ?Sized> {
    alloc: &'a A,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'a, A: ScratchAllocator + ?Sized> ScratchBuf<'a, A> {
    pub fn new(alloc: &'a A, size: usize) -> Result<Self, Error> {
        let mut granted = size;
        let ptr = alloc
            .allocate(&mut granted)
            .ok_or(Error::OutOfScratch { size })?;

        if granted < size {
            // Safety: exactly what allocate just gave us.
            unsafe { alloc.free(ptr, granted) };
            return Err(Error::OutOfScratch { size });
        }

        // Safety: the allocator guarantees `granted` writable bytes.
        unsafe { ptr.as_ptr().write_bytes(0, granted) };

        Ok(ScratchBuf {
            alloc,
            ptr,
            len: granted,
        })
    }

    /// The size the allocator actually granted, which may exceed the request.
    pub fn granted(&self) -> usize {
        self.len
    }
}

impl<A: ScratchAllocator + ?Sized> Deref for ScratchBuf<'_, A> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: owned, initialised, `len` bytes long until drop.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<A: ScratchAllocator + ?Sized> DerefMut for ScratchBuf<'_, A> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: as above, and we hold the only handle.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<A: ScratchAllocator + ?Sized> Drop for ScratchBuf<'_, A> {
    fn drop(&mut self) {
        // Safety: pointer and granted size from `allocate`; drop runs once.
        if !unsafe { self.alloc.free(self.ptr, self.len) } {
            log::warn!("scratch allocator refused to release {} bytes", self.len);
        }
    }
}

const GRANULE: usize = 16;

/// A bump allocator over a caller-provided region.
///
/// Requests are rounded up to 16 bytes. Releasing the newest allocation rewinds the arena;
/// releasing anything else is accepted and reclaimed when everything above it is gone.
pub struct Arena<'m> {
    base: *mut u8,
    len: usize,
    top: Cell<usize>,
    live: Cell<usize>,
    _region: PhantomData<&'m mut [u8]>,
}

impl<'m> Arena<'m> {
    pub fn new(region: &'m mut [u8]) -> Arena<'m> {
        let skip = region.as_ptr().align_offset(GRANULE).min(region.len());
        let region = &mut region[skip..];
        Arena {
            base: region.as_mut_ptr(),
            len: region.len(),
            top: Cell::new(0),
            live: Cell::new(0),
            _region: PhantomData,
        }
    }

    pub fn used(&self) -> usize {
        self.top.get()
    }

    pub fn remaining(&self) -> usize {
        self.len - self.top.get()
    }

    /// Allocations not yet released.
    pub fn live(&self) -> usize {
        self.live.get()
    }
}

unsafe impl ScratchAllocator for Arena<'_> {
    fn allocate(&self, size: &mut usize) -> Option<NonNull<u8>> {
        let granted = size.checked_add(GRANULE - 1)? & !(GRANULE - 1);
        let start = self.top.get();
        let end = start.checked_add(granted)?;
        if end > self.len {
            return None;
        }

        self.top.set(end);
        self.live.set(self.live.get() + 1);
        *size = granted;
        // Safety: start <= len, inside the region.
        NonNull::new(unsafe { self.base.add(start) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> bool {
        let offset = (ptr.as_ptr() as usize).wrapping_sub(self.base as usize);
        // A zero-size allocation taken when full sits exactly at the end.
        if offset > self.len || 0 == self.live.get() {
            return false;
        }

        self.live.set(self.live.get() - 1);
        if 0 == self.live.get() {
            self.top.set(0);
        } else if offset + size == self.top.get() {
            self.top.set(offset);
        }
        true
    }
}
