// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Safe shared references to memory-mapped register blocks.

use core::ops::Deref;
use core::ptr::NonNull;

/// A pointer to a statically allocated peripheral register block.
///
/// Wraps the raw base address of a peripheral so that dereferencing it is
/// encapsulated in one audited place. Unlike
/// `const REGS: &'static Registers = unsafe { &*(0x400E0600 as *const _) };`,
/// which the compiler rejects because the address has no allocation at
/// compile time, a `StaticRef` can live in a `const` and is only turned into
/// a reference at the point of use.
pub struct StaticRef<T> {
    ptr: NonNull<T>,
}

impl<T> StaticRef<T> {
    /// Create a new `StaticRef` from the peripheral base address.
    ///
    /// ## Safety
    ///
    /// `ptr` must be aligned, non-null, and point at a register block that is
    /// valid for reads and writes for the whole program.
    pub const unsafe fn new(ptr: *const T) -> StaticRef<T> {
        StaticRef {
            ptr: NonNull::new_unchecked(ptr.cast_mut()),
        }
    }
}

impl<T> Clone for StaticRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StaticRef<T> {}

impl<T> Deref for StaticRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Valid for the program duration as promised to `StaticRef::new`.
        unsafe { self.ptr.as_ref() }
    }
}
