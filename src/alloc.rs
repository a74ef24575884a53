use std::{
    alloc::{self, GlobalAlloc, Layout},
    ptr::NonNull,
};

use scopeguard::ScopeGuard;

use crate::{Copier, Deleter, Error};

// === Global === //

/// An allocator handle forwarding to the program's registered global allocator.
///
/// This is the allocator used by every constructor which does not take one explicitly.
#[derive(Debug, Copy, Clone, Default)]
pub struct Global;

unsafe impl GlobalAlloc for Global {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { alloc::alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { alloc::dealloc(ptr, layout) }
    }
}

// === Emplacement === //

/// Allocates room for a `V` in `alloc` and initializes it with `init`.
///
/// The allocation is released if `init` fails or panics, in which case `init`'s captures are
/// dropped as usual.
pub(crate) fn try_emplace<V, A: GlobalAlloc>(
    alloc: &A,
    init: impl FnOnce() -> Result<V, Error>,
) -> Result<NonNull<V>, Error> {
    let layout = Layout::new::<V>();

    let ptr = if layout.size() == 0 {
        NonNull::<V>::dangling()
    } else {
        let Some(ptr) = NonNull::new(unsafe { alloc.alloc(layout) }) else {
            return Err(Error::OutOfMemory { layout });
        };
        ptr.cast()
    };

    let dealloc_guard = scopeguard::guard((), move |()| {
        unsafe { dealloc(alloc, ptr) };
    });

    let value = init()?;
    unsafe { ptr.write(value) };

    ScopeGuard::into_inner(dealloc_guard);

    Ok(ptr)
}

/// Releases memory obtained from [`try_emplace`] without dropping its contents.
///
/// ## Safety
///
/// `ptr` must have been returned by `try_emplace::<V, _>` called with `alloc` or one of its clones
/// and must not be used afterwards.
///
pub(crate) unsafe fn dealloc<V, A: GlobalAlloc>(alloc: &A, ptr: NonNull<V>) {
    let layout = Layout::new::<V>();

    if layout.size() != 0 {
        unsafe { alloc.dealloc(ptr.as_ptr().cast(), layout) };
    }
}

// === Allocator-Aware Strategies === //

/// A [`Copier`] which clones values into memory obtained from the allocator `A`.
#[derive(Debug, Copy, Clone, Default)]
pub struct AllocCopier<A>(pub A);

impl<U: Clone, A: GlobalAlloc> Copier<U> for AllocCopier<A> {
    fn copy(&self, value: &U) -> Result<*mut U, Error> {
        try_emplace(&self.0, || Ok(value.clone())).map(NonNull::as_ptr)
    }
}

/// A [`Deleter`] which drops values in place and returns their memory to the allocator `A`.
///
/// This is the counterpart of [`AllocCopier`]. Clones of `A` must be able to release each other's
/// allocations.
#[derive(Debug, Copy, Clone, Default)]
pub struct AllocDeleter<A>(pub A);

impl<U, A: GlobalAlloc> Deleter<U> for AllocDeleter<A> {
    unsafe fn delete(&self, ptr: *mut U) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        // The memory is released even if the destructor panics.
        let _dealloc_guard = scopeguard::guard((), |()| {
            unsafe { dealloc(&self.0, ptr) };
        });

        unsafe { ptr.drop_in_place() };
    }
}
