use std::{
    alloc::GlobalAlloc,
    any::type_name,
    mem::ManuallyDrop,
    ptr::{self, NonNull},
};

use scopeguard::ScopeGuard;

use crate::{
    Copier, Deleter, Error, Global, Upcast,
    alloc::{dealloc, try_emplace},
};

// === ControlBlock === //

/// A single strategy for owning an object which can be viewed as a `T`.
///
/// ## Safety
///
/// The pointer returned by `ptr` must address an object owned by the block which stays valid for
/// as long as the block is neither moved nor dropped. Blocks returned by `try_clone` must own an
/// object distinct from the one owned by `self`.
///
pub(crate) unsafe trait ControlBlock<T: ?Sized>: Sized {
    fn ptr(&mut self) -> NonNull<T>;

    fn try_clone(&self) -> Result<Self, Error>;

    /// The name of the type the block was constructed with.
    fn type_name(&self) -> &'static str;
}

// === DirectBlock === //

/// Owns its object inline.
pub(crate) struct DirectBlock<T: ?Sized, U> {
    value: U,
    upcast: Upcast<T, U>,
}

impl<T: ?Sized, U> DirectBlock<T, U> {
    pub fn new(value: U, upcast: Upcast<T, U>) -> Self {
        Self { value, upcast }
    }
}

unsafe impl<T: ?Sized, U: Clone> ControlBlock<T> for DirectBlock<T, U> {
    fn ptr(&mut self) -> NonNull<T> {
        NonNull::from((self.upcast)(&mut self.value))
    }

    fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            value: self.value.clone(),
            upcast: self.upcast,
        })
    }

    fn type_name(&self) -> &'static str {
        type_name::<U>()
    }
}

// === PointerBlock === //

/// Owns its object through a pointer which it copies with `C` and releases with `D`.
pub(crate) struct PointerBlock<T: ?Sized, U: ?Sized, C, D: Deleter<U>> {
    ptr: NonNull<U>,
    copier: C,
    deleter: D,
    upcast: Upcast<T, U>,
}

impl<T: ?Sized, U: ?Sized, C, D: Deleter<U>> PointerBlock<T, U, C, D> {
    /// Adopts `ptr`. It will be released by `deleter` when the block is dropped.
    ///
    /// ## Safety
    ///
    /// `ptr` must point to a valid `U` which nothing else accesses for the lifetime of the block
    /// and which `deleter` is able to release.
    ///
    pub unsafe fn new(ptr: NonNull<U>, copier: C, deleter: D, upcast: Upcast<T, U>) -> Self {
        Self {
            ptr,
            copier,
            deleter,
            upcast,
        }
    }
}

unsafe impl<T, U, C, D> ControlBlock<T> for PointerBlock<T, U, C, D>
where
    T: ?Sized,
    U: ?Sized,
    C: Copier<U> + Clone,
    D: Deleter<U> + Clone,
{
    fn ptr(&mut self) -> NonNull<T> {
        NonNull::from((self.upcast)(unsafe { self.ptr.as_mut() }))
    }

    fn try_clone(&self) -> Result<Self, Error> {
        let copy = self.copier.copy(unsafe { self.ptr.as_ref() })?;
        let copy = NonNull::new(copy).ok_or(Error::NullCopy)?;

        // The copy belongs to us as soon as the copier returns it.
        let copy = scopeguard::guard(copy, |copy| {
            unsafe { self.deleter.delete(copy.as_ptr()) };
        });

        let copier = self.copier.clone();
        let deleter = self.deleter.clone();

        Ok(Self {
            ptr: ScopeGuard::into_inner(copy),
            copier,
            deleter,
            upcast: self.upcast,
        })
    }

    fn type_name(&self) -> &'static str {
        type_name::<U>()
    }
}

impl<T: ?Sized, U: ?Sized, C, D: Deleter<U>> Drop for PointerBlock<T, U, C, D> {
    fn drop(&mut self) {
        unsafe { self.deleter.delete(self.ptr.as_ptr()) }
    }
}

// === DelegatingBlock === //

/// Views a block owning a `U` as a block owning a `T`.
pub(crate) struct DelegatingBlock<T: ?Sized, U: ?Sized> {
    inner: OwnedBlock<U>,
    upcast: Upcast<T, U>,
}

impl<T: ?Sized, U: ?Sized> DelegatingBlock<T, U> {
    pub fn new(inner: OwnedBlock<U>, upcast: Upcast<T, U>) -> Self {
        Self { inner, upcast }
    }
}

unsafe impl<T: ?Sized, U: ?Sized> ControlBlock<T> for DelegatingBlock<T, U> {
    fn ptr(&mut self) -> NonNull<T> {
        NonNull::from((self.upcast)(unsafe { self.inner.ptr().as_mut() }))
    }

    fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            upcast: self.upcast,
        })
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }
}

// === ErasedBlock === //

/// The object-safe face of an [`Allocated`] control block.
///
/// ## Safety
///
/// Same as [`ControlBlock`]. Additionally, the function returned by `destructor` must drop the
/// block and release its storage when given a pointer to it.
///
pub(crate) unsafe trait ErasedBlock<T: ?Sized> {
    fn ptr(&mut self) -> NonNull<T>;

    fn try_clone(&self) -> Result<OwnedBlock<T>, Error>;

    fn type_name(&self) -> &'static str;

    fn destructor(&self) -> unsafe fn(NonNull<()>);
}

/// A control block stored together with the allocator which owns its memory.
struct Allocated<B, A> {
    /// Taken out by `destroy` so that it can outlive the block it frees.
    alloc: ManuallyDrop<A>,
    block: B,
}

impl<B, A: GlobalAlloc> Allocated<B, A> {
    unsafe fn destroy(this: NonNull<()>) {
        let this = this.cast::<Self>();
        let alloc = unsafe { ManuallyDrop::take(&mut (*this.as_ptr()).alloc) };

        let _dealloc_guard = scopeguard::guard((), |()| {
            unsafe { dealloc(&alloc, this) };
        });

        unsafe { ptr::drop_in_place(&raw mut (*this.as_ptr()).block) };
    }
}

unsafe impl<T, B, A> ErasedBlock<T> for Allocated<B, A>
where
    T: ?Sized + 'static,
    B: ControlBlock<T> + 'static,
    A: GlobalAlloc + Clone + 'static,
{
    fn ptr(&mut self) -> NonNull<T> {
        self.block.ptr()
    }

    fn try_clone(&self) -> Result<OwnedBlock<T>, Error> {
        OwnedBlock::try_new_in(&*self.alloc, || self.block.try_clone())
    }

    fn type_name(&self) -> &'static str {
        self.block.type_name()
    }

    fn destructor(&self) -> unsafe fn(NonNull<()>) {
        Self::destroy
    }
}

// === OwnedBlock === //

/// A uniquely-owning pointer to a type-erased control block.
pub(crate) struct OwnedBlock<T: ?Sized> {
    raw: NonNull<dyn ErasedBlock<T>>,
}

impl<T: ?Sized + 'static> OwnedBlock<T> {
    /// Allocates a block in `alloc`, initializing it with `init`.
    ///
    /// If allocation fails, `init` is dropped without being called.
    pub fn try_new_in<B, A>(
        alloc: &A,
        init: impl FnOnce() -> Result<B, Error>,
    ) -> Result<Self, Error>
    where
        B: ControlBlock<T> + 'static,
        A: GlobalAlloc + Clone + 'static,
    {
        let raw = try_emplace(alloc, || {
            let block = init()?;

            Ok(Allocated {
                alloc: ManuallyDrop::new(alloc.clone()),
                block,
            })
        })?;

        Ok(Self { raw })
    }

    pub fn try_new<B>(init: impl FnOnce() -> Result<B, Error>) -> Result<Self, Error>
    where
        B: ControlBlock<T> + 'static,
    {
        Self::try_new_in(&Global, init)
    }
}

impl<T: ?Sized> OwnedBlock<T> {
    pub fn ptr(&mut self) -> NonNull<T> {
        unsafe { self.raw.as_mut() }.ptr()
    }

    pub fn try_clone(&self) -> Result<Self, Error> {
        unsafe { self.raw.as_ref() }.try_clone()
    }

    pub fn type_name(&self) -> &'static str {
        unsafe { self.raw.as_ref() }.type_name()
    }
}

impl<T: ?Sized> Drop for OwnedBlock<T> {
    fn drop(&mut self) {
        unsafe {
            let destroy = self.raw.as_ref().destructor();
            destroy(self.raw.cast());
        }
    }
}
