use std::{
    alloc::GlobalAlloc,
    any::{TypeId, type_name},
    fmt, mem,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use derive_where::derive_where;

use crate::{
    AllocCopier, AllocDeleter, BadConstruction, Copier, DefaultCopier, DefaultDeleter, Deleter,
    DynamicType, Error, Global,
    block::{DelegatingBlock, DirectBlock, OwnedBlock, PointerBlock},
    error::raise,
};

// === Upcast === //

/// A function viewing a `U` as a `T`.
///
/// This is almost always the identity closure `|v| v`, which lets the compiler insert the unsizing
/// coercion from `&mut U` to `&mut T` (e.g. from `&mut Square` to `&mut dyn Shape`).
pub type Upcast<T, U> = fn(&mut U) -> &mut T;

// === PolymorphicValue === //

/// A uniquely-owning pointer to a `T` which is deep-copied when cloned.
///
/// The pointee is typically a trait object. Cloning a `PolymorphicValue<dyn Trait>` clones the
/// concrete object it was constructed with, without `Trait` having to know anything about
/// cloning. A handle may also be empty, in which case it owns nothing.
///
/// Like [`Box`], shared references to the handle only give shared access to the object.
///
/// ```compile_fail
/// use polymorphic_value::PolymorphicValue;
///
/// let value = PolymorphicValue::new(1u32);
/// let shared = &value;
///
/// *shared.get_mut().unwrap() = 2;
/// ```
#[derive_where(Default)]
pub struct PolymorphicValue<T: ?Sized> {
    engaged: Option<Engaged<T>>,
}

struct Engaged<T: ?Sized> {
    /// Obtained from `block.ptr()`. Only ever read through: the block reads the object through
    /// other paths while cloning, so every mutable access derives a fresh pointer first.
    ptr: NonNull<T>,
    block: OwnedBlock<T>,
}

impl<T: ?Sized> PolymorphicValue<T> {
    /// Creates a handle which owns nothing.
    pub const fn empty() -> Self {
        Self { engaged: None }
    }

    fn from_block(mut block: OwnedBlock<T>) -> Self {
        Self {
            engaged: Some(Engaged {
                ptr: block.ptr(),
                block,
            }),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.engaged.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.engaged
            .as_ref()
            .map(|engaged| unsafe { engaged.ptr.as_ref() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        let engaged = self.engaged.as_mut()?;
        engaged.ptr = engaged.block.ptr();

        Some(unsafe { engaged.ptr.as_mut() })
    }

    /// Fetches the address of the owned object.
    ///
    /// The pointer is only meant for reads and identity comparisons; use
    /// [`get_mut`](Self::get_mut) to mutate the object. The address is stable for as long as the
    /// object is owned by this handle or by handles it has been moved or upcast into.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.engaged.as_ref().map(|engaged| engaged.ptr)
    }

    /// Fetches the name of the concrete type the owned object was constructed with.
    pub fn type_name(&self) -> Option<&'static str> {
        self.engaged
            .as_ref()
            .map(|engaged| engaged.block.type_name())
    }

    /// Deep-copies the handle, reporting allocation and copier failures instead of panicking.
    pub fn try_clone(&self) -> Result<Self, Error> {
        match &self.engaged {
            Some(engaged) => Ok(Self::from_block(engaged.block.try_clone()?)),
            None => Ok(Self::empty()),
        }
    }

    /// Replaces the handle's object with a deep copy of `source`'s.
    ///
    /// On failure, `self` keeps its previous object.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), Error> {
        *self = source.try_clone()?;
        Ok(())
    }

    /// Moves the object out into a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    pub fn replace(&mut self, other: Self) -> Self {
        mem::replace(self, other)
    }

    /// Drops the owned object, if any.
    pub fn reset(&mut self) {
        self.engaged = None;
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<T: ?Sized + 'static> PolymorphicValue<T> {
    /// Moves `value` into a new handle, viewing it as a `T` through `upcast`.
    ///
    /// The block and the value share a single allocation.
    pub fn from_value<U: Clone + 'static>(value: U, upcast: Upcast<T, U>) -> Self {
        Self::try_from_value_in(value, Global, upcast).unwrap_or_else(|err| raise(err))
    }

    /// Moves `value` into a new handle allocated in `alloc`.
    ///
    /// Clones of the handle are allocated in clones of `alloc`.
    pub fn try_from_value_in<U, A>(value: U, alloc: A, upcast: Upcast<T, U>) -> Result<Self, Error>
    where
        U: Clone + 'static,
        A: GlobalAlloc + Clone + 'static,
    {
        OwnedBlock::try_new_in(&alloc, || Ok(DirectBlock::new(value, upcast))).map(Self::from_block)
    }

    /// Adopts a boxed value. Clones are made with `U`'s [`Clone`] implementation.
    pub fn from_box<U: Clone + 'static>(boxed: Box<U>, upcast: Upcast<T, U>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(boxed), upcast) }
    }

    /// Adopts a raw pointer obtained from [`Box::into_raw`]. A null pointer produces an empty
    /// handle.
    ///
    /// ## Safety
    ///
    /// `ptr` must be null or have been produced by `Box::<U>::into_raw`. Ownership of the object is
    /// transferred to the handle.
    ///
    pub unsafe fn from_raw<U: Clone + 'static>(ptr: *mut U, upcast: Upcast<T, U>) -> Self {
        unsafe { Self::from_raw_with(ptr, DefaultCopier, DefaultDeleter, upcast) }
    }

    /// Adopts a raw pointer which will be copied with `copier` and destroyed with `deleter`.
    ///
    /// A null pointer produces an empty handle and the strategies are dropped. The strategies are
    /// cloned into every copy of the handle, including copies of handles it is upcast into.
    ///
    /// No check is made that `U` is the dynamic type of the object: the strategies are trusted to
    /// copy and destroy whatever `ptr` points to.
    ///
    /// ## Safety
    ///
    /// `ptr` must be null or point to a valid `U` which `deleter` can destroy. Ownership of the
    /// object is transferred to the handle.
    ///
    /// Every non-null pointer returned by `copier` (or any of its clones) must likewise point to a
    /// valid `U` which nothing else accesses and which `deleter` (and its clones) can destroy. For
    /// example, [`DefaultCopier`] must be paired with a deleter releasing [`Box`]es and
    /// [`AllocCopier`] with an [`AllocDeleter`] over the same allocator.
    ///
    pub unsafe fn from_raw_with<U, C, D>(
        ptr: *mut U,
        copier: C,
        deleter: D,
        upcast: Upcast<T, U>,
    ) -> Self
    where
        U: ?Sized + 'static,
        C: Copier<U> + Clone + 'static,
        D: Deleter<U> + Clone + 'static,
    {
        let Some(ptr) = NonNull::new(ptr) else {
            return Self::empty();
        };

        // Built before allocating so that the object is destroyed if allocation fails.
        let block = unsafe { PointerBlock::new(ptr, copier, deleter, upcast) };

        OwnedBlock::try_new(|| Ok(block))
            .map(Self::from_block)
            .unwrap_or_else(|err| raise(err))
    }

    /// Adopts a raw pointer to a `U` allocated in `alloc`.
    ///
    /// Copies are allocated in clones of `alloc` and so is the handle's control block. A null
    /// pointer produces an empty handle.
    ///
    /// ## Safety
    ///
    /// `ptr` must be null or point to a valid `U` stored in memory obtained from `alloc` (or one of
    /// its clones) with the layout `Layout::new::<U>()`, as done by [`AllocCopier`]. Ownership of
    /// the object is transferred to the handle.
    ///
    pub unsafe fn try_from_raw_in<U, A>(
        ptr: *mut U,
        alloc: A,
        upcast: Upcast<T, U>,
    ) -> Result<Self, Error>
    where
        U: Clone + 'static,
        A: GlobalAlloc + Clone + 'static,
    {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(Self::empty());
        };

        let block = unsafe {
            PointerBlock::new(
                ptr,
                AllocCopier(alloc.clone()),
                AllocDeleter(alloc.clone()),
                upcast,
            )
        };

        OwnedBlock::try_new_in(&alloc, || Ok(block)).map(Self::from_block)
    }

    /// Adopts a boxed trait object, checking that its dynamic type is exactly `U`.
    ///
    /// Copies are made with `U`'s [`Clone`] implementation so adopting, say, a `Box<dyn Shape>`
    /// holding a `FancySquare` as a `Square` would slice every copy. That mistake is reported as a
    /// [`BadConstruction`] error and the box is dropped.
    ///
    /// ```
    /// use polymorphic_value::{DynamicType, PolymorphicValue};
    ///
    /// trait Shape: DynamicType {}
    ///
    /// #[derive(Clone)]
    /// struct Square;
    ///
    /// #[derive(Clone)]
    /// struct Circle;
    ///
    /// impl Shape for Square {}
    /// impl Shape for Circle {}
    ///
    /// let boxed: Box<dyn Shape> = Box::new(Circle);
    /// assert!(PolymorphicValue::from_dyn::<Square>(boxed, |v| v).is_err());
    ///
    /// let boxed: Box<dyn Shape> = Box::new(Square);
    /// assert!(PolymorphicValue::from_dyn::<Square>(boxed, |v| v).is_ok());
    /// ```
    pub fn from_dyn<U: Clone + 'static>(
        boxed: Box<T>,
        upcast: Upcast<T, U>,
    ) -> Result<Self, BadConstruction>
    where
        T: DynamicType,
    {
        if T::dynamic_type_id(&*boxed) != TypeId::of::<U>() {
            return Err(BadConstruction {
                expected: type_name::<U>(),
                actual: T::dynamic_type_name(&*boxed),
            });
        }

        let ptr = Box::into_raw(boxed).cast::<U>();

        Ok(unsafe { Self::from_raw(ptr, upcast) })
    }

    /// Converts the handle into a handle to a supertype without copying the object.
    ///
    /// The object keeps its address and its cloning strategy. On failure the object is dropped.
    pub fn try_upcast<V: ?Sized + 'static>(
        self,
        upcast: Upcast<V, T>,
    ) -> Result<PolymorphicValue<V>, Error> {
        let Some(Engaged { block, .. }) = self.engaged else {
            return Ok(PolymorphicValue::empty());
        };

        OwnedBlock::try_new(|| Ok(DelegatingBlock::new(block, upcast)))
            .map(PolymorphicValue::from_block)
    }

    /// Converts the handle into a handle to a supertype without copying the object.
    ///
    /// ```
    /// use polymorphic_value::PolymorphicValue;
    ///
    /// trait Named {
    ///     fn name(&self) -> &str;
    /// }
    ///
    /// trait Animal: Named {}
    ///
    /// #[derive(Clone)]
    /// struct Cat;
    ///
    /// impl Named for Cat {
    ///     fn name(&self) -> &str {
    ///         "cat"
    ///     }
    /// }
    ///
    /// impl Animal for Cat {}
    ///
    /// let animal = PolymorphicValue::<dyn Animal>::from_value(Cat, |v| v);
    /// let named = animal.upcast::<dyn Named>(|v| v);
    ///
    /// assert_eq!(named.name(), "cat");
    /// ```
    pub fn upcast<V: ?Sized + 'static>(self, upcast: Upcast<V, T>) -> PolymorphicValue<V> {
        self.try_upcast(upcast).unwrap_or_else(|err| raise(err))
    }

    /// Deep-copies the handle into a handle to a supertype.
    pub fn try_upcast_cloned<V: ?Sized + 'static>(
        &self,
        upcast: Upcast<V, T>,
    ) -> Result<PolymorphicValue<V>, Error> {
        self.try_clone()?.try_upcast(upcast)
    }

    pub fn upcast_cloned<V: ?Sized + 'static>(&self, upcast: Upcast<V, T>) -> PolymorphicValue<V> {
        self.try_upcast_cloned(upcast)
            .unwrap_or_else(|err| raise(err))
    }
}

impl<T: Clone + 'static> PolymorphicValue<T> {
    pub fn new(value: T) -> Self {
        Self::from_value(value, |v| v)
    }
}

impl<T: Clone + 'static> From<T> for PolymorphicValue<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> Clone for PolymorphicValue<T> {
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|err| raise(err))
    }

    fn clone_from(&mut self, source: &Self) {
        self.try_clone_from(source)
            .unwrap_or_else(|err| raise(err))
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for PolymorphicValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("PolymorphicValue").field(&value).finish(),
            None => f.write_str("PolymorphicValue(<empty>)"),
        }
    }
}

impl<T: ?Sized> Deref for PolymorphicValue<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!("attempted to dereference an empty PolymorphicValue"),
        }
    }
}

impl<T: ?Sized> DerefMut for PolymorphicValue<T> {
    #[track_caller]
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("attempted to dereference an empty PolymorphicValue"),
        }
    }
}

// === Factories === //

pub fn make_polymorphic_value<T: Clone + 'static>(value: T) -> PolymorphicValue<T> {
    PolymorphicValue::new(value)
}

/// Moves `value` into a handle viewing it as a `T`.
///
/// ```
/// use polymorphic_value::make_polymorphic_value_as;
///
/// let value = make_polymorphic_value_as::<dyn ToString, _>(42, |v| v);
/// assert_eq!(value.to_string(), "42");
/// ```
pub fn make_polymorphic_value_as<T, U>(value: U, upcast: Upcast<T, U>) -> PolymorphicValue<T>
where
    T: ?Sized + 'static,
    U: Clone + 'static,
{
    PolymorphicValue::from_value(value, upcast)
}

/// Moves `value` into a handle whose storage, and that of every clone, comes from `alloc`.
pub fn allocate_polymorphic_value<T, U, A>(
    alloc: A,
    value: U,
    upcast: Upcast<T, U>,
) -> Result<PolymorphicValue<T>, Error>
where
    T: ?Sized + 'static,
    U: Clone + 'static,
    A: GlobalAlloc + Clone + 'static,
{
    PolymorphicValue::try_from_value_in(value, alloc, upcast)
}

pub fn swap<T: ?Sized>(lhs: &mut PolymorphicValue<T>, rhs: &mut PolymorphicValue<T>) {
    lhs.swap(rhs);
}
