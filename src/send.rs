use std::{
    alloc::GlobalAlloc,
    fmt,
    ops::{Deref, DerefMut},
};

use derive_where::derive_where;

use crate::{Copier, Deleter, Error, PolymorphicValue, Upcast};

// === SendPolymorphicValue === //

/// A [`PolymorphicValue`] which can be sent to other threads.
///
/// [`PolymorphicValue`] makes no thread-safety claims since its control block may hold arbitrary
/// copiers, deleters and allocators. Every constructor of this wrapper requires the object and
/// each of those strategies to be [`Send`], which is what makes the wrapper `Send` in turn.
///
/// ```
/// use polymorphic_value::SendPolymorphicValue;
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// #[derive(Clone)]
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// let shape = SendPolymorphicValue::<dyn Shape + Send>::from_value(Square(2.0), |v| v);
/// let area = std::thread::spawn(move || shape.clone().area()).join().unwrap();
///
/// assert_eq!(area, 4.0);
/// ```
#[derive_where(Default)]
pub struct SendPolymorphicValue<T: ?Sized> {
    inner: PolymorphicValue<T>,
}

// Every object, strategy and allocator reachable from `inner` was required to be `Send` when it was
// adopted.
unsafe impl<T: ?Sized + Send> Send for SendPolymorphicValue<T> {}

impl<T: ?Sized> SendPolymorphicValue<T> {
    pub const fn empty() -> Self {
        Self {
            inner: PolymorphicValue::empty(),
        }
    }

    pub fn as_inner(&self) -> &PolymorphicValue<T> {
        &self.inner
    }

    /// Unwraps the handle, giving up the ability to send it.
    pub fn into_inner(self) -> PolymorphicValue<T> {
        self.inner
    }

    pub fn try_clone(&self) -> Result<Self, Error> {
        self.inner.try_clone().map(|inner| Self { inner })
    }

    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.get_mut()
    }
}

impl<T: ?Sized + 'static> SendPolymorphicValue<T> {
    pub fn from_value<U: Clone + Send + 'static>(value: U, upcast: Upcast<T, U>) -> Self {
        Self {
            inner: PolymorphicValue::from_value(value, upcast),
        }
    }

    pub fn try_from_value_in<U, A>(value: U, alloc: A, upcast: Upcast<T, U>) -> Result<Self, Error>
    where
        U: Clone + Send + 'static,
        A: GlobalAlloc + Clone + Send + 'static,
    {
        PolymorphicValue::try_from_value_in(value, alloc, upcast).map(|inner| Self { inner })
    }

    pub fn from_box<U: Clone + Send + 'static>(boxed: Box<U>, upcast: Upcast<T, U>) -> Self {
        Self {
            inner: PolymorphicValue::from_box(boxed, upcast),
        }
    }

    /// Adopts a raw pointer which will be copied with `copier` and destroyed with `deleter`.
    ///
    /// ## Safety
    ///
    /// Same as [`PolymorphicValue::from_raw_with`].
    ///
    pub unsafe fn from_raw_with<U, C, D>(
        ptr: *mut U,
        copier: C,
        deleter: D,
        upcast: Upcast<T, U>,
    ) -> Self
    where
        U: ?Sized + Send + 'static,
        C: Copier<U> + Clone + Send + 'static,
        D: Deleter<U> + Clone + Send + 'static,
    {
        Self {
            inner: unsafe { PolymorphicValue::from_raw_with(ptr, copier, deleter, upcast) },
        }
    }

    pub fn try_upcast<V: ?Sized + 'static>(
        self,
        upcast: Upcast<V, T>,
    ) -> Result<SendPolymorphicValue<V>, Error> {
        self.inner
            .try_upcast(upcast)
            .map(|inner| SendPolymorphicValue { inner })
    }

    pub fn upcast<V: ?Sized + 'static>(self, upcast: Upcast<V, T>) -> SendPolymorphicValue<V> {
        SendPolymorphicValue {
            inner: self.inner.upcast(upcast),
        }
    }
}

impl<T: Clone + Send + 'static> SendPolymorphicValue<T> {
    pub fn new(value: T) -> Self {
        Self::from_value(value, |v| v)
    }
}

impl<T: ?Sized> Clone for SendPolymorphicValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.inner.clone_from(&source.inner);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SendPolymorphicValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<T: ?Sized> Deref for SendPolymorphicValue<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for SendPolymorphicValue<T> {
    #[track_caller]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
