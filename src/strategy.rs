use std::any::{Any, TypeId, type_name};

use crate::Error;

// === Copier === //

/// A strategy for producing a deep copy of an object owned through a raw pointer.
///
/// Copiers are only consulted for handles built by
/// [`PolymorphicValue::from_raw_with`](crate::PolymorphicValue::from_raw_with) and friends. The
/// pointer returned by [`copy`](Copier::copy) is adopted by the new handle and will eventually be
/// passed to the [`Deleter`] the original handle was constructed with. Making sure the two agree is
/// part of the safety contract of `from_raw_with`.
///
/// Any closure of type `Fn(&U) -> Result<*mut U, Error>` is a copier. This is the usual way of
/// routing copies through a "virtual" cloning method instead of `U`'s [`Clone`] implementation:
///
/// ```
/// # use polymorphic_value::Error;
/// trait Shape {
///     fn clone_box(&self) -> Box<dyn Shape>;
/// }
///
/// let copier = |shape: &(dyn Shape + 'static)| -> Result<*mut dyn Shape, Error> {
///     Ok(Box::into_raw(shape.clone_box()))
/// };
/// # let _ = copier;
/// ```
pub trait Copier<U: ?Sized> {
    /// Produces a newly-allocated copy of `value`.
    ///
    /// Returning a null pointer is reported to the caller of the cloning operation as
    /// [`Error::NullCopy`].
    fn copy(&self, value: &U) -> Result<*mut U, Error>;
}

impl<U: ?Sized, F> Copier<U> for F
where
    F: Fn(&U) -> Result<*mut U, Error>,
{
    fn copy(&self, value: &U) -> Result<*mut U, Error> {
        self(value)
    }
}

/// The copier used when none is specified: clones the value with [`Clone`] into a fresh [`Box`].
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultCopier;

impl<U: Clone> Copier<U> for DefaultCopier {
    fn copy(&self, value: &U) -> Result<*mut U, Error> {
        Ok(Box::into_raw(Box::new(value.clone())))
    }
}

// === Deleter === //

/// A strategy for destroying an object owned through a raw pointer.
///
/// Any closure of type `Fn(*mut U)` is a deleter.
pub trait Deleter<U: ?Sized> {
    /// Destroys the object pointed to by `ptr`.
    ///
    /// ## Safety
    ///
    /// `ptr` must have been adopted by a handle built with this deleter (or produced by its paired
    /// [`Copier`]) and must not be used again after this call.
    ///
    unsafe fn delete(&self, ptr: *mut U);
}

impl<U: ?Sized, F> Deleter<U> for F
where
    F: Fn(*mut U),
{
    unsafe fn delete(&self, ptr: *mut U) {
        self(ptr)
    }
}

/// The deleter used when none is specified: reconstitutes the [`Box`] the object was allocated in
/// and drops it.
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultDeleter;

impl<U: ?Sized> Deleter<U> for DefaultDeleter {
    unsafe fn delete(&self, ptr: *mut U) {
        if !ptr.is_null() {
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

// === DynamicType === //

/// Exposes the concrete type of an object through a trait object.
///
/// This trait is implemented for every `'static` sized type. Trait objects gain an implementation
/// by listing it as a supertrait:
///
/// ```
/// use polymorphic_value::DynamicType;
///
/// trait Shape: DynamicType {
///     fn area(&self) -> f64;
/// }
/// ```
///
/// This is what allows [`PolymorphicValue::from_dyn`](crate::PolymorphicValue::from_dyn) to
/// reject boxed objects whose dynamic type differs from the one their default copier would clone.
///
/// Because every sized type implements this trait (smart pointers and references included), call
/// its methods through the trait object itself, e.g. `DynamicType::dynamic_type_id(&*boxed)`,
/// rather than on a `Box` or reference wrapping it.
///
/// ## Safety
///
/// [`dynamic_type_id`](DynamicType::dynamic_type_id) must return the [`TypeId`] of the concrete
/// type of `self`. Implementations other than the provided blanket implementation are almost never
/// necessary.
///
pub unsafe trait DynamicType {
    /// Fetches the [`TypeId`] of the concrete type of `self`.
    fn dynamic_type_id(&self) -> TypeId;

    /// Fetches the [`type_name`] of the concrete type of `self`.
    fn dynamic_type_name(&self) -> &'static str;
}

unsafe impl<U: Any> DynamicType for U {
    fn dynamic_type_id(&self) -> TypeId {
        TypeId::of::<U>()
    }

    fn dynamic_type_name(&self) -> &'static str {
        type_name::<U>()
    }
}
