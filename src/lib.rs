//! Deep-copying smart pointers to trait objects.
//!
//! A [`PolymorphicValue<T>`] owns exactly one object which can be viewed as a `T`, usually a trait
//! object. Unlike a [`Box<dyn Trait>`](Box), cloning the handle clones the concrete object it was
//! constructed with, so types holding polymorphic members can simply `#[derive(Clone)]`.
//!
//! ## Basic Usage
//!
//! Let's say we had a trait with no notion of cloning...
//!
//! ```
//! pub trait Shape {
//!     fn area(&self) -> f64;
//!
//!     fn scale(&mut self, factor: f64);
//! }
//!
//! #[derive(Debug, Clone)]
//! pub struct Square(f64);
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         self.0 * self.0
//!     }
//!
//!     fn scale(&mut self, factor: f64) {
//!         self.0 *= factor;
//!     }
//! }
//! ```
//!
//! ...we can put a `Square` behind a `PolymorphicValue<dyn Shape>` using the [`polymorphic_value`]
//! macro and copy it as if it were a regular value:
//!
//! ```
//! # pub trait Shape {
//! #     fn area(&self) -> f64;
//! #     fn scale(&mut self, factor: f64);
//! # }
//! # #[derive(Debug, Clone)]
//! # pub struct Square(f64);
//! # impl Shape for Square {
//! #     fn area(&self) -> f64 { self.0 * self.0 }
//! #     fn scale(&mut self, factor: f64) { self.0 *= factor; }
//! # }
//! use polymorphic_value::polymorphic_value;
//!
//! let mut original = polymorphic_value!(as dyn Shape, Square(2.0));
//! let copy = original.clone();
//!
//! original.scale(2.0);
//!
//! assert_eq!(original.area(), 16.0);
//! assert_eq!(copy.area(), 4.0);
//! ```
//!
//! The macro is shorthand for [`PolymorphicValue::from_value`], which takes an explicit
//! [`Upcast`] function. This function is nearly always the identity closure `|v| v`, which lets
//! the compiler perform the unsizing coercion from the concrete type to the trait object.
//!
//! Handles can also adopt existing boxes with [`PolymorphicValue::from_box`], raw pointers with a
//! custom [`Copier`] and [`Deleter`] with [`PolymorphicValue::from_raw_with`], and can be
//! allocated in a custom [`GlobalAlloc`](std::alloc::GlobalAlloc) with
//! [`allocate_polymorphic_value`].
//!
//! ## Ownership
//!
//! Every handle uniquely owns its object. Moving a handle moves ownership without copying the
//! object, and [`PolymorphicValue::take`] does the same while leaving an empty handle behind.
//! Handles can be converted into handles to one of their supertraits without copying either:
//!
//! ```
//! use polymorphic_value::polymorphic_value;
//!
//! trait Named {
//!     fn name(&self) -> String;
//! }
//!
//! trait Pet: Named {}
//!
//! #[derive(Clone)]
//! struct Dog;
//!
//! impl Named for Dog {
//!     fn name(&self) -> String {
//!         "dog".to_string()
//!     }
//! }
//!
//! impl Pet for Dog {}
//!
//! let pet = polymorphic_value!(as dyn Pet, Dog);
//! let addr = pet.as_ptr().unwrap().cast::<()>();
//!
//! let named = pet.upcast::<dyn Named>(|v| v);
//! assert_eq!(named.as_ptr().unwrap().cast::<()>(), addr);
//!
//! // Copies made through the new handle still copy a `Dog`.
//! assert_eq!(named.clone().name(), "dog");
//! ```
//!
//! ## Const Propagation
//!
//! A shared reference to a handle only gives out shared references to its object:
//!
//! ```compile_fail
//! use polymorphic_value::PolymorphicValue;
//!
//! fn mutate(value: &PolymorphicValue<Vec<u32>>) {
//!     value.push(3);
//! }
//! ```
//!
//! ## Failures
//!
//! The infallible operations panic when a copy fails and call
//! [`handle_alloc_error`](std::alloc::handle_alloc_error) when an allocation fails. Every one of
//! them has a `try_` counterpart returning an [`Error`] instead. In both cases, the handles
//! involved are left exactly as they were before the operation.

mod alloc;
pub use self::alloc::*;

mod block;

mod error;
pub use self::error::*;

mod send;
pub use self::send::*;

mod strategy;
pub use self::strategy::*;

mod value;
pub use self::value::*;


/// Moves a value into a [`PolymorphicValue`], upcasting it with the identity function `|v| v`.
///
/// The target type can be given with `as $ty` or left to inference. A custom allocator can be
/// supplied with `in $alloc`, in which case the macro expands to a call to
/// [`allocate_polymorphic_value`] and evaluates to a `Result`.
///
/// ```
/// use std::fmt::Display;
///
/// use polymorphic_value::{Global, PolymorphicValue, polymorphic_value};
///
/// let a = polymorphic_value!(as dyn Display, 1);
/// let b: PolymorphicValue<dyn Display> = polymorphic_value!("two");
/// let c = polymorphic_value!(as dyn Display, 3.0, in Global).unwrap();
///
/// assert_eq!(format!("{} {} {}", &*a, &*b, &*c), "1 two 3");
/// ```
#[macro_export]
macro_rules! polymorphic_value {
    (as $ty:ty, $value:expr, in $alloc:expr $(,)?) => {
        $crate::allocate_polymorphic_value::<$ty, _, _>($alloc, $value, |v| v)
    };
    (as $ty:ty, $value:expr $(,)?) => {
        $crate::PolymorphicValue::<$ty>::from_value($value, |v| v)
    };
    (as $($ignored:tt)*) => {
        ::core::compile_error!("invalid syntax; expected `as $ty:ty, $value:expr`");
    };
    ($value:expr, in $alloc:expr $(,)?) => {
        $crate::allocate_polymorphic_value($alloc, $value, |v| v)
    };
    ($value:expr $(,)?) => {
        $crate::PolymorphicValue::from_value($value, |v| v)
    };
}
