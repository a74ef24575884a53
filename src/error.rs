use std::{
    alloc::{Layout, handle_alloc_error},
    error::Error as StdError,
};

// === Error === //

/// The error type returned by the fallible operations of a
/// [`PolymorphicValue`](crate::PolymorphicValue).
///
/// Every operation which returns this error leaves the handles it was called on in their previous
/// state.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The allocator returned a null pointer.
    #[error("failed to allocate {} bytes for a polymorphic_value", .layout.size())]
    OutOfMemory { layout: Layout },

    /// A pointer was adopted under a static type which differs from its dynamic type.
    #[error(transparent)]
    BadConstruction(#[from] BadConstruction),

    /// A [`Copier`](crate::Copier) returned a null pointer.
    #[error("polymorphic_value copier returned a null pointer")]
    NullCopy,

    /// A [`Copier`](crate::Copier) reported a failure of its own.
    #[error("polymorphic_value copier failed")]
    Copier(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error reported by a user-supplied [`Copier`](crate::Copier).
    pub fn copy(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Copier(err.into())
    }
}

/// Reports an error from an operation that has no way of returning it.
///
/// Allocation failures go through [`handle_alloc_error`] like every other infallible allocation
/// in the standard library. Anything else panics with the error's message.
#[cold]
#[track_caller]
pub(crate) fn raise(err: Error) -> ! {
    match err {
        Error::OutOfMemory { layout } => handle_alloc_error(layout),
        err => panic!("{err}"),
    }
}

// === BadConstruction === //

/// Raised when a boxed trait object is adopted as some concrete type `U` with the default copier
/// but the object's dynamic type is not exactly `U`.
///
/// Cloning such an object through `U`'s [`Clone`] implementation would silently slice it, so this
/// is reported as a programming error rather than something to retry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error(
    "bad polymorphic_value construction: expected an object of type `{expected}` but got one of \
     type `{actual}`"
)]
pub struct BadConstruction {
    /// The name of the type the caller declared.
    pub expected: &'static str,

    /// The name of the object's dynamic type.
    pub actual: &'static str,
}
