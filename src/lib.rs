//! Generic promises for the IBE client SDK.
//!
//! A [`Deferred`] is the writable side of a one-shot result: its producer
//! settles it exactly once with [`Deferred::resolve`] or
//! [`Deferred::reject`]. Consumers hold the read-only [`Promise`] view and
//! attach callbacks with `done`, `fail`, `always` and `then`.
//!
//! Everything runs on one thread. Settling a deferred invokes its callbacks
//! synchronously, in registration order, before `resolve`/`reject` returns.
//! Callbacks registered on an already settled deferred run immediately.
//!
//! ```
//! use ibe_promise::{defer, Status};
//!
//! let d = defer::<u32, String>();
//! let doubled = d.promise().map(|v| v * 2);
//! d.resolve(21).unwrap();
//! assert_eq!(doubled.status(), Status::Resolved);
//! assert_eq!(doubled.result().unwrap(), 42);
//! ```
//!
//! Combinators build aggregates over several promises: [`when`] (fan-in),
//! [`unfold`] (build a sequence from a seed) and [`each`] (drive an
//! [`Iter`] for side effects).
//!
//! There is no cancellation. A deferred that is never settled never
//! completes, and neither does anything waiting on it.

use std::fmt;

mod deferred;
mod iter;
mod promise;
mod unfold;
mod when;

pub use deferred::Deferred;
pub use iter::{each, generator, iterator, Generator, Iter};
pub use promise::{Next, Promise, Thenable};
pub use unfold::{unfold, Unspooled};
pub use when::when;

/// Errors raised by the promise core itself.
///
/// Rejection payloads supplied by producers are never wrapped in this type;
/// they travel as the promise's own `E`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("tried to settle a promise that is already {0}")]
    AlreadySettled(Status),
    #[error("promise result not available, promise is {0}")]
    ResultUnavailable(Status),
    #[error("promise rejection reason not available, promise is {0}")]
    ErrorUnavailable(Status),
    #[error("when: one or more promises were rejected")]
    WhenRejected,
}

/// The status of a promise. Initially a promise is `Unfulfilled` and may
/// change to `Rejected` or `Resolved`; after that it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Unfulfilled,
    Rejected,
    Resolved,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Unfulfilled => "unfulfilled",
            Status::Rejected => "rejected",
            Status::Resolved => "resolved",
        })
    }
}

/// Returns a new unfulfilled deferred.
pub fn defer<T: 'static, E: 'static>() -> Deferred<T, E> {
    Deferred::new()
}

/// Converts a value into an already resolved promise.
pub fn resolved<T: 'static, E: 'static>(value: T) -> Promise<T, E> {
    Deferred::settled(Ok(value)).promise()
}

/// Returns an already rejected promise.
pub fn rejected<T: 'static, E: 'static>(err: E) -> Promise<T, E> {
    Deferred::settled(Err(err)).promise()
}
