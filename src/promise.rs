use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::deferred::{Deferred, State};
use crate::{Error, Status};

/// The read-only view of a [`Deferred`].
///
/// A promise has no state of its own; every read and every callback
/// registration goes to its deferred. Clones observe the same outcome.
///
/// Besides the callback API a promise is a [`Future`] yielding
/// `Result<T, E>`, so it can be awaited on a single-threaded executor.
///
/// # Examples
///
/// ```
/// use ibe_promise::{defer, Next};
/// use futures::executor::block_on;
///
/// let user = defer::<u32, String>();
/// let name = defer::<String, String>();
/// let lookup = name.promise();
/// let greeting = user
///     .promise()
///     .then(move |_id| lookup)
///     .map(|name| format!("hello {name}"));
///
/// user.resolve(7).unwrap();
/// name.resolve("ada".into()).unwrap();
/// assert_eq!(block_on(greeting), Ok("hello ada".to_string()));
/// ```
pub struct Promise<T, E> {
    deferred: Deferred<T, E>,
}

/// The value returned by a [`then`](Promise::then) handler: either a plain
/// value, or something that settles later and is flattened into the chain.
pub enum Next<U, E> {
    Value(U),
    Thenable(Box<dyn Thenable<U, E>>),
}

impl<U, E> Next<U, E> {
    /// Wraps any [`Thenable`] implementation so `then` waits on it.
    pub fn thenable(t: impl Thenable<U, E> + 'static) -> Self {
        Next::Thenable(Box::new(t))
    }
}

impl<U: 'static, E: 'static> From<Promise<U, E>> for Next<U, E> {
    fn from(p: Promise<U, E>) -> Self {
        Next::thenable(p)
    }
}

impl<U: 'static, E: 'static> From<Deferred<U, E>> for Next<U, E> {
    fn from(d: Deferred<U, E>) -> Self {
        Next::thenable(d.promise())
    }
}

/// The capability `then` relies on to flatten a nested asynchronous result.
///
/// Only values that reach `then` through this trait are waited on. Any
/// other return value is taken as the plain result of the step.
pub trait Thenable<T, E> {
    /// Registers `f` to run exactly once with the eventual outcome.
    fn settled(&self, f: Box<dyn FnOnce(Result<&T, &E>)>);
}

impl<T: 'static, E: 'static> Thenable<T, E> for Promise<T, E> {
    fn settled(&self, f: Box<dyn FnOnce(Result<&T, &E>)>) {
        self.deferred.always(f);
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self { deferred: self.deferred.clone() }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Promise").field(&self.deferred).finish()
    }
}

impl<T: 'static, E: 'static> Promise<T, E> {
    pub(crate) fn new(deferred: Deferred<T, E>) -> Self {
        Self { deferred }
    }

    pub fn status(&self) -> Status {
        self.deferred.status()
    }

    /// The resolved value.
    ///
    /// Fails with [`Error::ResultUnavailable`] unless the promise is resolved.
    pub fn result(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        match self.deferred.outcome() {
            Some(Ok(v)) => Ok((*v).clone()),
            _ => Err(Error::ResultUnavailable(self.status())),
        }
    }

    /// The rejection reason.
    ///
    /// Fails with [`Error::ErrorUnavailable`] unless the promise is rejected.
    pub fn error(&self) -> Result<E, Error>
    where
        E: Clone,
    {
        match self.deferred.outcome() {
            Some(Err(e)) => Ok((*e).clone()),
            _ => Err(Error::ErrorUnavailable(self.status())),
        }
    }

    /// The outcome if the promise is settled, `None` while it is unfulfilled.
    pub fn peek(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.deferred
            .outcome()
            .map(|outcome| outcome.map(|v| (*v).clone()).map_err(|e| (*e).clone()))
    }

    pub fn done(&self, f: impl FnOnce(&T) + 'static) -> &Self {
        self.deferred.done(f);
        self
    }

    pub fn fail(&self, f: impl FnOnce(&E) + 'static) -> &Self {
        self.deferred.fail(f);
        self
    }

    /// Registers `f` for either outcome: `Ok(&value)` on resolution,
    /// `Err(&error)` on rejection.
    pub fn always(&self, f: impl FnOnce(Result<&T, &E>) + 'static) -> &Self {
        self.deferred.always(f);
        self
    }

    /// Chains a dependent step.
    ///
    /// `f` runs once this promise resolves and returns either a plain value
    /// ([`Next::Value`]) or another promise (any `Into<Next>`, e.g. a
    /// [`Promise`]). The returned promise resolves with the plain value, or
    /// settles the way the returned promise settles. If this promise is
    /// rejected, `f` never runs and the returned promise is rejected with
    /// the same error.
    pub fn then<U, N, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        E: Clone,
        N: Into<Next<U, E>>,
        F: FnOnce(&T) -> N + 'static,
    {
        self.deferred.then(f)
    }

    /// [`then`](Self::then) for steps that always produce a plain value.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        E: Clone,
        F: FnOnce(&T) -> U + 'static,
    {
        self.deferred.then(move |v| Next::Value(f(v)))
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.deferred.inner.borrow_mut();
        let inner = &mut *guard;
        match &inner.state {
            State::Resolved(v) => Poll::Ready(Ok((**v).clone())),
            State::Rejected(e) => Poll::Ready(Err((**e).clone())),
            State::Unfulfilled => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
