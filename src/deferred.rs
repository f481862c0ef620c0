use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::task::Waker;

use tracing::{trace, warn};

use crate::promise::{Next, Promise};
use crate::{Error, Status};

/// The writable side of a one-shot asynchronous result.
///
/// A `Deferred` is a cheap handle; clones share the same state, so a
/// producer can hand a clone to every closure that may settle it. It is
/// settled at most once, by [`resolve`](Self::resolve) or
/// [`reject`](Self::reject). Consumers should only ever see the
/// [`Promise`] returned by [`promise`](Self::promise).
///
/// # Examples
///
/// ```
/// use ibe_promise::{Deferred, Error, Status};
///
/// let d = Deferred::<&str, ()>::new();
/// d.promise().done(|v| println!("received {v}"));
/// d.resolve("🍓").unwrap();
/// assert_eq!(d.resolve("again"), Err(Error::AlreadySettled(Status::Resolved)));
/// ```
pub struct Deferred<T, E> {
    pub(crate) inner: Rc<RefCell<Inner<T, E>>>,
}

pub(crate) enum State<T, E> {
    Unfulfilled,
    Resolved(Rc<T>),
    Rejected(Rc<E>),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Unfulfilled => Status::Unfulfilled,
            State::Resolved(_) => Status::Resolved,
            State::Rejected(_) => Status::Rejected,
        }
    }

    fn outcome(&self) -> Option<Outcome<T, E>> {
        match self {
            State::Unfulfilled => None,
            State::Resolved(v) => Some(Ok(v.clone())),
            State::Rejected(e) => Some(Err(e.clone())),
        }
    }
}

type Outcome<T, E> = Result<Rc<T>, Rc<E>>;

enum Callback<T, E> {
    Done(Box<dyn FnOnce(&T)>),
    Fail(Box<dyn FnOnce(&E)>),
    Always(Box<dyn FnOnce(Result<&T, &E>)>),
}

impl<T, E> Callback<T, E> {
    fn invoke(self, outcome: &Outcome<T, E>) {
        match (self, outcome) {
            (Callback::Done(f), Ok(v)) => f(&**v),
            (Callback::Fail(f), Err(e)) => f(&**e),
            (Callback::Always(f), Ok(v)) => f(Ok(&**v)),
            (Callback::Always(f), Err(e)) => f(Err(&**e)),
            _ => {}
        }
    }
}

pub(crate) struct Inner<T, E> {
    pub(crate) state: State<T, E>,
    callbacks: Vec<Callback<T, E>>,
    pub(crate) wakers: Vec<Waker>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("status", &inner.state.status())
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}

impl<T: 'static, E: 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    pub fn new() -> Self {
        Self::with_state(State::Unfulfilled)
    }

    pub(crate) fn settled(outcome: Result<T, E>) -> Self {
        Self::with_state(match outcome {
            Ok(v) => State::Resolved(Rc::new(v)),
            Err(e) => State::Rejected(Rc::new(e)),
        })
    }

    fn with_state(state: State<T, E>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state,
                callbacks: vec![],
                wakers: vec![],
            })),
        }
    }

    /// The read-only view handed out to consumers.
    pub fn promise(&self) -> Promise<T, E> {
        Promise::new(self.clone())
    }

    pub fn status(&self) -> Status {
        self.inner.borrow().state.status()
    }

    /// Resolves the deferred and runs every `done`/`always` callback in
    /// registration order before returning.
    ///
    /// Fails with [`Error::AlreadySettled`] if the deferred was resolved or
    /// rejected before; the first outcome is kept.
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        self.settle(Ok(Rc::new(value)))
    }

    /// Rejects the deferred and runs every `fail`/`always` callback in
    /// registration order before returning.
    pub fn reject(&self, err: E) -> Result<(), Error> {
        self.settle(Err(Rc::new(err)))
    }

    fn settle(&self, outcome: Outcome<T, E>) -> Result<(), Error> {
        let (callbacks, wakers) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let current = inner.state.status();
            if current != Status::Unfulfilled {
                return Err(Error::AlreadySettled(current));
            }
            inner.state = match &outcome {
                Ok(v) => State::Resolved(v.clone()),
                Err(e) => State::Rejected(e.clone()),
            };
            // detach: observers are released once they have run
            (mem::take(&mut inner.callbacks), mem::take(&mut inner.wakers))
        };
        trace!(
            status = %self.status(),
            callbacks = callbacks.len(),
            wakers = wakers.len(),
            "settled"
        );
        for callback in callbacks {
            callback.invoke(&outcome);
        }
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    fn register(&self, callback: Callback<T, E>) {
        let outcome = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match inner.state.outcome() {
                Some(outcome) => outcome,
                None => {
                    inner.callbacks.push(callback);
                    return;
                }
            }
        };
        callback.invoke(&outcome);
    }

    /// Registers `f` to run on resolution. Runs it right away if the
    /// deferred is already resolved; does nothing if it was rejected.
    pub fn done(&self, f: impl FnOnce(&T) + 'static) -> &Self {
        self.register(Callback::Done(Box::new(f)));
        self
    }

    /// Registers `f` to run on rejection. Runs it right away if the
    /// deferred is already rejected; does nothing if it was resolved.
    pub fn fail(&self, f: impl FnOnce(&E) + 'static) -> &Self {
        self.register(Callback::Fail(Box::new(f)));
        self
    }

    /// Registers `f` to run on either outcome.
    pub fn always(&self, f: impl FnOnce(Result<&T, &E>) + 'static) -> &Self {
        self.register(Callback::Always(Box::new(f)));
        self
    }

    /// Chains a dependent step. See [`Promise::then`].
    pub fn then<U, N, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        E: Clone,
        N: Into<Next<U, E>>,
        F: FnOnce(&T) -> N + 'static,
    {
        let chained = Deferred::new();
        let on_done = chained.clone();
        let on_fail = chained.clone();
        self.done(move |v| match f(v).into() {
            Next::Value(u) => report(on_done.resolve(u), "then"),
            Next::Thenable(p) => p.settled(Box::new(move |outcome: Result<&U, &E>| match outcome {
                Ok(u) => report(on_done.resolve(u.clone()), "then"),
                Err(e) => report(on_done.reject(e.clone()), "then"),
            })),
        })
        .fail(move |e| report(on_fail.reject(e.clone()), "then"));
        chained.promise()
    }

    pub(crate) fn outcome(&self) -> Option<Result<Rc<T>, Rc<E>>> {
        self.inner.borrow().state.outcome()
    }
}

/// Internal deferreds are only settled behind a status guard, so a refusal
/// here means a foreign producer settled one of them first.
pub(crate) fn report(settled: Result<(), Error>, site: &'static str) {
    if let Err(err) = settled {
        warn!(%err, site, "settlement refused");
    }
}
