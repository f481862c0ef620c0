use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::deferred::{report, Deferred};
use crate::{Error, Promise, Status};

/// Creates a promise that resolves when all the given promises resolve.
///
/// The results are collected in input order, whatever order the inputs
/// complete in. As soon as one input is rejected the aggregate is rejected
/// with [`Error::WhenRejected`]; the remaining inputs keep running but their
/// outcomes are ignored. Callers that need the individual errors must attach
/// their own `fail` handlers to the inputs.
///
/// With no inputs the aggregate is already resolved with an empty `Vec`.
///
/// ```
/// use ibe_promise::{defer, when};
///
/// let a = defer::<&str, ()>();
/// let b = defer::<&str, ()>();
/// let all = when([a.promise(), b.promise()]);
/// b.resolve("second").unwrap();
/// a.resolve("first").unwrap();
/// assert_eq!(all.result().unwrap(), vec!["first", "second"]);
/// ```
pub fn when<T, E, I>(promises: I) -> Promise<Vec<T>, Error>
where
    T: Clone + 'static,
    E: 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let all_done: Deferred<Vec<T>, Error> = Deferred::new();
    if promises.is_empty() {
        report(all_done.resolve(vec![]), "when");
        return all_done.promise();
    }

    let expected = promises.len();
    let results: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; expected]));
    let resolved = Rc::new(Cell::new(0usize));

    for (i, p) in promises.into_iter().enumerate() {
        let on_done = all_done.clone();
        let on_fail = all_done.clone();
        let results = results.clone();
        let resolved = resolved.clone();
        p.done(move |v| {
            results.borrow_mut()[i] = Some(v.clone());
            let count = resolved.get() + 1;
            resolved.set(count);
            if count == expected && on_done.status() != Status::Rejected {
                let collected: Vec<T> = results.borrow_mut().drain(..).flatten().collect();
                debug!(count, "when: all promises resolved");
                report(on_done.resolve(collected), "when");
            }
        })
        .fail(move |_| {
            if on_fail.status() != Status::Rejected {
                debug!(index = i, "when: promise rejected");
                report(on_fail.reject(Error::WhenRejected), "when");
            }
        });
    }
    all_done.promise()
}
