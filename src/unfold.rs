use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::deferred::{report, Deferred};
use crate::{Promise, Status};

/// One expansion step of [`unfold`]: the eventual element, and the seed for
/// the following step. `next: None` marks the last element.
pub struct Unspooled<T, E, S> {
    pub promise: Promise<T, E>,
    pub next: Option<S>,
}

/// Builds a sequence from `seed` by repeated expansion
/// ([anamorphism](http://en.wikipedia.org/wiki/Anamorphism)).
///
/// `unspool` is called with the seed, then with each returned `next` seed
/// once the previous element has resolved, until it returns `None` or a
/// step without a `next` seed. The values of all step promises are
/// collected in seed order. Steps whose promise is already resolved are
/// consumed in a loop without waiting; the first pending one suspends the
/// unfold until it settles. The first rejection rejects the result and
/// discards what was collected.
///
/// A step promise that never settles leaves the result unfulfilled forever.
///
/// ```
/// use ibe_promise::{resolved, unfold, Unspooled};
///
/// let squares = unfold(
///     |n: u32| {
///         (n <= 4).then(|| Unspooled {
///             promise: resolved::<_, ()>(n * n),
///             next: Some(n + 1),
///         })
///     },
///     1,
/// );
/// assert_eq!(squares.result().unwrap(), vec![1, 4, 9, 16]);
/// ```
pub fn unfold<T, E, S, F>(unspool: F, seed: S) -> Promise<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    S: 'static,
    F: FnMut(S) -> Option<Unspooled<T, E, S>> + 'static,
{
    let d = Deferred::new();
    unfold_core(
        Rc::new(RefCell::new(vec![])),
        d.clone(),
        Rc::new(RefCell::new(unspool)),
        seed,
    );
    d.promise()
}

fn unfold_core<T, E, S, F>(
    elements: Rc<RefCell<Vec<T>>>,
    deferred: Deferred<Vec<T>, E>,
    unspool: Rc<RefCell<F>>,
    seed: S,
) where
    T: Clone + 'static,
    E: Clone + 'static,
    S: 'static,
    F: FnMut(S) -> Option<Unspooled<T, E, S>> + 'static,
{
    let mut step = match expand(&unspool, seed) {
        Some(step) => step,
        None => return finish(&elements, &deferred),
    };
    loop {
        let Unspooled { promise, next } = step;
        match (next, promise.peek()) {
            (Some(seed), Some(Ok(v))) => {
                elements.borrow_mut().push(v);
                step = match expand(&unspool, seed) {
                    Some(step) => step,
                    None => return finish(&elements, &deferred),
                };
            }
            (next, _) => {
                if promise.status() == Status::Unfulfilled {
                    debug!(collected = elements.borrow().len(), "unfold: waiting on element");
                }
                let on_fail = deferred.clone();
                promise
                    .done(move |v| {
                        elements.borrow_mut().push(v.clone());
                        match next {
                            Some(seed) => unfold_core(elements, deferred, unspool, seed),
                            None => finish(&elements, &deferred),
                        }
                    })
                    .fail(move |e| report(on_fail.reject(e.clone()), "unfold"));
                return;
            }
        }
    }
}

fn expand<T, E, S, F>(unspool: &Rc<RefCell<F>>, seed: S) -> Option<Unspooled<T, E, S>>
where
    F: FnMut(S) -> Option<Unspooled<T, E, S>>,
{
    let mut unspool = unspool.borrow_mut();
    (&mut *unspool)(seed)
}

fn finish<T: 'static, E: 'static>(elements: &Rc<RefCell<Vec<T>>>, deferred: &Deferred<Vec<T>, E>) {
    let collected = mem::take(&mut *elements.borrow_mut());
    report(deferred.resolve(collected), "unfold");
}
