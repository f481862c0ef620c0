use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::deferred::{report, Deferred};
use crate::Promise;

type Step<V, E> = Box<dyn FnMut() -> Promise<Option<V>, E>>;

/// An asynchronous cursor over a lazy sequence.
///
/// Each [`advance`](Self::advance) calls the step function once; the step
/// yields `Some(value)` for the next element or `None` once the sequence is
/// over. Clones share the same position.
pub struct Iter<V, E> {
    step: Rc<RefCell<Step<V, E>>>,
    current: Rc<RefCell<Option<V>>>,
}

impl<V, E> Clone for Iter<V, E> {
    fn clone(&self) -> Self {
        Self {
            step: self.step.clone(),
            current: self.current.clone(),
        }
    }
}

impl<V: fmt::Debug, E> fmt::Debug for Iter<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("current", &self.current.borrow()).finish()
    }
}

/// Builds an [`Iter`] around a step function.
pub fn iterator<V, E, S>(step: S) -> Iter<V, E>
where
    S: FnMut() -> Promise<Option<V>, E> + 'static,
{
    let step: Step<V, E> = Box::new(step);
    Iter {
        step: Rc::new(RefCell::new(step)),
        current: Rc::new(RefCell::new(None)),
    }
}

impl<V: Clone + 'static, E: Clone + 'static> Iter<V, E> {
    /// Requests the next element.
    ///
    /// Resolves to `true` once a new element is available through
    /// [`current`](Self::current), or `false` at the end of the sequence (in
    /// which case `current` keeps its previous value). Rejects if the step
    /// function's promise rejects.
    pub fn advance(&self) -> Promise<bool, E> {
        let next = {
            let mut step = self.step.borrow_mut();
            (&mut **step)()
        };
        let current = self.current.clone();
        next.map(move |value| match value {
            Some(v) => {
                *current.borrow_mut() = Some(v.clone());
                true
            }
            None => false,
        })
    }

    /// The element produced by the last successful advance.
    pub fn current(&self) -> Option<V> {
        self.current.borrow().clone()
    }
}

/// A factory of independent [`Iter`]s over the same sequence.
pub struct Generator<V, E> {
    factory: Rc<dyn Fn() -> Iter<V, E>>,
}

impl<V, E> Clone for Generator<V, E> {
    fn clone(&self) -> Self {
        Self { factory: self.factory.clone() }
    }
}

impl<V, E> fmt::Debug for Generator<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator")
    }
}

impl<V, E> Generator<V, E> {
    /// A fresh iterator, positioned before the first element.
    pub fn iter(&self) -> Iter<V, E> {
        (self.factory)()
    }
}

/// Wraps a factory of step functions; every [`Generator::iter`] call starts
/// a new traversal with a new step function from `g`.
pub fn generator<V, E, G, S>(g: G) -> Generator<V, E>
where
    G: Fn() -> S + 'static,
    S: FnMut() -> Promise<Option<V>, E> + 'static,
{
    Generator {
        factory: Rc::new(move || iterator(g())),
    }
}

/// Drives a fresh iterator of `source` to exhaustion, calling `f` with every
/// element in order.
///
/// The next element is only requested after the previous advance has
/// settled. The returned promise resolves once the sequence is exhausted,
/// or rejects with the first failing advance's error, in which case no
/// further elements are requested.
///
/// ```
/// use ibe_promise::{each, generator, resolved};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let countdown = generator(|| {
///     let mut n = 3;
///     move || {
///         n -= 1;
///         resolved::<_, ()>(if n > 0 { Some(n) } else { None })
///     }
/// });
/// let seen = Rc::new(RefCell::new(vec![]));
/// let sink = seen.clone();
/// let finished = each(&countdown, move |v| sink.borrow_mut().push(*v));
/// assert!(finished.result().is_ok());
/// assert_eq!(*seen.borrow(), vec![2, 1]);
/// ```
pub fn each<V, E, F>(source: &Generator<V, E>, f: F) -> Promise<(), E>
where
    V: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&V) + 'static,
{
    let fin = Deferred::new();
    each_core(fin.clone(), source.iter(), Rc::new(RefCell::new(f)));
    fin.promise()
}

fn each_core<V, E, F>(fin: Deferred<(), E>, it: Iter<V, E>, f: Rc<RefCell<F>>)
where
    V: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&V) + 'static,
{
    // advances that settle synchronously are consumed here without recursing
    loop {
        let advanced = it.advance();
        match advanced.peek() {
            Some(Ok(true)) => visit(&it, &f),
            Some(Ok(false)) => {
                finish(&fin);
                return;
            }
            Some(Err(e)) => {
                report(fin.reject(e), "each");
                return;
            }
            None => {
                let on_fail = fin.clone();
                advanced
                    .done(move |has_value| {
                        if *has_value {
                            visit(&it, &f);
                            each_core(fin, it, f);
                        } else {
                            finish(&fin);
                        }
                    })
                    .fail(move |e| report(on_fail.reject(e.clone()), "each"));
                return;
            }
        }
    }
}

fn visit<V, E, F>(it: &Iter<V, E>, f: &Rc<RefCell<F>>)
where
    V: Clone + 'static,
    E: Clone + 'static,
    F: FnMut(&V),
{
    if let Some(v) = it.current() {
        let mut f = f.borrow_mut();
        (&mut *f)(&v);
    }
}

fn finish<E: 'static>(fin: &Deferred<(), E>) {
    debug!("each: sequence exhausted");
    report(fin.resolve(()), "each");
}

#[cfg(test)]
mod tests {
    use super::{each, generator, iterator};
    use crate::{defer, rejected, resolved, Deferred, Promise, Status};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn counting(limit: u32) -> impl FnMut() -> Promise<Option<u32>, String> {
        let mut n = 0;
        move || {
            n += 1;
            resolved(if n <= limit { Some(n) } else { None })
        }
    }

    #[test]
    fn advance_sets_current_until_the_sentinel() {
        let it = iterator(counting(2));
        assert_eq!(it.current(), None);
        assert_eq!(it.advance().result(), Ok(true));
        assert_eq!(it.current(), Some(1));
        assert_eq!(it.advance().result(), Ok(true));
        assert_eq!(it.current(), Some(2));
        assert_eq!(it.advance().result(), Ok(false));
        assert_eq!(it.current(), Some(2));
    }

    #[test]
    fn advance_propagates_step_rejection() {
        let it = iterator(|| rejected::<Option<u8>, _>("broken"));
        assert_eq!(it.advance().error(), Ok("broken"));
    }

    #[test]
    fn generator_restarts_traversal() {
        let source = generator(|| counting(3));
        let first = source.iter();
        first.advance();
        first.advance();
        let second = source.iter();
        second.advance();
        assert_eq!(first.current(), Some(2));
        assert_eq!(second.current(), Some(1));
    }

    #[test]
    fn each_visits_every_element_in_order() {
        let source = generator(|| counting(4));
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let fin = each(&source, move |v| sink.borrow_mut().push(*v));
        assert_eq!(fin.status(), Status::Resolved);
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn each_drains_long_synchronous_sequences() {
        let source = generator(|| counting(100_000));
        let count = Rc::new(RefCell::new(0u32));
        let sink = count.clone();
        let fin = each(&source, move |_| *sink.borrow_mut() += 1);
        assert_eq!(fin.result(), Ok(()));
        assert_eq!(*count.borrow(), 100_000);
    }

    #[test]
    fn each_waits_for_pending_advances() {
        let pending: Rc<RefCell<VecDeque<Deferred<Option<u8>, String>>>> =
            Rc::new(RefCell::new(VecDeque::new()));
        let queue = pending.clone();
        let source = generator(move || {
            let queue = queue.clone();
            move || {
                let d = defer();
                queue.borrow_mut().push_back(d.clone());
                d.promise()
            }
        });
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let fin = each(&source, move |v| sink.borrow_mut().push(*v));

        let next = || pending.borrow_mut().pop_front().unwrap();
        next().resolve(Some(10)).unwrap();
        assert_eq!(fin.status(), Status::Unfulfilled);
        next().resolve(Some(20)).unwrap();
        next().resolve(None).unwrap();
        assert_eq!(fin.status(), Status::Resolved);
        assert_eq!(*seen.borrow(), vec![10, 20]);
        assert!(pending.borrow().is_empty());
    }

    #[test]
    fn each_rejects_when_a_pending_advance_fails() {
        let pending: Rc<RefCell<VecDeque<Deferred<Option<u8>, String>>>> =
            Rc::new(RefCell::new(VecDeque::new()));
        let requested = Rc::new(RefCell::new(0));
        let (queue, count) = (pending.clone(), requested.clone());
        let source = generator(move || {
            let (queue, count) = (queue.clone(), count.clone());
            move || {
                *count.borrow_mut() += 1;
                let d = defer();
                queue.borrow_mut().push_back(d.clone());
                d.promise()
            }
        });
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let fin = each(&source, move |v| sink.borrow_mut().push(*v));

        let next = || pending.borrow_mut().pop_front().unwrap();
        next().resolve(Some(1)).unwrap();
        assert_eq!(fin.status(), Status::Unfulfilled);
        next().reject("advance failed".into()).unwrap();

        assert_eq!(fin.error(), Ok("advance failed".to_string()));
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(*requested.borrow(), 2);
        assert!(pending.borrow().is_empty());
    }
}
