use std::cell::{Cell, RefCell};
use std::rc::Rc;

use libpulse_binding::callbacks::ListResult;
use libpulse_binding::operation::{Operation as PaOperation, State as PaOperationState};
use loopme_core::domain::{Listing, OpStatus, Operation};

use super::convert::op_status;

/// Type-erased view of a libpulse operation's state
pub(crate) struct Probe(Box<dyn Fn() -> PaOperationState>);

impl Probe {
    pub(crate) fn new<C: ?Sized + 'static>(op: PaOperation<C>) -> Self {
        Self(Box::new(move || op.get_state()))
    }

    fn state(&self) -> PaOperationState {
        (self.0)()
    }
}

/// Entries collected by an introspection callback
pub(crate) struct Collected<T> {
    pub(crate) entries: RefCell<Vec<T>>,
    /// The callback reported an error instead of the end of the list
    pub(crate) errored: Cell<bool>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            errored: Cell::new(false),
        }
    }
}

/// Push a list callback result into `collected`
pub(crate) fn collect<I, T>(collected: &Collected<T>, result: ListResult<I>, convert: impl FnOnce(I) -> T) {
    match result {
        ListResult::Item(info) => collected.entries.borrow_mut().push(convert(info)),
        ListResult::End => {}
        ListResult::Error => collected.errored.set(true),
    }
}

/// Enumeration in flight
pub struct PulseListing<T> {
    probe: Probe,
    collected: Rc<Collected<T>>,
}

impl<T> PulseListing<T> {
    pub(crate) fn new(probe: Probe, collected: Rc<Collected<T>>) -> Self {
        Self { probe, collected }
    }
}

impl<T> Operation for PulseListing<T> {
    fn status(&self) -> OpStatus {
        op_status(self.probe.state(), Some(!self.collected.errored.get()))
    }
}

impl<T> Listing<T> for PulseListing<T> {
    fn take_entries(&mut self) -> Vec<T> {
        self.collected.entries.take()
    }
}

/// Stream move in flight
pub struct PulseMove {
    probe: Probe,
    succeeded: Rc<Cell<Option<bool>>>,
}

impl PulseMove {
    pub(crate) fn new(probe: Probe, succeeded: Rc<Cell<Option<bool>>>) -> Self {
        Self { probe, succeeded }
    }
}

impl Operation for PulseMove {
    fn status(&self) -> OpStatus {
        op_status(self.probe.state(), self.succeeded.get())
    }
}
