//! A last-in-first-out stack of deferred actions.
//!
//! Actions registered with [`CleanupStack::defer`] run when the stack is
//! destroyed (explicitly or on drop), in reverse registration order. The
//! returned [`CleanupHandle`] allows running a single action early or
//! cancelling it without running it. Deferred actions must not fail; anything
//! fallible inside an action has to log and continue.

use std::cell::RefCell;
use std::rc::Rc;

type Action = Box<dyn FnOnce()>;

type Slots = Rc<RefCell<Vec<Option<Action>>>>;

/// A scope of deferred actions, executed LIFO on destruction.
#[derive(Default)]
pub struct CleanupStack {
    slots: Slots,
}

/// A handle to a single deferred action.
///
/// The handle stays valid after the owning stack has been destroyed; running
/// or releasing an action that is already gone is a no-op.
pub struct CleanupHandle {
    slots: Slots,
    index: usize,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action to run when this stack is destroyed.
    pub fn defer<F>(&mut self, action: F) -> CleanupHandle
    where
        F: FnOnce() + 'static,
    {
        let mut slots = self.slots.borrow_mut();
        slots.push(Some(Box::new(action)));
        CleanupHandle {
            slots: self.slots.clone(),
            index: slots.len() - 1,
        }
    }

    /// Register an owned resource to be dropped when this stack is destroyed.
    ///
    /// `run_now()` on the returned handle drops the resource early, which for
    /// descriptor types closes the descriptor.
    pub fn defer_drop<T: 'static>(&mut self, resource: T) -> CleanupHandle {
        self.defer(move || drop(resource))
    }

    /// Discard all remaining actions without running them.
    pub fn release_all(&mut self) {
        for slot in self.slots.borrow_mut().iter_mut() {
            slot.take();
        }
    }

    /// Run all remaining actions in reverse registration order.
    pub fn destroy(&mut self) {
        loop {
            // Actions may register further actions on this stack, so take them
            // one at a time instead of draining the vector up front.
            let action = {
                let mut slots = self.slots.borrow_mut();
                let Some(last) = slots.iter().rposition(|slot| slot.is_some()) else {
                    break;
                };
                slots[last].take()
            };
            if let Some(action) = action {
                action();
            }
        }
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl CleanupHandle {
    /// Run the deferred action now. Idempotent; later stack destruction will
    /// not run it again.
    pub fn run_now(&self) {
        let action = self.slots.borrow_mut()[self.index].take();
        if let Some(action) = action {
            action();
        }
    }

    /// Cancel the deferred action without running it.
    pub fn release(self) {
        self.slots.borrow_mut()[self.index].take();
    }
}
