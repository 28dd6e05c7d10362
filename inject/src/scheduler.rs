//! Deferred task execution for post-construct hooks.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

/// A sink for work that must run after the current injector call returns.
///
/// Singletons defer their post-construct hooks so that a hook asking the
/// injector for its own type receives the cached instance instead of
/// constructing a second one.
pub trait Scheduler {
  /// Queues `task` for later execution.
  fn schedule(&self, task: Box<dyn FnOnce()>);

  /// Called whenever the outermost operation on an injector tree returns.
  fn tick(&self) {}
}

/// The default scheduler: a FIFO queue drained on every tick.
///
/// Tasks scheduled while the queue is being drained join the same drain.
#[derive(Default)]
pub struct TickQueue {
  tasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
  running: Cell<bool>,
}

impl TickQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of tasks waiting for the next tick.
  pub fn pending(&self) -> usize {
    self.tasks.borrow().len()
  }

  /// Runs queued tasks in order until the queue is empty.
  ///
  /// A nested call from inside a running task returns immediately.
  pub fn run_pending(&self) {
    if self.running.replace(true) {
      return;
    }
    let _running = Running(&self.running);
    loop {
      let next = self.tasks.borrow_mut().pop_front();
      match next {
        Some(task) => task(),
        None => break,
      }
    }
  }
}

struct Running<'a>(&'a Cell<bool>);

impl Drop for Running<'_> {
  fn drop(&mut self) {
    self.0.set(false);
  }
}

impl Scheduler for TickQueue {
  fn schedule(&self, task: Box<dyn FnOnce()>) {
    self.tasks.borrow_mut().push_back(task);
  }

  fn tick(&self) {
    self.run_pending();
  }
}

impl fmt::Debug for TickQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TickQueue")
      .field("pending", &self.pending())
      .field("running", &self.running.get())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  #[test]
  fn runs_tasks_in_order_on_tick() {
    let queue = Rc::new(TickQueue::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    for i in 0..3 {
      let log = log.clone();
      queue.schedule(Box::new(move || log.borrow_mut().push(i)));
    }
    assert_eq!(queue.pending(), 3);
    assert!(log.borrow().is_empty());

    queue.tick();
    assert_eq!(*log.borrow(), vec![0, 1, 2]);
    assert_eq!(queue.pending(), 0);
  }

  #[test]
  fn tasks_scheduled_while_draining_run_in_the_same_drain() {
    let queue = Rc::new(TickQueue::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    let inner_queue = queue.clone();
    let inner_log = log.clone();
    queue.schedule(Box::new(move || {
      inner_log.borrow_mut().push("outer");
      let nested_log = inner_log.clone();
      inner_queue.schedule(Box::new(move || nested_log.borrow_mut().push("nested")));
      // Re-entrant drain is a no-op.
      inner_queue.tick();
    }));

    queue.tick();
    assert_eq!(*log.borrow(), vec!["outer", "nested"]);
  }
}
