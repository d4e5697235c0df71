//! ## hearth-engine::loop_system
//! **Hierarchical enter/idle/exit loop runner**
//!
//! A [`LoopSystem`] owns optional enter, idle and exit callbacks, a loop
//! condition, and an ordered list of subsystems. Running it:
//!
//! 1. enters itself, then every subsystem, pre-order;
//! 2. while the condition holds, runs idle pre-order;
//! 3. exits in the exact reverse of the enter order.
//!
//! Every node entered by a run counts as running until its exit callback
//! has run, so `run()` on any node of an active tree is refused.
//!
//! The condition is only checked between idle iterations; an idle callback
//! that never returns cannot be interrupted.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoopError {
    #[error("loop system is already running")]
    AlreadyRunning,

    #[error("loop condition was false on entry")]
    ConditionFalse,

    #[error("a loop system cannot be its own subsystem")]
    SelfReference,

    #[error("subsystem would create a cycle")]
    Cycle,

    #[error("subsystem is already attached")]
    Duplicate,
}

impl LoopError {
    /// Process exit code for a failed run. Success is 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopError::AlreadyRunning => 1,
            LoopError::ConditionFalse => 2,
            LoopError::SelfReference | LoopError::Cycle | LoopError::Duplicate => 3,
        }
    }

    pub fn code_of(result: &Result<(), LoopError>) -> i32 {
        result.as_ref().map_or_else(LoopError::exit_code, |_| 0)
    }
}

type Callback = Box<dyn FnMut()>;
type Condition = Box<dyn FnMut() -> bool>;

struct LoopNode {
    name: String,
    /// Active entries; a node shared by two parents is entered twice.
    running: Cell<usize>,
    condition: RefCell<Option<Condition>>,
    on_enter: RefCell<Option<Callback>>,
    on_idle: RefCell<Option<Callback>>,
    on_exit: RefCell<Option<Callback>>,
    subsystems: RefCell<Vec<LoopSystem>>,
}

/// Handle to a loop node. Clones refer to the same node.
#[derive(Clone)]
pub struct LoopSystem {
    node: Rc<LoopNode>,
}

/// Non-owning handle, for callbacks that refer back to their own loop.
#[derive(Clone)]
pub struct WeakLoopSystem {
    node: Weak<LoopNode>,
}

impl WeakLoopSystem {
    pub fn upgrade(&self) -> Option<LoopSystem> {
        self.node.upgrade().map(|node| LoopSystem { node })
    }
}

/// Nodes entered by one run, innermost last. Whatever is still here when
/// the run unwinds is marked as no longer running.
struct ActiveRun {
    entered: Vec<LoopSystem>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        while let Some(system) = self.entered.pop() {
            system.leave();
        }
    }
}

/// Marks one node as left once its exit callback returns or unwinds.
struct Leaving(LoopSystem);

impl Drop for Leaving {
    fn drop(&mut self) {
        self.0.leave();
    }
}

/// Calls the callback in `slot`. It is taken out for the duration of the
/// call so it may replace itself; it is put back unless it did.
fn invoke(slot: &RefCell<Option<Callback>>) {
    let Some(mut callback) = slot.borrow_mut().take() else {
        return;
    };
    callback();
    let mut slot = slot.borrow_mut();
    if slot.is_none() {
        *slot = Some(callback);
    }
}

impl LoopSystem {
    pub fn new() -> Self {
        Self::named("loop")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            node: Rc::new(LoopNode {
                name: name.into(),
                running: Cell::new(0),
                condition: RefCell::new(None),
                on_enter: RefCell::new(None),
                on_idle: RefCell::new(None),
                on_exit: RefCell::new(None),
                subsystems: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn downgrade(&self) -> WeakLoopSystem {
        WeakLoopSystem {
            node: Rc::downgrade(&self.node),
        }
    }

    /// Whether `self` and `other` are the same node.
    pub fn ptr_eq(&self, other: &LoopSystem) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    pub fn set_loop_condition(&self, condition: impl FnMut() -> bool + 'static) {
        *self.node.condition.borrow_mut() = Some(Box::new(condition));
    }

    pub fn set_enter_callback(&self, callback: impl FnMut() + 'static) {
        *self.node.on_enter.borrow_mut() = Some(Box::new(callback));
    }

    pub fn set_idle_callback(&self, callback: impl FnMut() + 'static) {
        *self.node.on_idle.borrow_mut() = Some(Box::new(callback));
    }

    pub fn set_exit_callback(&self, callback: impl FnMut() + 'static) {
        *self.node.on_exit.borrow_mut() = Some(Box::new(callback));
    }

    /// Attaches `child` after the existing subsystems.
    ///
    /// Rejects `self`, a child already attached here, and any child whose
    /// subtree already contains `self`.
    pub fn add_subsystem(&self, child: &LoopSystem) -> Result<(), LoopError> {
        if self.ptr_eq(child) {
            return Err(LoopError::SelfReference);
        }
        if self.node.subsystems.borrow().iter().any(|s| s.ptr_eq(child)) {
            return Err(LoopError::Duplicate);
        }
        if child.reaches(self) {
            return Err(LoopError::Cycle);
        }
        self.node.subsystems.borrow_mut().push(child.clone());
        trace!(parent = %self.name(), child = %child.name(), "subsystem added");
        Ok(())
    }

    /// Detaches `child`. Returns `false` if it was not a direct subsystem.
    pub fn remove_subsystem(&self, child: &LoopSystem) -> bool {
        let mut subsystems = self.node.subsystems.borrow_mut();
        match subsystems.iter().position(|s| s.ptr_eq(child)) {
            Some(position) => {
                subsystems.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn subsystem_count(&self) -> usize {
        self.node.subsystems.borrow().len()
    }

    /// Whether the node is part of a run in progress, as root or subsystem.
    pub fn is_running(&self) -> bool {
        self.node.running.get() > 0
    }

    fn leave(&self) {
        self.node.running.set(self.node.running.get().saturating_sub(1));
    }

    /// Whether `target` is `self` or one of its descendants.
    fn reaches(&self, target: &LoopSystem) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(system) = stack.pop() {
            if system.ptr_eq(target) {
                return true;
            }
            if visited.insert(Rc::as_ptr(&system.node)) {
                stack.extend(system.subsystems());
            }
        }
        false
    }

    fn subsystems(&self) -> Vec<LoopSystem> {
        self.node.subsystems.borrow().clone()
    }

    fn condition(&self) -> bool {
        let Some(mut condition) = self.node.condition.borrow_mut().take() else {
            return false;
        };
        let holds = condition();
        let mut slot = self.node.condition.borrow_mut();
        if slot.is_none() {
            *slot = Some(condition);
        }
        holds
    }

    fn enter(&self, run: &mut ActiveRun) {
        debug!(system = %self.name(), "enter");
        self.node.running.set(self.node.running.get() + 1);
        run.entered.push(self.clone());
        invoke(&self.node.on_enter);
        for child in self.subsystems() {
            child.enter(run);
        }
    }

    fn idle(&self) {
        invoke(&self.node.on_idle);
        for child in self.subsystems() {
            child.idle();
        }
    }

    /// Runs the loop to completion.
    ///
    /// Exit callbacks run even when the condition is false on entry; the
    /// run then reports [`LoopError::ConditionFalse`].
    pub fn run(&self) -> Result<(), LoopError> {
        if self.is_running() {
            return Err(LoopError::AlreadyRunning);
        }

        let mut active = ActiveRun {
            entered: Vec::new(),
        };
        self.enter(&mut active);

        let result = if self.condition() {
            let mut iterations: u64 = 0;
            loop {
                self.idle();
                iterations += 1;
                if !self.condition() {
                    break;
                }
            }
            debug!(system = %self.name(), iterations, "idle finished");
            Ok(())
        } else {
            debug!(system = %self.name(), "condition false on entry");
            Err(LoopError::ConditionFalse)
        };

        while let Some(system) = active.entered.pop() {
            debug!(system = %system.name(), "exit");
            let leaving = Leaving(system);
            invoke(&leaving.0.node.on_exit);
        }
        result
    }
}

impl Default for LoopSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopSystem")
            .field("name", &self.node.name)
            .field("running", &self.is_running())
            .field("subsystems", &self.subsystem_count())
            .finish()
    }
}
