//! Fixed-capacity item pools and the registration state machine.
//!
//! A pool owns one kind of item: telemetry channels, actions, or alarms.
//! The first `stack_max` items live in a preallocated inline partition;
//! items beyond that are boxed individually, up to the pool's hard
//! ceiling. A dense index keeps the live items addressable by position and
//! scannable by name.

use tether_types::Status;

/// Where a pooled item stands relative to its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Local only; the cloud has never seen it (or has forgotten it).
    Unregistered,
    /// A register attempt reached the plugin and failed; local intent is
    /// recorded, remote confirmation is not. A reconnect sweep may retry.
    RegisterPending,
    /// The cloud mirrors this item.
    Registered,
    /// A deregister attempt reached the plugin and failed.
    DeregisterPending,
}

/// The registration half of every pooled item.
///
/// State moves only through the `begin_*`/`complete_*` transition methods,
/// so an item cannot skip a plugin call or invent a confirmation.
#[derive(Debug)]
pub struct Registration {
    state: RegistrationState,
    /// Set when the item's declaration changed after it registered; the
    /// next register call becomes a plugin update.
    dirty: bool,
}

impl Registration {
    /// A fresh, unregistered item.
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
            dirty: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Whether the item is confirmed registered.
    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Record a declaration change on a live item.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a register call must reach the plugin: any state short of a
    /// clean `Registered`, or a registered item with a changed declaration.
    pub fn register_needs_plugin(&self) -> bool {
        self.state != RegistrationState::Registered || self.dirty
    }

    /// Fold the plugin's answer to a register call into the state machine.
    pub fn complete_register(&mut self, accepted: bool) {
        if accepted {
            self.state = RegistrationState::Registered;
            self.dirty = false;
        } else {
            self.state = RegistrationState::RegisterPending;
        }
    }

    /// Check that a deregister call is legal from the current state.
    ///
    /// # Errors
    ///
    /// [`Status::NotInitialized`] unless the item is `Registered` or
    /// `DeregisterPending`.
    pub fn begin_deregister(&self) -> Result<(), Status> {
        match self.state {
            RegistrationState::Registered | RegistrationState::DeregisterPending => Ok(()),
            _ => Err(Status::NotInitialized),
        }
    }

    /// Fold the plugin's answer to a deregister call into the state
    /// machine.
    pub fn complete_deregister(&mut self, accepted: bool) {
        if accepted {
            self.state = RegistrationState::Unregistered;
            self.dirty = false;
        } else {
            self.state = RegistrationState::DeregisterPending;
        }
    }
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by everything a [`Pool`] stores.
pub(crate) trait Named {
    /// The item's unique name within its pool.
    fn name(&self) -> &str;
}

/// Where one live item's storage sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Index into the inline partition.
    Stack(usize),
    /// Index into the overflow boxes.
    Heap(usize),
}

/// A fixed-capacity pool with an inline partition and boxed overflow.
///
/// Invariants, checked by the tests below: the live index is dense, its
/// length never exceeds `max`, and live names are pairwise distinct.
/// Freeing compacts by swapping the last live entry into the vacated
/// position; only the freed item's own storage is released.
pub(crate) struct Pool<T> {
    /// Inline partition, fixed length `stack_max`. `None` marks a hole.
    stack: Vec<Option<T>>,
    /// Overflow entries, boxed one by one. `None` marks a reusable hole.
    heap: Vec<Option<Box<T>>>,
    /// Dense live index, in allocation order until a free shuffles it.
    live: Vec<Slot>,
    max: usize,
}

impl<T: Named> Pool<T> {
    /// A pool with `stack_max` inline slots and a hard ceiling of `max`.
    pub fn new(stack_max: usize, max: usize) -> Self {
        let mut stack = Vec::with_capacity(stack_max);
        stack.resize_with(stack_max, || None);
        Self {
            stack,
            heap: Vec::new(),
            live: Vec::new(),
            max: max.max(stack_max),
        }
    }

    /// Number of live items.
    pub fn count(&self) -> usize {
        self.live.len()
    }

    /// Position of the named item in the live index.
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..self.live.len()).find(|&i| self.item(i).name() == name)
    }

    /// Allocate by name, or return the existing item's position on a name
    /// collision.
    ///
    /// # Errors
    ///
    /// [`Status::Full`] at the pool ceiling.
    pub fn allocate(&mut self, name: &str, create: impl FnOnce() -> T) -> Result<usize, Status> {
        if let Some(index) = self.find(name) {
            return Ok(index);
        }
        if self.live.len() >= self.max {
            return Err(Status::Full);
        }
        let slot = match self.stack.iter().position(Option::is_none) {
            Some(hole) => {
                self.stack[hole] = Some(create());
                Slot::Stack(hole)
            }
            None => match self.heap.iter().position(Option::is_none) {
                Some(hole) => {
                    self.heap[hole] = Some(Box::new(create()));
                    Slot::Heap(hole)
                }
                None => {
                    self.heap.push(Some(Box::new(create())));
                    Slot::Heap(self.heap.len() - 1)
                }
            },
        };
        self.live.push(slot);
        Ok(self.live.len() - 1)
    }

    /// Borrow the item at a live position.
    pub fn item(&self, index: usize) -> &T {
        match self.live[index] {
            Slot::Stack(i) => self.stack[i]
                .as_ref()
                .unwrap_or_else(|| unreachable!("live index points at an empty stack slot")),
            Slot::Heap(i) => self.heap[i]
                .as_ref()
                .unwrap_or_else(|| unreachable!("live index points at an empty heap slot")),
        }
    }

    /// Mutably borrow the item at a live position.
    pub fn item_mut(&mut self, index: usize) -> &mut T {
        match self.live[index] {
            Slot::Stack(i) => self.stack[i]
                .as_mut()
                .unwrap_or_else(|| unreachable!("live index points at an empty stack slot")),
            Slot::Heap(i) => self.heap[i]
                .as_mut()
                .unwrap_or_else(|| unreachable!("live index points at an empty heap slot")),
        }
    }

    /// Whether the item at a live position sits in the overflow partition.
    pub fn is_heap_backed(&self, index: usize) -> bool {
        matches!(self.live[index], Slot::Heap(_))
    }

    /// Release the item at a live position, compacting the live index by
    /// swapping in its last entry. Returns the item.
    pub fn free(&mut self, index: usize) -> T {
        let slot = self.live.swap_remove(index);
        match slot {
            Slot::Stack(i) => self.stack[i]
                .take()
                .unwrap_or_else(|| unreachable!("freeing an empty stack slot")),
            Slot::Heap(i) => {
                let boxed = self.heap[i]
                    .take()
                    .unwrap_or_else(|| unreachable!("freeing an empty heap slot"));
                // Trim trailing holes so a long-lived pool doesn't keep a
                // high-water-mark of empty boxes.
                while matches!(self.heap.last(), Some(None)) {
                    self.heap.pop();
                }
                *boxed
            }
        }
    }

    /// Names of every live item, in index order.
    pub fn names(&self) -> Vec<String> {
        (0..self.live.len())
            .map(|i| self.item(i).name().to_owned())
            .collect()
    }
}
