//! The bounded request queue.
//!
//! A fixed set of slots, allocated once: a stack of free slots, a FIFO
//! list of waiting slots, and at most one active slot per worker. A
//! request is deep-copied into its slot on enqueue and the whole copy is
//! released in one step when the slot returns to the free stack, so the
//! queue's worst-case memory is known up front.

use std::collections::VecDeque;
use std::sync::Mutex;
use tether_types::limits::SLOT_ARENA_SIZE;
use tether_types::{ActionRequest, Status};
use tokio::sync::Notify;

/// Occupancy of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// On the free stack.
    Free,
    /// Holds a request awaiting dispatch.
    Waiting,
    /// A worker is handling its request.
    Active,
}

/// One preallocated queue position.
struct Slot {
    state: SlotState,
    /// The deep-copied request while `Waiting`; taken by the dispatching
    /// worker.
    request: Option<ActionRequest>,
    /// Bytes the copy occupies, per [`ActionRequest::copy_size`].
    copy_size: usize,
    /// Whether the copy exceeded the slot's arena and spilled to the heap.
    spilled: bool,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: SlotState::Free,
            request: None,
            copy_size: 0,
            spilled: false,
        }
    }

    fn reset(&mut self) {
        self.state = SlotState::Free;
        self.request = None;
        self.copy_size = 0;
        self.spilled = false;
    }
}

struct QueueState {
    slots: Vec<Slot>,
    /// Free slots, most recently released on top.
    free: Vec<usize>,
    /// Waiting slots, oldest first.
    waiting: VecDeque<usize>,
}

/// Counts of slots per occupancy, for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    /// Slots on the free stack.
    pub free: usize,
    /// Slots awaiting dispatch.
    pub waiting: usize,
    /// Slots held by workers.
    pub active: usize,
}

/// The bounded request queue. Metadata sits behind one lock that is never
/// held across an await; workers park on the notifier.
pub(crate) struct RequestQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    depth: usize,
}

impl RequestQueue {
    /// A queue of `depth` preallocated slots.
    pub fn new(depth: usize) -> Self {
        let slots = (0..depth).map(|_| Slot::new()).collect();
        // Popping from the top hands out high indices first.
        let free = (0..depth).collect();
        Self {
            state: Mutex::new(QueueState {
                slots,
                free,
                waiting: VecDeque::with_capacity(depth),
            }),
            ready: Notify::new(),
            depth,
        }
    }

    /// Number of slots.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Copy `request` into a free slot and append it to the waiting list.
    /// Never blocks beyond the queue lock.
    ///
    /// # Errors
    ///
    /// [`Status::Full`] when every slot is taken.
    pub fn enqueue(&self, request: ActionRequest) -> Result<(), Status> {
        {
            let mut state = crate::lock(&self.state);
            if state.waiting.len() >= self.depth {
                return Err(Status::Full);
            }
            let Some(index) = state.free.pop() else {
                return Err(Status::Full);
            };
            let copy_size = request.copy_size();
            let spilled = copy_size > SLOT_ARENA_SIZE;
            if spilled {
                tracing::debug!(
                    action = %request.action,
                    copy_size,
                    "request spilled past the slot arena"
                );
            }
            let slot = &mut state.slots[index];
            slot.state = SlotState::Waiting;
            slot.request = Some(request);
            slot.copy_size = copy_size;
            slot.spilled = spilled;
            state.waiting.push_back(index);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Pop the oldest waiting request, marking its slot active. Returns
    /// `None` when nothing is waiting.
    pub fn dequeue(&self) -> Option<(usize, ActionRequest)> {
        let popped = {
            let mut state = crate::lock(&self.state);
            let index = state.waiting.pop_front()?;
            let more_waiting = !state.waiting.is_empty();
            let slot = &mut state.slots[index];
            slot.state = SlotState::Active;
            let Some(request) = slot.request.take() else {
                // A waiting slot always holds a request; recover by
                // returning the slot rather than wedging it active.
                slot.reset();
                state.free.push(index);
                return None;
            };
            (index, request, more_waiting)
        };
        let (index, request, more_waiting) = popped;
        if more_waiting {
            // Keep sibling workers draining while this one handles its
            // request.
            self.ready.notify_one();
        }
        Some((index, request))
    }

    /// Return a slot to the free stack, releasing its copy in one step.
    pub fn release(&self, index: usize) {
        let mut state = crate::lock(&self.state);
        state.slots[index].reset();
        state.free.push(index);
    }

    /// Take every waiting request, returning the slots to the free stack.
    /// Used at shutdown to fail pending work.
    pub fn drain(&self) -> Vec<ActionRequest> {
        let mut state = crate::lock(&self.state);
        let mut drained = Vec::with_capacity(state.waiting.len());
        while let Some(index) = state.waiting.pop_front() {
            let slot = &mut state.slots[index];
            if let Some(request) = slot.request.take() {
                drained.push(request);
            }
            slot.reset();
            state.free.push(index);
        }
        drained
    }

    /// Park until [`enqueue`](RequestQueue::enqueue) signals.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    /// Current occupancy counts.
    pub fn counts(&self) -> QueueCounts {
        let state = crate::lock(&self.state);
        let active = state
            .slots
            .iter()
            .filter(|s| s.state == SlotState::Active)
            .count();
        QueueCounts {
            free: state.free.len(),
            waiting: state.waiting.len(),
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tag: usize) -> ActionRequest {
        ActionRequest::new(format!("action-{tag}"))
    }

    #[test]
    fn fills_to_depth_then_reports_full() {
        let queue = RequestQueue::new(4);
        for i in 0..4 {
            queue.enqueue(request(i)).unwrap();
        }
        assert_eq!(queue.enqueue(request(4)), Err(Status::Full));
        let counts = queue.counts();
        assert_eq!(counts.waiting, 4);
        assert_eq!(counts.free, 0);
    }

    #[test]
    fn dequeue_is_fifo() {
        let queue = RequestQueue::new(4);
        for i in 0..3 {
            queue.enqueue(request(i)).unwrap();
        }
        for i in 0..3 {
            let (index, req) = queue.dequeue().unwrap();
            assert_eq!(req.action, format!("action-{i}"));
            queue.release(index);
        }
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn every_slot_is_in_exactly_one_set() {
        let queue = RequestQueue::new(3);
        queue.enqueue(request(0)).unwrap();
        queue.enqueue(request(1)).unwrap();
        let (active_index, _req) = queue.dequeue().unwrap();

        let counts = queue.counts();
        assert_eq!(counts.free, 1);
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.free + counts.waiting + counts.active, queue.depth());

        queue.release(active_index);
        let counts = queue.counts();
        assert_eq!(counts.free, 2);
        assert_eq!(counts.active, 0);
    }

    #[test]
    fn released_slots_are_reusable_forever() {
        let queue = RequestQueue::new(2);
        for round in 0..10 {
            queue.enqueue(request(round)).unwrap();
            let (index, _req) = queue.dequeue().unwrap();
            queue.release(index);
        }
        assert_eq!(queue.counts().free, 2);
    }

    #[test]
    fn drain_returns_waiting_requests_and_frees_their_slots() {
        let queue = RequestQueue::new(4);
        for i in 0..3 {
            queue.enqueue(request(i)).unwrap();
        }
        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].action, "action-0");
        let counts = queue.counts();
        assert_eq!(counts.free, 4);
        assert_eq!(counts.waiting, 0);
    }

    #[test]
    fn spill_accounting_tracks_large_requests() {
        let queue = RequestQueue::new(1);
        let big = ActionRequest::new("big").with_param("blob", vec![0u8; SLOT_ARENA_SIZE + 1]);
        queue.enqueue(big).unwrap();
        let state = crate::lock(&queue.state);
        assert!(state.slots[0].spilled);
        assert!(state.slots[0].copy_size > SLOT_ARENA_SIZE);
    }

    #[tokio::test]
    async fn enqueue_wakes_a_parked_waiter() {
        use std::sync::Arc;
        let queue = Arc::new(RequestQueue::new(2));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.wait_ready().await;
                queue.dequeue().map(|(index, req)| {
                    queue.release(index);
                    req.action
                })
            })
        };
        tokio::task::yield_now().await;
        queue.enqueue(request(7)).unwrap();
        let action = waiter.await.unwrap();
        assert_eq!(action.as_deref(), Some("action-7"));
    }
}
