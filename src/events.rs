//! Event plumbing: the event structure, the FIFO queues used by the
//! interpreter and the delayed-send scheduler driven by a virtual clock.

use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::datamodel::{Data, DataMap};

/// Event type.
/// *W3C says*:
/// The SCXML Processor must set the "type" field to "platform" (for events
/// raised by the platform itself, such as error events), "internal" (for
/// events raised by raise and send with target '_internal') or "external"
/// (for all other events).
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum EventType {
    Platform,
    Internal,
    External,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Platform => "platform",
            EventType::Internal => "internal",
            EventType::External => "external",
        }
    }
}

/// A runtime event. The same structure is used for internal, external and
/// platform events; the distinction is carried in `etype`.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub etype: EventType,
    pub sendid: Option<String>,
    pub origin: Option<String>,
    /// Set if this event was produced by (or addressed through) an invoked
    /// child session.
    pub invoke_id: Option<String>,
    pub data: Option<Data>,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Event {
    pub fn new_simple(name: &str) -> Event {
        Event {
            name: name.to_string(),
            etype: EventType::External,
            sendid: None,
            origin: None,
            invoke_id: None,
            data: None,
        }
    }

    pub fn new_external(name: &str, data: Option<Data>) -> Event {
        Event {
            name: name.to_string(),
            etype: EventType::External,
            sendid: None,
            origin: None,
            invoke_id: None,
            data,
        }
    }

    /// Event raised by `<raise>`.
    pub fn raised(name: &str) -> Event {
        Event {
            name: name.to_string(),
            etype: EventType::Internal,
            sendid: None,
            origin: None,
            invoke_id: None,
            data: None,
        }
    }

    /// `done.state.<id>` for a completed compound or parallel state.
    pub fn done_state(state_name: &str, data: Option<Data>) -> Event {
        Event {
            name: format!("done.state.{}", state_name),
            etype: EventType::Internal,
            sendid: None,
            origin: None,
            invoke_id: None,
            data,
        }
    }

    /// `done.invoke.<id>` for a completed child session.
    pub fn done_invoke(invoke_id: &str, data: Option<Data>) -> Event {
        Event {
            name: format!("done.invoke.{}", invoke_id),
            etype: EventType::External,
            sendid: None,
            origin: None,
            invoke_id: Some(invoke_id.to_string()),
            data,
        }
    }

    /// *W3C says*: Indicates that an error internal to the execution of the
    /// document has occurred, such as one arising from expression evaluation.
    pub fn error_execution(detail: &str) -> Event {
        Event {
            name: "error.execution".to_string(),
            etype: EventType::Platform,
            sendid: None,
            origin: None,
            invoke_id: None,
            data: if detail.is_empty() {
                None
            } else {
                Some(Data::String(detail.to_string()))
            },
        }
    }

    /// *W3C says*: Indicates that an error has occurred while trying to
    /// communicate with an external entity.
    pub fn error_communication(detail: &str) -> Event {
        Event {
            name: "error.communication".to_string(),
            etype: EventType::Platform,
            sendid: None,
            origin: None,
            invoke_id: None,
            data: if detail.is_empty() {
                None
            } else {
                Some(Data::String(detail.to_string()))
            },
        }
    }

    /// The value bound to `_event` inside expression evaluation.
    pub fn as_data(&self) -> Data {
        let mut m = DataMap::new();
        m.insert("name".to_string(), Data::String(self.name.clone()));
        m.insert("type".to_string(), Data::String(self.etype.name().to_string()));
        m.insert(
            "sendid".to_string(),
            match &self.sendid {
                Some(s) => Data::String(s.clone()),
                None => Data::Null,
            },
        );
        m.insert(
            "origin".to_string(),
            match &self.origin {
                Some(s) => Data::String(s.clone()),
                None => Data::Null,
            },
        );
        m.insert(
            "invokeid".to_string(),
            match &self.invoke_id {
                Some(s) => Data::String(s.clone()),
                None => Data::Null,
            },
        );
        m.insert(
            "data".to_string(),
            match &self.data {
                Some(d) => d.clone(),
                None => Data::Null,
            },
        );
        Data::Map(m)
    }
}

/// Queue datatype used by the algorithm.
#[derive(Debug, Default)]
pub struct Queue<T> {
    data: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Queue<T> {
        Queue {
            data: VecDeque::new(),
        }
    }

    /// Extension to re-use existing instances.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// *W3C says*:
    /// Puts e last in the queue
    pub fn enqueue(&mut self, e: T) {
        self.data.push_back(e);
    }

    /// *W3C says*:
    /// Removes and returns first element in queue
    pub fn dequeue(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    /// *W3C says*:
    /// Is the queue empty?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// Destination of a (possibly delayed) `<send>`.
#[derive(Debug, Clone, PartialEq)]
pub enum SendTarget {
    /// The session's own external queue (absent or self target).
    External,
    /// `#_internal`
    Internal,
    /// `#_parent`
    Parent,
    /// `#_<invokeid>`
    Child(String),
}

/// A send scheduled on the delay heap.
#[derive(Debug)]
pub struct ScheduledSend {
    pub due_us: u64,
    pub seq: u64,
    pub target: SendTarget,
    pub event: Event,
}

impl PartialEq for ScheduledSend {
    fn eq(&self, other: &Self) -> bool {
        self.due_us == other.due_us && self.seq == other.seq
    }
}

impl Eq for ScheduledSend {}

impl PartialOrd for ScheduledSend {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledSend {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_us, self.seq).cmp(&(other.due_us, other.seq))
    }
}

/// Delayed-send scheduler. Time is a virtual, monotonic microsecond counter
/// advanced only through [DelayQueue::advance]; nothing here ever consults
/// the wall clock. Entries with equal due time preserve schedule order via
/// the global `seq` tie-break.
#[derive(Debug, Default)]
pub struct DelayQueue {
    now_us: u64,
    next_seq: u64,
    heap: BinaryHeap<Reverse<ScheduledSend>>,
    /// Live send-id -> seq, for cancellation.
    pending: HashMap<String, u64>,
    /// seq -> owning state, for sends scheduled with an `idlocation`.
    owned: HashMap<u64, u32>,
    cancelled: HashSet<u64>,
}

impl DelayQueue {
    pub fn new() -> DelayQueue {
        DelayQueue::default()
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Schedule `event` to fire `delay_us` from now. `owner` is set for
    /// sends authored with `idlocation`; those are cancelled when the owning
    /// state is exited.
    pub fn schedule(
        &mut self,
        event: Event,
        delay_us: u64,
        send_id: Option<String>,
        target: SendTarget,
        owner: Option<u32>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(id) = send_id {
            // A re-used send-id supersedes the older pending entry.
            if let Some(old) = self.pending.insert(id, seq) {
                self.cancelled.insert(old);
                self.owned.remove(&old);
            }
        }
        if let Some(state) = owner {
            self.owned.insert(seq, state);
        }
        self.heap.push(Reverse(ScheduledSend {
            due_us: self.now_us + delay_us,
            seq,
            target,
            event,
        }));
        seq
    }

    /// Cancel a pending send by its send-id. Idempotent; cancelling an
    /// unknown or already-delivered id is a silent no-op.
    pub fn cancel(&mut self, send_id: &str) -> bool {
        match self.pending.remove(send_id) {
            Some(seq) => {
                self.cancelled.insert(seq);
                self.owned.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending send that was scheduled with an `idlocation`
    /// by an action of `state`.
    pub fn cancel_owned_by(&mut self, state: u32) {
        let seqs: Vec<u64> = self
            .owned
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in seqs {
            self.owned.remove(&seq);
            self.cancelled.insert(seq);
            self.pending.retain(|_, s| *s != seq);
        }
    }

    /// Advance the virtual clock and return every non-cancelled entry that
    /// became due, in `(due, seq)` order.
    pub fn advance(&mut self, delta_us: u64) -> Vec<ScheduledSend> {
        self.now_us += delta_us;
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.due_us > self.now_us {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap();
            self.owned.remove(&entry.seq);
            self.pending.retain(|_, s| *s != entry.seq);
            if self.cancelled.remove(&entry.seq) {
                continue;
            }
            due.push(entry);
        }
        due
    }

    /// True if an entry is already due at the current clock value.
    pub fn has_due(&self) -> bool {
        match self.heap.peek() {
            Some(Reverse(head)) => head.due_us <= self.now_us && !self.cancelled.contains(&head.seq),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt(name: &str) -> Event {
        Event::new_simple(name)
    }

    #[test]
    fn queue_is_fifo() {
        let mut q = Queue::new();
        q.enqueue(evt("a"));
        q.enqueue(evt("b"));
        q.enqueue(evt("c"));
        assert_eq!(q.dequeue().unwrap().name, "a");
        assert_eq!(q.dequeue().unwrap().name, "b");
        assert_eq!(q.dequeue().unwrap().name, "c");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn delayed_sends_fire_in_due_then_seq_order() {
        let mut dq = DelayQueue::new();
        dq.schedule(evt("late"), 200, None, SendTarget::External, None);
        dq.schedule(evt("tie1"), 100, None, SendTarget::External, None);
        dq.schedule(evt("tie2"), 100, None, SendTarget::External, None);
        assert!(dq.advance(50).is_empty());
        let due: Vec<String> = dq.advance(50).iter().map(|s| s.event.name.clone()).collect();
        assert_eq!(due, vec!["tie1".to_string(), "tie2".to_string()]);
        let due: Vec<String> = dq.advance(100).iter().map(|s| s.event.name.clone()).collect();
        assert_eq!(due, vec!["late".to_string()]);
    }

    #[test]
    fn cancel_removes_pending_entry() {
        let mut dq = DelayQueue::new();
        dq.schedule(evt("t"), 100, Some("k".to_string()), SendTarget::External, None);
        assert!(dq.cancel("k"));
        assert!(dq.advance(200).is_empty());
    }

    #[test]
    fn cancel_after_delivery_is_a_noop() {
        let mut dq = DelayQueue::new();
        dq.schedule(evt("t"), 10, Some("k".to_string()), SendTarget::External, None);
        assert_eq!(dq.advance(10).len(), 1);
        assert!(!dq.cancel("k"));
        assert!(!dq.cancel("unknown"));
    }

    #[test]
    fn exit_cancellation_only_hits_owned_sends() {
        let mut dq = DelayQueue::new();
        dq.schedule(evt("owned"), 10, Some("a".to_string()), SendTarget::External, Some(7));
        dq.schedule(evt("free"), 10, Some("b".to_string()), SendTarget::External, None);
        dq.cancel_owned_by(7);
        let due: Vec<String> = dq.advance(10).iter().map(|s| s.event.name.clone()).collect();
        assert_eq!(due, vec!["free".to_string()]);
    }
}
