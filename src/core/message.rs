use super::deadline::{E2EDeadlineMiss, E2EDeadlineStart, ToDescriptor};
use super::Timestamp;
use bytes::Bytes;

/// Raw bytes travelling on a link.
pub type Payload = Bytes;

/// Unit of data exchanged between nodes.
///
/// Once built, only the end-to-end deadline bookkeeping can change, and that
/// requires exclusive ownership of the message.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage<T = Payload> {
    payload: T,
    timestamp: Timestamp,
    is_watermark: bool,
    end_to_end_deadlines: Vec<E2EDeadlineStart>,
    missed_end_to_end_deadlines: Vec<E2EDeadlineMiss>,
}

impl<T> DataMessage<T> {
    pub fn new(payload: T, timestamp: Timestamp) -> Self {
        Self {
            payload,
            timestamp,
            is_watermark: false,
            end_to_end_deadlines: Vec::new(),
            missed_end_to_end_deadlines: Vec::new(),
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn is_watermark(&self) -> bool {
        self.is_watermark
    }

    /// Deadlines still being tracked along this message's path.
    pub fn end_to_end_deadlines(&self) -> &[E2EDeadlineStart] {
        &self.end_to_end_deadlines
    }

    /// Misses recorded so far, oldest stage first.
    pub fn missed_end_to_end_deadlines(&self) -> &[E2EDeadlineMiss] {
        &self.missed_end_to_end_deadlines
    }

    pub fn push_missed_end_to_end_deadline(&mut self, miss: E2EDeadlineMiss) {
        self.missed_end_to_end_deadlines.push(miss);
    }

    pub(crate) fn push_end_to_end_deadline(&mut self, deadline: E2EDeadlineStart) {
        self.end_to_end_deadlines.push(deadline);
    }

    /// Append the deadline metadata carried by `other`, keeping both lists in order.
    pub(crate) fn inherit_deadlines<U>(&mut self, other: &DataMessage<U>) {
        for started in other.end_to_end_deadlines() {
            if !self.end_to_end_deadlines.contains(started) {
                self.end_to_end_deadlines.push(started.clone());
            }
        }
        for miss in other.missed_end_to_end_deadlines() {
            if !self.missed_end_to_end_deadlines.contains(miss) {
                self.missed_end_to_end_deadlines.push(miss.clone());
            }
        }
    }

    /// Record a miss for every tracked deadline that ends at `to` and has expired.
    /// Returns how many misses were appended.
    pub(crate) fn check_end_to_end_deadlines(&mut self, to: &ToDescriptor, now: u64) -> usize {
        let misses: Vec<E2EDeadlineMiss> = self
            .end_to_end_deadlines
            .iter()
            .filter_map(|started| started.check(to, now))
            .collect();
        let count = misses.len();
        self.missed_end_to_end_deadlines.extend(misses);
        count
    }

    /// Convert the payload, keeping timestamp and deadline metadata.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<DataMessage<U>, E> {
        Ok(DataMessage {
            payload: f(self.payload)?,
            timestamp: self.timestamp,
            is_watermark: self.is_watermark,
            end_to_end_deadlines: self.end_to_end_deadlines,
            missed_end_to_end_deadlines: self.missed_end_to_end_deadlines,
        })
    }
}

impl DataMessage<Payload> {
    /// A payload-less message signalling progress of logical time.
    pub fn watermark(timestamp: Timestamp) -> Self {
        Self {
            payload: Payload::new(),
            timestamp,
            is_watermark: true,
            end_to_end_deadlines: Vec::new(),
            missed_end_to_end_deadlines: Vec::new(),
        }
    }
}

/// What a typed input hands to the node.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<T> {
    Data(DataMessage<T>),
    Watermark(Timestamp),
}

impl<T> Message<T> {
    pub fn timestamp(&self) -> &Timestamp {
        match self {
            Self::Data(msg) => msg.timestamp(),
            Self::Watermark(ts) => ts,
        }
    }

    /// The data message, or `None` for a watermark.
    pub fn data(self) -> Option<DataMessage<T>> {
        match self {
            Self::Data(msg) => Some(msg),
            Self::Watermark(_) => None,
        }
    }
}

/// What an output rule decides to emit on a port.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Data(Payload),
    Watermark,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::deadline::{E2EDeadline, FromDescriptor};
    use std::time::Duration;
    use uuid::Uuid;

    fn ts(t: u64) -> Timestamp {
        Timestamp::new(t, Uuid::nil())
    }

    #[test]
    fn test_watermark_has_no_payload() {
        let wm = DataMessage::watermark(ts(7));
        assert!(wm.is_watermark());
        assert!(wm.payload().is_empty());
        assert_eq!(wm.timestamp().logical_clock(), 7);
    }

    #[test]
    fn test_try_map_keeps_metadata() {
        let mut msg = DataMessage::new(Payload::from_static(&[0, 42]), ts(1));
        let deadline = E2EDeadline::new(
            FromDescriptor::new("a", "out"),
            ToDescriptor::new("b", "in"),
            Duration::from_nanos(1),
        );
        msg.push_end_to_end_deadline(deadline.start(ts(1)));
        assert_eq!(msg.check_end_to_end_deadlines(&ToDescriptor::new("b", "in"), 100), 1);

        let typed = msg
            .try_map(|bytes| Ok::<_, anyhow::Error>(bytes[1] as u32))
            .unwrap();
        assert_eq!(*typed.payload(), 42);
        assert_eq!(typed.end_to_end_deadlines().len(), 1);
        assert_eq!(typed.missed_end_to_end_deadlines().len(), 1);
    }

    #[test]
    fn test_missed_deadlines_are_append_only() {
        let mut msg = DataMessage::new(Payload::new(), ts(0));
        let first = E2EDeadlineMiss {
            from: FromDescriptor::new("a", "out"),
            to: ToDescriptor::new("b", "in"),
            start: 0,
            end: 10,
        };
        let second = E2EDeadlineMiss {
            from: FromDescriptor::new("b", "out"),
            to: ToDescriptor::new("c", "in"),
            start: 10,
            end: 20,
        };
        msg.push_missed_end_to_end_deadline(first.clone());
        msg.push_missed_end_to_end_deadline(second.clone());

        assert_eq!(msg.missed_end_to_end_deadlines(), &[first, second]);
    }
}
