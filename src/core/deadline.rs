use super::{NodeId, PortId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Output end of an end-to-end deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FromDescriptor {
    pub node: NodeId,
    pub output: PortId,
}

/// Input end of an end-to-end deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToDescriptor {
    pub node: NodeId,
    pub input: PortId,
}

impl FromDescriptor {
    pub fn new(node: impl Into<NodeId>, output: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

impl ToDescriptor {
    pub fn new(node: impl Into<NodeId>, input: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            input: input.into(),
        }
    }
}

impl std::fmt::Display for ToDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.input)
    }
}

impl std::fmt::Display for FromDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.output)
    }
}

/// Maximum time allowed for data to travel from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2EDeadline {
    pub from: FromDescriptor,
    pub to: ToDescriptor,
    pub duration: Duration,
}

impl E2EDeadline {
    pub fn new(from: FromDescriptor, to: ToDescriptor, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// Start tracking this deadline for a message emitted at `start`.
    pub fn start(&self, start: Timestamp) -> E2EDeadlineStart {
        E2EDeadlineStart {
            from: self.from.clone(),
            to: self.to.clone(),
            duration: self.duration,
            start,
        }
    }
}

/// An end-to-end deadline currently in flight on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2EDeadlineStart {
    pub from: FromDescriptor,
    pub to: ToDescriptor,
    pub duration: Duration,
    pub start: Timestamp,
}

impl E2EDeadlineStart {
    /// Returns the miss record if the deadline ends at `to` and `now` is past it.
    pub fn check(&self, to: &ToDescriptor, now: u64) -> Option<E2EDeadlineMiss> {
        if &self.to != to {
            return None;
        }

        let start = self.start.logical_clock();
        let elapsed = now.saturating_sub(start);
        if elapsed > self.duration.as_nanos() as u64 {
            Some(E2EDeadlineMiss {
                from: self.from.clone(),
                to: self.to.clone(),
                start,
                end: now,
            })
        } else {
            None
        }
    }
}

/// Record of an end-to-end deadline exceeded along a message's path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2EDeadlineMiss {
    pub from: FromDescriptor,
    pub to: ToDescriptor,
    pub start: u64,
    pub end: u64,
}

/// A node's `run` phase took longer than its configured deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDeadlineMiss {
    pub deadline_ns: u64,
    pub elapsed_ns: u64,
}

impl LocalDeadlineMiss {
    pub fn deadline(&self) -> Duration {
        Duration::from_nanos(self.deadline_ns)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns)
    }
}

/// Compare the time spent since `start` against an optional deadline.
pub fn check_local_deadline(deadline: Option<Duration>, start: Instant) -> Option<LocalDeadlineMiss> {
    let deadline = deadline?;
    let elapsed = start.elapsed();
    if elapsed > deadline {
        Some(LocalDeadlineMiss {
            deadline_ns: deadline.as_nanos() as u64,
            elapsed_ns: elapsed.as_nanos() as u64,
        })
    } else {
        None
    }
}
