//! Message passing between tasks.
//!
//! Every task owns one [`Communicator`]. Sends never block; receives block
//! until a message with the requested source and [`Tag`] arrives. Messages
//! from one source with one tag are delivered in send order. Payloads are
//! arbitrary owned values, so grids travel as `Vec<Complex<Real>>` and
//! migrating particles as `Vec<Particle>` without serialisation.
//!
//! Collectives are built from point-to-point messages through task 0, so all
//! tasks see reductions performed in the same order.

use std::any::Any;
use std::collections::VecDeque;

use thiserror::Error;

/// Message class used to match sends with receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// x-slab to y-slab transpose of the distributed FFT.
    TransposeOut,
    /// y-slab back to x-slab transpose of the distributed FFT.
    TransposeBack,
    /// Ghost plane of deposited mass, added into the neighbour's first plane.
    GhostMass,
    /// First owned plane of a field component, copied into the neighbour's ghost plane.
    GhostField(u8),
    /// Number of particles about to migrate.
    MigrationCount,
    /// Migrating particles.
    MigrationPayload,
    /// Contribution to a collective, sent to task 0.
    Gather,
    /// Result of a collective, sent from task 0.
    Broadcast,
}

/// Communication errors. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum CommError {
    /// The peer's mailbox is gone.
    #[error("task {peer} is unreachable")]
    Disconnected {
        /// Task that could not be reached.
        peer: usize,
    },

    /// A peer hit a fatal error and asked every task to stop.
    #[error("task {peer} aborted the run: {reason}")]
    PeerAborted {
        /// Task that aborted.
        peer: usize,
        /// Error reported by that task.
        reason: String,
    },

    /// The received payload has a different type than the receiver expects.
    #[error("payload from task {src} tagged {tag:?} has an unexpected type")]
    PayloadType {
        /// Sending task.
        src: usize,
        /// Message tag.
        tag: Tag,
    },

    /// Destination rank outside the group.
    #[error("no task {dest} in a group of {size}")]
    NoSuchTask {
        /// Requested task.
        dest: usize,
        /// Group size.
        size: usize,
    },

    /// A receive that can never be satisfied.
    #[error("receive from task {src} tagged {tag:?} would block forever")]
    Deadlock {
        /// Expected source.
        src: usize,
        /// Expected tag.
        tag: Tag,
    },
}

/// Point-to-point and collective messaging for one task.
pub trait Communicator {
    /// Index of this task.
    fn rank(&self) -> usize;

    /// Number of tasks in the run.
    fn size(&self) -> usize;

    /// Queue `payload` for task `dest`. Never blocks.
    fn send<T: Send + 'static>(&mut self, dest: usize, tag: Tag, payload: T)
        -> Result<(), CommError>;

    /// Block until a message from `src` with `tag` arrives and return its payload.
    fn recv<T: Send + 'static>(&mut self, src: usize, tag: Tag) -> Result<T, CommError>;

    /// Tell every other task to stop. Peers blocked in [`Communicator::recv`]
    /// return [`CommError::PeerAborted`].
    fn abort(&mut self, reason: &str);

    /// Collect one value from every task, in rank order, on every task.
    fn all_gather<T: Clone + Send + 'static>(&mut self, local: T) -> Result<Vec<T>, CommError> {
        let size = self.size();
        if self.rank() == 0 {
            let mut all = Vec::with_capacity(size);
            all.push(local);
            for src in 1..size {
                all.push(self.recv(src, Tag::Gather)?);
            }
            for dest in 1..size {
                self.send(dest, Tag::Broadcast, all.clone())?;
            }
            Ok(all)
        } else {
            self.send(0, Tag::Gather, local)?;
            self.recv(0, Tag::Broadcast)
        }
    }

    /// Sum of `local` over all tasks.
    fn all_reduce_sum(&mut self, local: f64) -> Result<f64, CommError> {
        Ok(self.all_gather(local)?.into_iter().sum())
    }

    /// Maximum of `local` over all tasks.
    fn all_reduce_max(&mut self, local: f64) -> Result<f64, CommError> {
        Ok(self
            .all_gather(local)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    /// Block until every task reaches this point.
    fn barrier(&mut self) -> Result<(), CommError> {
        self.all_gather(()).map(|_| ())
    }
}

/// A queued message that has not been matched by a receive yet.
pub struct Envelope {
    /// Sending task.
    pub src: usize,
    /// Message tag.
    pub tag: Tag,
    /// Type-erased payload.
    pub payload: Box<dyn Any + Send>,
}

impl Envelope {
    /// Recover the typed payload.
    pub fn open<T: 'static>(self) -> Result<T, CommError> {
        let (src, tag) = (self.src, self.tag);
        self.payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CommError::PayloadType { src, tag })
    }
}

/// Remove the oldest envelope matching `src` and `tag`.
pub fn take_matching(
    pending: &mut VecDeque<Envelope>,
    src: usize,
    tag: Tag,
) -> Option<Envelope> {
    let index = pending.iter().position(|e| e.src == src && e.tag == tag)?;
    pending.remove(index)
}

/// Communicator for a run with exactly one task.
///
/// Sends to itself are queued locally, which lets periodic neighbour
/// exchanges and transposes run through the same code path as a
/// multi-task run.
#[derive(Default)]
pub struct SingleTask {
    pending: VecDeque<Envelope>,
}

impl SingleTask {
    /// Create an empty single-task communicator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SingleTask {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send<T: Send + 'static>(&mut self, dest: usize, tag: Tag, payload: T) -> Result<(), CommError> {
        if dest != 0 {
            return Err(CommError::NoSuchTask { dest, size: 1 });
        }
        self.pending.push_back(Envelope {
            src: 0,
            tag,
            payload: Box::new(payload),
        });
        Ok(())
    }

    fn recv<T: Send + 'static>(&mut self, src: usize, tag: Tag) -> Result<T, CommError> {
        if src != 0 {
            return Err(CommError::NoSuchTask { dest: src, size: 1 });
        }
        take_matching(&mut self.pending, src, tag)
            .ok_or(CommError::Deadlock { src, tag })?
            .open()
    }

    fn abort(&mut self, reason: &str) {
        tracing::warn!("single task run aborted: {}", reason);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_send_round_trip() {
        let mut comm = SingleTask::new();
        comm.send(0, Tag::GhostMass, vec![1.0_f64, 2.0]).unwrap();
        let got: Vec<f64> = comm.recv(0, Tag::GhostMass).unwrap();
        assert_eq!(got, vec![1.0, 2.0]);
    }

    #[test]
    fn messages_match_by_tag_in_order() {
        let mut comm = SingleTask::new();
        comm.send(0, Tag::MigrationCount, 3_usize).unwrap();
        comm.send(0, Tag::GhostMass, 7_usize).unwrap();
        comm.send(0, Tag::MigrationCount, 4_usize).unwrap();

        let ghost: usize = comm.recv(0, Tag::GhostMass).unwrap();
        let first: usize = comm.recv(0, Tag::MigrationCount).unwrap();
        let second: usize = comm.recv(0, Tag::MigrationCount).unwrap();
        assert_eq!((ghost, first, second), (7, 3, 4));
    }

    #[test]
    fn wrong_payload_type_is_reported() {
        let mut comm = SingleTask::new();
        comm.send(0, Tag::Gather, 1_u32).unwrap();
        let err = comm.recv::<f64>(0, Tag::Gather).unwrap_err();
        assert!(matches!(err, CommError::PayloadType { src: 0, .. }));
    }

    #[test]
    fn empty_mailbox_is_a_deadlock() {
        let mut comm = SingleTask::new();
        let err = comm.recv::<usize>(0, Tag::Broadcast).unwrap_err();
        assert!(matches!(err, CommError::Deadlock { .. }));
    }

    #[test]
    fn collectives_with_one_task() {
        let mut comm = SingleTask::new();
        assert_eq!(comm.all_reduce_sum(2.5).unwrap(), 2.5);
        assert_eq!(comm.all_reduce_max(-1.0).unwrap(), -1.0);
        assert_eq!(comm.all_gather(9_u8).unwrap(), vec![9]);
        comm.barrier().unwrap();
    }
}
