//! Thread-backed communicator
//!
//! Each task owns a mailbox (an mpsc receiver) and a sender into every
//! task's mailbox, itself included. Messages that arrive before anyone asks
//! for them are parked in a local queue and matched later by source and tag.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};

use cola_kernel::comm::{take_matching, Envelope};
use cola_kernel::{CommError, Communicator, Tag};

enum Message {
    Data(Envelope),
    Abort { src: usize, reason: String },
}

/// Communicator endpoint of one task in an in-process group.
pub struct ThreadComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    mailbox: Receiver<Message>,
    pending: VecDeque<Envelope>,
    aborted: bool,
}

impl ThreadComm {
    /// Create a fully connected group of `size` endpoints, one per task.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel::<Message>()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, mailbox)| ThreadComm {
                rank,
                senders: senders.clone(),
                mailbox,
                pending: VecDeque::new(),
                aborted: false,
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send<T: Send + 'static>(&mut self, dest: usize, tag: Tag, payload: T) -> Result<(), CommError> {
        let sender = self.senders.get(dest).ok_or(CommError::NoSuchTask {
            dest,
            size: self.senders.len(),
        })?;
        sender
            .send(Message::Data(Envelope {
                src: self.rank,
                tag,
                payload: Box::new(payload),
            }))
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn recv<T: Send + 'static>(&mut self, src: usize, tag: Tag) -> Result<T, CommError> {
        if src >= self.senders.len() {
            return Err(CommError::NoSuchTask {
                dest: src,
                size: self.senders.len(),
            });
        }
        if let Some(envelope) = take_matching(&mut self.pending, src, tag) {
            return envelope.open();
        }
        loop {
            match self.mailbox.recv() {
                Ok(Message::Data(envelope)) => {
                    if envelope.src == src && envelope.tag == tag {
                        return envelope.open();
                    }
                    self.pending.push_back(envelope);
                }
                Ok(Message::Abort { src: peer, reason }) => {
                    self.aborted = true;
                    return Err(CommError::PeerAborted { peer, reason });
                }
                Err(_) => return Err(CommError::Disconnected { peer: src }),
            }
        }
    }

    fn abort(&mut self, reason: &str) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        tracing::warn!("Task {} aborting run: {}", self.rank, reason);
        for (dest, sender) in self.senders.iter().enumerate() {
            if dest != self.rank {
                // A peer that already exited has nothing left to unblock.
                let _ = sender.send(Message::Abort {
                    src: self.rank,
                    reason: reason.to_string(),
                });
            }
        }
    }
}
