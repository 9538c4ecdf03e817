//! In-process rank group: one OS thread per rank.
//!
//! `ThreadComm` lets SPMD code written against [`Comm`] run with several
//! ranks inside a single process. The ranks of a group share a board holding a
//! barrier and a `size × size` mailbox; every collective writes its row of the
//! mailbox, waits at the barrier, reads its column and waits again so the
//! board can be reused by the next collective.

use super::Comm;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};

static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

struct Board {
    id: u64,
    size: usize,
    barrier: Barrier,
    // slot src * size + dst
    mailbox: Mutex<Vec<Vec<u8>>>,
    scalars: Mutex<Vec<f64>>,
}

/// Handle of one rank in an in-process group.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    board: Arc<Board>,
}

impl ThreadComm {
    /// Creates the handles of a fresh group of `size` ranks.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a process group needs at least one rank");
        let board = Arc::new(Board {
            id: NEXT_GROUP.fetch_add(1, Ordering::Relaxed),
            size,
            barrier: Barrier::new(size),
            mailbox: Mutex::new(vec![Vec::new(); size * size]),
            scalars: Mutex::new(vec![0.0; size]),
        });
        (0..size)
            .map(|rank| ThreadComm { rank, board: board.clone() })
            .collect()
    }

    /// Runs `body` on `size` ranks, one thread each, and returns the results
    /// in rank order. A panic on any rank is re-raised here.
    pub fn run<F, R>(size: usize, body: F) -> Vec<R>
    where
        F: Fn(Arc<dyn Comm>) -> R + Sync,
        R: Send,
    {
        let comms = ThreadComm::group(size);
        let body = &body;
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || body(Arc::new(comm) as Arc<dyn Comm>)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }

    fn reduce_with(&self, x: f64, op: impl Fn(f64, f64) -> f64) -> f64 {
        self.board.scalars.lock()[self.rank] = x;
        self.board.barrier.wait();
        // rank order keeps the result identical on every rank
        let out = {
            let scalars = self.board.scalars.lock();
            scalars[1..].iter().fold(scalars[0], |acc, &v| op(acc, v))
        };
        self.board.barrier.wait();
        out
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.board.size }
    fn group_id(&self) -> u64 { self.board.id }
    fn barrier(&self) { self.board.barrier.wait(); }

    fn all_reduce(&self, x: f64) -> f64 {
        self.reduce_with(x, |a, b| a + b)
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        self.reduce_with(x, f64::max)
    }

    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let size = self.board.size;
        assert_eq!(send.len(), size, "one send buffer per rank");
        {
            let mut mailbox = self.board.mailbox.lock();
            for (dst, buf) in send.into_iter().enumerate() {
                mailbox[self.rank * size + dst] = buf;
            }
        }
        self.board.barrier.wait();
        let recv = {
            let mut mailbox = self.board.mailbox.lock();
            (0..size)
                .map(|src| std::mem::take(&mut mailbox[src * size + self.rank]))
                .collect()
        };
        self.board.barrier.wait();
        recv
    }
}
