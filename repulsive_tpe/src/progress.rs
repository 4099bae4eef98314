/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress reporting messages and sinks for tree builds and metric solves.
//
// Created on: 19 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for energy updates and metric solves.

use std::fmt::Debug;
use std::sync::{mpsc, Arc};
use std::thread;

/// Progress events emitted by the energies and solvers.
#[derive(Debug, Clone)]
pub enum ProgressMsg {
    /// A cluster tree was rebuilt for the current geometry.
    TreeBuilt {
        num_primitives: usize,
        num_clusters: usize,
        depth: usize,
    },

    /// A block cluster tree was rebuilt for the current geometry.
    BlockTreeBuilt {
        near_pairs: usize,
        far_blocks: usize,
    },

    /// Iteration status for the metric solver.
    SolverIteration {
        iter: usize,
        residual: f64,
        progress: f64,
    },

    /// Arbitrary informational message.
    Message { message: String },
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a bounded channel.
///
/// Messages are dropped rather than blocking the caller when the channel is full.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs `handler` for each progress message.
///
/// The thread exits once every clone of the returned sink has been dropped.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Fraction of the way from `start_res` to `target_res` on a log scale, in [0, 1].
#[inline]
pub(crate) fn progress_from_rel(current_res: f64, start_res: f64, target_res: f64) -> f64 {
    if current_res <= target_res || start_res <= target_res {
        1.0
    } else {
        ((start_res.log10() - current_res.log10()) / (start_res.log10() - target_res.log10()))
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_sink_forwards_messages() {
        let (tx, rx) = mpsc::channel();
        let (sink, handle) = closure_sink(8, move |msg| {
            let _ = tx.send(msg);
        });

        sink.emit(ProgressMsg::Message {
            message: "hello".to_string(),
        });
        drop(sink);
        handle.join().unwrap();

        match rx.recv().unwrap() {
            ProgressMsg::Message { message } => assert_eq!(message, "hello"),
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_from_rel(1e-9, 1.0, 1e-6), 1.0);
        assert_eq!(progress_from_rel(1.0, 1.0, 1e-6), 0.0);
        assert!((progress_from_rel(1e-3, 1.0, 1e-6) - 0.5).abs() < 1e-12);
        assert_eq!(progress_from_rel(2.0, 1.0, 1e-6), 0.0);
    }
}
