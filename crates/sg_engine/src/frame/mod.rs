//! Frame phase scheduling
//!
//! Two scheduling models behind one interface, chosen by configuration and
//! invisible to node and visitor code:
//!
//! - `SingleThreaded`: update, cull, and draw run sequentially on the
//!   calling thread.
//! - `DrawThreaded`: a dedicated thread owns the graphics context and draws
//!   frame N while the caller updates and culls frame N+1. Two render
//!   queues rotate through a channel rendezvous; the blocking receive in
//!   [`FrameScheduler::acquire_queue`] is the frame-boundary barrier that
//!   keeps cull output for a frame fully built before its draw begins, and
//!   draw finished before the queue is reused.
//!
//! Phase ordering within one frame is enforced by the call sequence itself
//! (the engine culls into the queue it just acquired, then dispatches); no
//! locks are taken inside traversal.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use crate::config::ThreadingModel;
use crate::render::{draw_queue, DrawStats, GraphicsContext, RenderError, RenderQueue};

enum Inner {
    Single {
        context: GraphicsContext,
        queue: Option<RenderQueue>,
    },
    Threaded {
        work_tx: Option<SyncSender<RenderQueue>>,
        done_rx: Receiver<(RenderQueue, Result<DrawStats, RenderError>)>,
        worker: Option<JoinHandle<()>>,
        spare: Option<RenderQueue>,
        in_flight: usize,
    },
}

/// Owner of the draw side of the frame loop
pub struct FrameScheduler {
    inner: Inner,
}

impl FrameScheduler {
    /// Create a scheduler for the configured threading model
    ///
    /// Under `DrawThreaded` the graphics context moves onto the draw thread
    /// permanently; everything else keeps talking to it through queues.
    pub fn new(model: ThreadingModel, context: GraphicsContext) -> Self {
        match model {
            ThreadingModel::SingleThreaded => Self {
                inner: Inner::Single {
                    context,
                    queue: Some(RenderQueue::new()),
                },
            },
            ThreadingModel::DrawThreaded => {
                let (work_tx, work_rx) = mpsc::sync_channel::<RenderQueue>(1);
                let (done_tx, done_rx) = mpsc::channel();
                let mut context = context;
                let worker = std::thread::Builder::new()
                    .name("draw".into())
                    .spawn(move || {
                        while let Ok(queue) = work_rx.recv() {
                            let result = draw_queue(&queue, &mut context);
                            if done_tx.send((queue, result)).is_err() {
                                break;
                            }
                        }
                    });
                let worker = match worker {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        log::error!("failed to spawn draw thread: {err}");
                        None
                    }
                };
                Self {
                    inner: Inner::Threaded {
                        work_tx: Some(work_tx),
                        done_rx,
                        worker,
                        spare: Some(RenderQueue::new()),
                        in_flight: 0,
                    },
                }
            }
        }
    }

    /// Obtain an empty queue to cull the next frame into
    ///
    /// Under the threaded model this blocks until a previous frame's draw
    /// has finished when both queues are busy; a draw error from that frame
    /// surfaces here.
    pub fn acquire_queue(&mut self) -> Result<RenderQueue, RenderError> {
        match &mut self.inner {
            Inner::Single { queue, .. } => {
                let mut queue = queue.take().unwrap_or_default();
                queue.reset();
                Ok(queue)
            }
            Inner::Threaded {
                spare,
                done_rx,
                in_flight,
                ..
            } => {
                if let Some(mut queue) = spare.take() {
                    queue.reset();
                    return Ok(queue);
                }
                match done_rx.recv() {
                    Ok((mut queue, result)) => {
                        *in_flight = in_flight.saturating_sub(1);
                        queue.reset();
                        if let Err(err) = result {
                            // keep the queue so the next frame can proceed
                            *spare = Some(queue);
                            return Err(err);
                        }
                        Ok(queue)
                    }
                    Err(_) => {
                        log::error!("draw thread exited; falling back to a fresh queue");
                        Ok(RenderQueue::new())
                    }
                }
            }
        }
    }

    /// Hand a culled queue to the draw side
    ///
    /// Sequential mode draws immediately and returns its stats. Threaded
    /// mode enqueues and returns `None`; the stats of that frame are not
    /// observable until a later barrier.
    pub fn dispatch(&mut self, culled: RenderQueue) -> Result<Option<DrawStats>, RenderError> {
        match &mut self.inner {
            Inner::Single { context, queue } => {
                let stats = draw_queue(&culled, context)?;
                *queue = Some(culled);
                Ok(Some(stats))
            }
            Inner::Threaded {
                work_tx, in_flight, ..
            } => {
                match work_tx.as_ref() {
                    Some(tx) => {
                        if tx.send(culled).is_err() {
                            log::error!("draw thread is gone; frame dropped");
                        } else {
                            *in_flight += 1;
                        }
                    }
                    None => log::error!("scheduler already shut down; frame dropped"),
                }
                Ok(None)
            }
        }
    }

    /// Wait for all in-flight draws to finish
    ///
    /// Returns the stats of the last completed frame, if any completed.
    pub fn flush(&mut self) -> Result<Option<DrawStats>, RenderError> {
        match &mut self.inner {
            Inner::Single { .. } => Ok(None),
            Inner::Threaded {
                done_rx,
                spare,
                in_flight,
                ..
            } => {
                let mut last = None;
                while *in_flight > 0 {
                    match done_rx.recv() {
                        Ok((queue, result)) => {
                            *in_flight -= 1;
                            *spare = Some(queue);
                            last = Some(result?);
                        }
                        Err(_) => break,
                    }
                }
                Ok(last)
            }
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Inner::Threaded {
            work_tx, worker, ..
        } = &mut self.inner
        {
            work_tx.take();
            if let Some(worker) = worker.take() {
                if worker.join().is_err() {
                    log::error!("draw thread panicked during shutdown");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::graph::box_drawable;
    use crate::render::{RecordingDevice, ROOT_BIN};
    use std::sync::Arc;

    fn queue_with_one_leaf(queue: &mut RenderQueue) {
        queue.add_leaf(
            ROOT_BIN,
            Arc::new(box_drawable(Vec3::zeros(), 1.0)),
            Mat4::identity(),
            0.0,
        );
    }

    #[test]
    fn test_single_threaded_draws_inline() {
        let (device, log) = RecordingDevice::new();
        let mut scheduler = FrameScheduler::new(
            ThreadingModel::SingleThreaded,
            GraphicsContext::new(Box::new(device)),
        );

        let mut queue = scheduler.acquire_queue().unwrap();
        queue_with_one_leaf(&mut queue);
        let stats = scheduler.dispatch(queue).unwrap().expect("inline stats");
        assert_eq!(stats.leaves, 1);
        assert_eq!(log.lock().unwrap().draws(), 1);
    }

    #[test]
    fn test_threaded_pipeline_draws_every_frame() {
        let (device, log) = RecordingDevice::new();
        let mut scheduler = FrameScheduler::new(
            ThreadingModel::DrawThreaded,
            GraphicsContext::new(Box::new(device)),
        );

        for _ in 0..4 {
            let mut queue = scheduler.acquire_queue().unwrap();
            queue_with_one_leaf(&mut queue);
            scheduler.dispatch(queue).unwrap();
        }
        let last = scheduler.flush().unwrap();
        assert_eq!(last.map(|s| s.leaves), Some(1));
        assert_eq!(log.lock().unwrap().draws(), 4);
    }

    #[test]
    fn test_threaded_draw_error_surfaces_at_barrier() {
        let (mut device, _log) = RecordingDevice::new();
        device.fail_draws_named.push("bad".into());
        let mut scheduler = FrameScheduler::new(
            ThreadingModel::DrawThreaded,
            GraphicsContext::new(Box::new(device)),
        );

        let mut queue = scheduler.acquire_queue().unwrap();
        queue.add_leaf(
            ROOT_BIN,
            Arc::new(box_drawable(Vec3::zeros(), 1.0).named("bad")),
            Mat4::identity(),
            0.0,
        );
        scheduler.dispatch(queue).unwrap();
        assert!(scheduler.flush().is_err());
    }
}
