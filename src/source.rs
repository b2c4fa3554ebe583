use log::warn;
use tokio::sync::mpsc;

use crate::{
    frame::{Frame, FrameType},
    Error,
};

/// Receives frames from a device as they are decoded.
pub trait FrameListener: Send {
    /// Returns false once the listener no longer accepts frames.
    fn on_new_frame(&mut self, frame_type: FrameType, frame: Frame) -> bool;
}

impl<F> FrameListener for F
where
    F: FnMut(FrameType, Frame) -> bool + Send,
{
    fn on_new_frame(&mut self, frame_type: FrameType, frame: Frame) -> bool {
        self(frame_type, frame)
    }
}

/// Bounded queue between the thread producing frames and their consumer.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameQueue) {
    let (sender, receiver) = mpsc::channel(capacity);

    (FrameSender { sender }, FrameQueue { receiver })
}

/// Producer side of [`frame_queue`], blocks the calling thread while the queue is full.
/// Must not be used from within an async context.
#[derive(Clone)]
pub struct FrameSender {
    sender: mpsc::Sender<(FrameType, Frame)>,
}

impl FrameListener for FrameSender {
    fn on_new_frame(&mut self, frame_type: FrameType, frame: Frame) -> bool {
        match self.sender.blocking_send((frame_type, frame)) {
            Ok(()) => true,
            Err(_) => {
                warn!("Dropping {frame_type:?} frame, the queue is closed");
                false
            }
        }
    }
}

pub struct FrameQueue {
    receiver: mpsc::Receiver<(FrameType, Frame)>,
}

impl FrameQueue {
    /// Next frame, `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<(FrameType, Frame)> {
        self.receiver.recv().await
    }

    /// Wait until both a color and a depth frame arrived, returns the latest of each.
    pub async fn next_pair(&mut self) -> Result<(Frame, Frame), Error> {
        let mut color = None;
        let mut depth = None;

        loop {
            let (frame_type, frame) = self.recv().await.ok_or(Error::Disconnected)?;

            match frame_type {
                FrameType::Color => color = Some(frame),
                FrameType::Depth => depth = Some(frame),
                FrameType::Ir => {}
            }

            match (color, depth) {
                (Some(color), Some(depth)) => return Ok((color, depth)),
                (c, d) => {
                    color = c;
                    depth = d;
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}
