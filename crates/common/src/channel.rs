//! Bounded frame channel between the read-loop thread and the caller
//!
//! The read loop runs on a dedicated blocking thread and pushes each completed
//! frame with `send_blocking`. A full queue stalls the loop before it issues the
//! next bulk transfer, so a slow consumer applies backpressure all the way down to
//! the device. The receiving side can be awaited from Tokio or polled blocking.

use async_channel::{Receiver, Sender, WeakSender, bounded};

/// Default number of frames buffered between the read loop and the consumer
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 64;

/// Handle for the read-loop thread (blocking)
#[derive(Debug)]
pub struct FrameSender {
    tx: Sender<String>,
}

impl FrameSender {
    /// Send a frame, waiting for room in the queue
    pub fn send_blocking(&self, frame: String) -> crate::Result<()> {
        self.tx
            .send_blocking(frame)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle that can close the channel without keeping it open
    pub fn closer(&self) -> FrameCloser {
        FrameCloser {
            tx: self.tx.downgrade(),
        }
    }
}

/// Closes the frame channel from outside the read loop
///
/// A sender parked in [`FrameSender::send_blocking`] on a full queue wakes up with
/// an error. Frames already queued stay available to the receiver.
#[derive(Debug, Clone)]
pub struct FrameCloser {
    tx: WeakSender<String>,
}

impl FrameCloser {
    /// Close the channel; returns false if it was already closed
    pub fn close(&self) -> bool {
        self.tx.upgrade().is_some_and(|tx| tx.close())
    }
}

/// Handle for the consumer (async or blocking)
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    rx: Receiver<String>,
}

impl FrameReceiver {
    /// Receive the next frame
    ///
    /// Fails with [`crate::Error::Channel`] once the read loop has ended and every
    /// buffered frame has been taken.
    pub async fn recv(&self) -> crate::Result<String> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next frame, blocking the current thread
    pub fn recv_blocking(&self) -> crate::Result<String> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a frame without blocking
    pub fn try_recv(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Number of frames waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether the read loop has ended (frames may still be buffered)
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

/// Create the frame channel
///
/// Returns (FrameSender for the read loop, FrameReceiver for the consumer)
pub fn create_frame_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (FrameSender { tx }, FrameReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (tx, rx) = create_frame_channel(4);

        let handle = std::thread::spawn(move || {
            for frame in ["ATZ", "ELM327 v1.5", ">"] {
                tx.send_blocking(frame.to_string()).unwrap();
            }
        });

        assert_eq!(rx.recv().await.unwrap(), "ATZ");
        assert_eq!(rx.recv().await.unwrap(), "ELM327 v1.5");
        assert_eq!(rx.recv().await.unwrap(), ">");
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_recv_fails_after_sender_dropped() {
        let (tx, rx) = create_frame_channel(4);
        tx.send_blocking("OK".to_string()).unwrap();
        drop(tx);

        // Buffered frames are still delivered
        assert_eq!(rx.recv().await.unwrap(), "OK");
        assert!(matches!(rx.recv().await, Err(crate::Error::Channel(_))));
        assert!(rx.is_closed());
    }

    #[test]
    fn test_closer_wakes_blocked_sender() {
        let (tx, rx) = create_frame_channel(1);
        let closer = tx.closer();
        tx.send_blocking("A".to_string()).unwrap();

        let sender = std::thread::spawn(move || tx.send_blocking("B".to_string()));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(closer.close());

        assert!(sender.join().unwrap().is_err());
        assert_eq!(rx.recv_blocking().unwrap(), "A");
        assert!(rx.recv_blocking().is_err());
        assert!(!closer.close());
    }

    #[test]
    fn test_closer_does_not_keep_channel_open() {
        let (tx, rx) = create_frame_channel(1);
        let _closer = tx.closer();
        drop(tx);
        assert!(rx.recv_blocking().is_err());
    }

    #[test]
    fn test_send_fails_when_receiver_dropped() {
        let (tx, rx) = create_frame_channel(1);
        drop(rx);
        assert!(tx.is_closed());
        assert!(tx.send_blocking("lost".to_string()).is_err());
    }

    #[test]
    fn test_capacity_applies_backpressure() {
        let (tx, rx) = create_frame_channel(1);
        tx.send_blocking("first".to_string()).unwrap();
        assert_eq!(rx.len(), 1);

        let sender = std::thread::spawn(move || tx.send_blocking("second".to_string()));
        std::thread::sleep(std::time::Duration::from_millis(50));
        // Second send is parked until the first frame is taken
        assert_eq!(rx.len(), 1);

        assert_eq!(rx.recv_blocking().unwrap(), "first");
        sender.join().unwrap().unwrap();
        assert_eq!(rx.recv_blocking().unwrap(), "second");
    }
}
