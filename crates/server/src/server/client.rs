//! Client session state.

use protocol::SessionId;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

/// What happened to a frame handed to [`Client::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full and the frame was a snapshot; the next one replaces it.
    Skipped,
    /// Queue full for a frame that must not be lost.
    Overflow,
    /// The connection's writer is gone.
    Closed,
}

/// A connected client session.
#[derive(Debug)]
pub struct Client {
    /// Unique session ID.
    pub id: SessionId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Encoded frames waiting for the connection's writer.
    pub tx: mpsc::Sender<String>,
    pub connected_at: Instant,
    /// Last inbound frame.
    pub last_activity: Instant,
    /// Inbound frames, valid or not.
    pub frames: u64,
    /// Snapshots skipped because the queue was full.
    pub skipped: u64,
}

impl Client {
    pub fn new(id: SessionId, addr: SocketAddr, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            tx,
            connected_at: now,
            last_activity: now,
            frames: 0,
            skipped: 0,
        }
    }

    /// Update activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.frames += 1;
    }

    /// Queue an encoded frame without waiting. `snapshot` frames may be
    /// skipped when the writer is behind.
    pub fn send(&mut self, frame: String, snapshot: bool) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) if snapshot => {
                self.skipped += 1;
                Delivery::Skipped
            }
            Err(TrySendError::Full(_)) => Delivery::Overflow,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(capacity: usize) -> (Client, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        (Client::new(SessionId(1), addr, tx), rx)
    }

    #[test]
    fn test_full_queue_skips_snapshots_only() {
        let (mut client, mut rx) = client(2);
        assert_eq!(client.send("a".into(), true), Delivery::Queued);
        assert_eq!(client.send("b".into(), false), Delivery::Queued);
        assert_eq!(client.send("c".into(), true), Delivery::Skipped);
        assert_eq!(client.send("d".into(), false), Delivery::Overflow);
        assert_eq!(client.skipped, 1);

        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(client.send("e".into(), false), Delivery::Queued);
    }

    #[test]
    fn test_closed_writer() {
        let (mut client, rx) = client(4);
        drop(rx);
        assert_eq!(client.send("a".into(), false), Delivery::Closed);
    }
}
