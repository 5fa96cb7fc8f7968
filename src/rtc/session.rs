// RTC session tracking

use std::collections::HashMap;

use tokio::sync::{
    mpsc::{Receiver, Sender},
    Mutex,
};

use super::RtcFrame;

/// Tracks active RTC bridge sessions by id
///
/// The external WebRTC transport delivers publisher media by looking up
/// the frame sender of the session it negotiated, and claims the frame
/// receiver of a play session to consume subscriber media.
pub struct RtcSessionManager {
    sessions: Mutex<HashMap<u64, Sender<RtcFrame>>>,
    play_outputs: Mutex<HashMap<u64, Receiver<RtcFrame>>>,
}

impl RtcSessionManager {
    /// Creates an empty manager
    pub fn new() -> RtcSessionManager {
        RtcSessionManager {
            sessions: Mutex::new(HashMap::new()),
            play_outputs: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a publish session's frame sender
    pub async fn register(&self, session_id: u64, sender: Sender<RtcFrame>) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id, sender);
    }

    /// Removes a session
    pub async fn unregister(&self, session_id: u64) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&session_id);
        drop(sessions);

        let mut play_outputs = self.play_outputs.lock().await;
        play_outputs.remove(&session_id);
    }

    /// Registers a play session's frame output
    pub async fn register_play(&self, session_id: u64, receiver: Receiver<RtcFrame>) {
        let mut play_outputs = self.play_outputs.lock().await;
        play_outputs.insert(session_id, receiver);
    }

    /// Claims the frame output of a play session
    ///
    /// The transport calls this once after negotiation to start
    /// consuming frames.
    pub async fn claim_play(&self, session_id: u64) -> Option<Receiver<RtcFrame>> {
        let mut play_outputs = self.play_outputs.lock().await;
        play_outputs.remove(&session_id)
    }

    /// Gets the frame sender of a session
    pub async fn frame_sender(&self, session_id: u64) -> Option<Sender<RtcFrame>> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).cloned()
    }

    /// Number of active sessions
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }
}

impl Default for RtcSessionManager {
    fn default() -> Self {
        RtcSessionManager::new()
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc::channel;

    #[tokio::test]
    async fn test_register_and_deliver() {
        let manager = RtcSessionManager::new();

        let (tx, mut rx) = channel(4);
        manager.register(1, tx).await;
        assert_eq!(manager.session_count().await, 1);

        let sender = manager.frame_sender(1).await.unwrap();
        sender
            .send(RtcFrame::video(100, false, Bytes::from_static(&[0, 0, 1, 0x41])))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.ntp_time_ms, 100);

        manager.unregister(1).await;
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.frame_sender(1).await.is_none());
    }

    #[tokio::test]
    async fn test_play_output_claimed_once() {
        let manager = RtcSessionManager::new();

        let (_tx, rx) = channel(4);
        manager.register_play(2, rx).await;

        assert!(manager.claim_play(2).await.is_some());
        assert!(manager.claim_play(2).await.is_none());
    }
}
