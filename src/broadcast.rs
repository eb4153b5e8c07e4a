use crate::protocol::ServerMessage;
use crate::types::PartyId;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 100;

/// Party-scoped fan-out: one broadcast channel per party. Connections
/// subscribe when they bind to a party; mutating handlers publish after
/// the store transaction commits.
pub struct Broadcaster {
    channels: RwLock<HashMap<PartyId, broadcast::Sender<ServerMessage>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, party_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut channels = self.channels.write().await;
        channels
            .entry(party_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send to every connection in the party. A party with no listeners
    /// is not an error.
    pub async fn publish(&self, party_id: &str, msg: ServerMessage) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(party_id) {
            let _ = tx.send(msg);
        }
    }

    /// Drop the channel when the party is garbage collected.
    pub async fn remove(&self, party_id: &str) {
        self.channels.write().await.remove(party_id);
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_party_messages() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe("party-1").await;

        broadcaster
            .publish("party-1", ServerMessage::AllAnswered)
            .await;

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::AllAnswered));
    }

    #[tokio::test]
    async fn parties_are_isolated() {
        let broadcaster = Broadcaster::new();
        let mut rx_a = broadcaster.subscribe("party-a").await;
        let _rx_b = broadcaster.subscribe("party-b").await;

        broadcaster
            .publish("party-b", ServerMessage::AllVoted)
            .await;
        broadcaster
            .publish("party-a", ServerMessage::AllAnswered)
            .await;

        // party-a only sees its own message.
        let msg = rx_a.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::AllAnswered));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_listeners_is_a_no_op() {
        let broadcaster = Broadcaster::new();
        broadcaster
            .publish("nobody-home", ServerMessage::AllVoted)
            .await;
    }
}
