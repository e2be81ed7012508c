//! In-memory network for local runs and testing

use super::{async_trait, MpcNetwork, PartnerPayload, RoundOutbox};
use crate::{Error, PartyId, ProtocolId, Result};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// Shared registry of every party's outboxes
pub struct MemoryHub {
    /// (owner, protocol_id) -> outbox
    outboxes: DashMap<(PartyId, ProtocolId), Arc<RoundOutbox>>,
    /// Parties whose outboxes never answer
    silenced: DashSet<PartyId>,
    /// Registration notifications
    notify: broadcast::Sender<()>,
}

impl MemoryHub {
    /// Create a new hub
    pub fn new() -> Arc<Self> {
        let (notify, _) = broadcast::channel(100);
        Arc::new(Self {
            outboxes: DashMap::new(),
            silenced: DashSet::new(),
            notify,
        })
    }

    /// Network handle for one party
    pub fn network(self: &Arc<Self>, party: PartyId) -> MemoryNetwork {
        MemoryNetwork {
            party,
            hub: self.clone(),
        }
    }

    /// Make every request to `party` hang, as if it went offline
    pub fn silence(&self, party: PartyId) {
        self.silenced.insert(party);
    }

    /// Undo [`MemoryHub::silence`]
    pub fn restore(&self, party: &PartyId) {
        self.silenced.remove(party);
    }

    /// Drop the outbox `party` registered for `protocol_id`, along with the
    /// round payloads it still holds. Returns whether one was registered.
    pub fn unregister(&self, party: &PartyId, protocol_id: &str) -> bool {
        self.outboxes
            .remove(&(*party, protocol_id.to_string()))
            .is_some()
    }

    /// Number of outboxes currently registered
    pub fn registered(&self) -> usize {
        self.outboxes.len()
    }

    fn lookup(&self, party: &PartyId, protocol_id: &str) -> Option<Arc<RoundOutbox>> {
        self.outboxes
            .get(&(*party, protocol_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Wait until `party` registered its outbox for `protocol_id`
    async fn outbox(&self, party: &PartyId, protocol_id: &str) -> Arc<RoundOutbox> {
        let mut rx = self.notify.subscribe();

        loop {
            if let Some(outbox) = self.lookup(party, protocol_id) {
                return outbox;
            }

            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
            }
        }
    }
}

/// One party's view of a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryNetwork {
    party: PartyId,
    hub: Arc<MemoryHub>,
}

impl MemoryNetwork {
    pub fn party(&self) -> PartyId {
        self.party
    }
}

#[async_trait]
impl MpcNetwork for MemoryNetwork {
    async fn register(&self, outbox: Arc<RoundOutbox>) -> Result<()> {
        if outbox.owner() != self.party {
            return Err(Error::Network(format!(
                "party {} cannot register an outbox owned by {}",
                self.party,
                outbox.owner()
            )));
        }

        let key = (self.party, outbox.protocol_id().to_string());
        if self.hub.outboxes.contains_key(&key) {
            return Err(Error::Network(format!(
                "party {} already runs {}",
                key.0, key.1
            )));
        }
        self.hub.outboxes.insert(key, outbox);

        let _ = self.hub.notify.send(());
        Ok(())
    }

    async fn ask_round_data(
        &self,
        from: &PartyId,
        protocol_id: &str,
        round: usize,
    ) -> Result<PartnerPayload> {
        trace!(party_id = %self.party, from = %from, round, "Asking for round data");
        if self.hub.silenced.contains(from) {
            return std::future::pending().await;
        }

        let outbox = self.hub.outbox(from, protocol_id).await;
        outbox.partner_round_data(round, &self.party).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::RoundOutput;
    use crate::MpcConfig;
    use serde_json::json;

    fn outbox(party: u64, protocol_id: &str) -> Arc<RoundOutbox> {
        let config = MpcConfig::new(
            protocol_id,
            PartyId::new(party).unwrap(),
            PartyId::range(2),
            2,
        )
        .unwrap();
        Arc::new(RoundOutbox::new(&config))
    }

    #[tokio::test]
    async fn test_ask_waits_for_registration() {
        let hub = MemoryHub::new();
        let one = PartyId::new(1).unwrap();
        let two = PartyId::new(2).unwrap();

        let asker = {
            let network = hub.network(one);
            tokio::spawn(async move { network.ask_round_data(&two, "proto", 0).await })
        };

        let outbox = outbox(2, "proto");
        outbox.publish(
            0,
            RoundOutput::broadcast(&json!("hi"))
                .unwrap()
                .with_send(one, &json!(1))
                .unwrap(),
        );
        hub.network(two).register(outbox).await.unwrap();

        let payload = asker.await.unwrap().unwrap();
        assert_eq!(payload.broadcast, json!("hi"));
        assert_eq!(payload.send, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_foreign_outboxes() {
        let hub = MemoryHub::new();
        let network = hub.network(PartyId::new(1).unwrap());

        network.register(outbox(1, "proto")).await.unwrap();
        assert!(network.register(outbox(1, "proto")).await.is_err());
        assert!(network.register(outbox(2, "other")).await.is_err());
        network.register(outbox(1, "other")).await.unwrap();
    }

    #[tokio::test]
    async fn test_silenced_party_never_answers() {
        let hub = MemoryHub::new();
        let one = PartyId::new(1).unwrap();
        let two = PartyId::new(2).unwrap();

        let outbox = outbox(2, "proto");
        outbox.publish(0, RoundOutput::broadcast(&json!(0)).unwrap());
        hub.network(two).register(outbox).await.unwrap();
        hub.silence(two);

        let network = hub.network(one);
        let ask = network.ask_round_data(&two, "proto", 0);
        assert!(tokio::time::timeout(Duration::from_millis(50), ask)
            .await
            .is_err());

        hub.restore(&two);
        assert!(network.ask_round_data(&two, "proto", 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregister_drops_outbox() {
        let hub = MemoryHub::new();
        let one = PartyId::new(1).unwrap();
        let two = PartyId::new(2).unwrap();

        let published = outbox(2, "proto");
        published.publish(0, RoundOutput::broadcast(&json!(0)).unwrap());
        hub.network(two).register(published).await.unwrap();

        assert_eq!(hub.registered(), 1);
        assert!(hub.unregister(&two, "proto"));
        assert!(!hub.unregister(&two, "proto"));
        assert_eq!(hub.registered(), 0);

        let network = hub.network(one);
        let ask = network.ask_round_data(&two, "proto", 0);
        assert!(tokio::time::timeout(Duration::from_millis(50), ask)
            .await
            .is_err());

        // the same run id can be registered again
        hub.network(two).register(outbox(2, "proto")).await.unwrap();
    }
}
