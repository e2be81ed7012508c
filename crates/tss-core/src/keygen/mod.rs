//! Distributed Key Generation (DKG) module
//!
//! Implements three-round Feldman-VSS key generation with proofs of
//! possession, and key redistribution built on top of it.

mod dkg;
mod messages;
mod redistribution;

pub use dkg::{
    run_dkg, Completion, CompletionInput, Contribution, DistributedKeyGeneration, KeyGeneration,
    NewKey, DKG_ROUNDS,
};
pub use messages::*;
pub use redistribution::{run_key_redistribution, KeyRedistribution, Redistribute};

#[cfg(test)]
pub(crate) mod testing {
    use crate::mpc::{Exclusion, MemoryHub, Mpc, RoundProtocol};
    use crate::types::new_protocol_id;
    use crate::{MpcConfig, PartyId, Result};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    pub fn ids(raw: &[u64]) -> Vec<PartyId> {
        raw.iter().map(|i| PartyId::new(*i).unwrap()).collect()
    }

    /// Run one protocol instance per partner over `hub` and collect each
    /// party's exclusions and result
    pub async fn run_parties<P, F>(
        hub: &Arc<MemoryHub>,
        partners: &[PartyId],
        threshold: usize,
        timeout: Duration,
        make: F,
    ) -> BTreeMap<PartyId, (Vec<Exclusion>, Result<P::Output>)>
    where
        P: RoundProtocol + 'static,
        P::Message: 'static,
        P::Output: 'static,
        F: Fn(MpcConfig) -> P,
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let protocol_id = new_protocol_id("test");
        let mut handles = Vec::new();
        for id in partners {
            let config = MpcConfig::new(&protocol_id, *id, partners.to_vec(), threshold).unwrap();
            let mut mpc = Mpc::new(make(config));
            let network = hub.network(*id);
            let id = *id;
            handles.push(tokio::spawn(async move {
                let result = mpc.run_by_network(&network, timeout).await;
                (id, (mpc.excluded().to_vec(), result))
            }));
        }

        let mut results = BTreeMap::new();
        for handle in handles {
            let (id, outcome) = handle.await.unwrap();
            results.insert(id, outcome);
        }
        results
    }
}
