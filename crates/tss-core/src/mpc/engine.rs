//! Round engine driving a [`RoundProtocol`] over an [`MpcNetwork`]

use super::{
    Exclusion, ExclusionReason, MpcNetwork, PartnerPayload, RoundOutbox, RoundProtocol,
};
use crate::{Error, MpcConfig, PartyId, Result};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Default per-round deadline
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(20);

/// Validated payloads received so far, per round and sender
#[derive(Debug)]
pub struct RoundMessages<M> {
    rounds: Vec<BTreeMap<PartyId, M>>,
}

impl<M> RoundMessages<M> {
    fn new(rounds: usize) -> Self {
        Self {
            rounds: (0..rounds).map(|_| BTreeMap::new()).collect(),
        }
    }

    fn insert(&mut self, round: usize, from: PartyId, message: M) {
        if let Some(messages) = self.rounds.get_mut(round) {
            messages.insert(from, message);
        }
    }

    /// Payload `from` sent in `round`
    pub fn get(&self, round: usize, from: &PartyId) -> Option<&M> {
        self.rounds.get(round).and_then(|messages| messages.get(from))
    }

    /// Everything received in `round`, ordered by sender
    pub fn round(&self, round: usize) -> impl Iterator<Item = (&PartyId, &M)> {
        self.rounds.get(round).into_iter().flatten()
    }
}

/// One party's instance of a protocol run
pub struct Mpc<P: RoundProtocol> {
    protocol: P,
    outbox: Arc<RoundOutbox>,
    qualified: Vec<PartyId>,
    received: RoundMessages<P::Message>,
    excluded: Vec<Exclusion>,
    current_round: usize,
}

impl<P: RoundProtocol> Mpc<P> {
    pub fn new(protocol: P) -> Self {
        let config = protocol.config();
        let outbox = Arc::new(RoundOutbox::new(config));
        let qualified = config.partners.clone();
        let received = RoundMessages::new(protocol.rounds().len());
        Self {
            protocol,
            outbox,
            qualified,
            received,
            excluded: Vec::new(),
            current_round: 0,
        }
    }

    pub fn config(&self) -> &MpcConfig {
        self.protocol.config()
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Partners still taking part
    pub fn qualified(&self) -> &[PartyId] {
        &self.qualified
    }

    /// Partners dropped so far, in the order they were dropped
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    pub fn received(&self) -> &RoundMessages<P::Message> {
        &self.received
    }

    /// Name of the round being run, `None` once all rounds are done
    pub fn current_round(&self) -> Option<&'static str> {
        self.protocol.rounds().get(self.current_round).copied()
    }

    pub fn outbox(&self) -> Arc<RoundOutbox> {
        self.outbox.clone()
    }

    /// What this party published for `partner` in `round`, if published yet
    pub fn get_partner_round_data(
        &self,
        round: usize,
        partner: &PartyId,
    ) -> Result<Option<PartnerPayload>> {
        self.outbox.try_partner_round_data(round, partner)
    }

    /// Run every round, then complete.
    ///
    /// Each round waits at most `timeout` for partners' payloads. Partners
    /// that do not answer in time or send invalid payloads are dropped;
    /// completion fails if fewer than `threshold` partners remain.
    #[instrument(skip_all, fields(
        protocol_id = %self.protocol.config().protocol_id,
        party_id = %self.protocol.config().party_id,
    ))]
    pub async fn run_by_network<N>(&mut self, network: &N, timeout: Duration) -> Result<P::Output>
    where
        N: MpcNetwork + ?Sized,
    {
        let rounds = self.protocol.rounds();
        let party_id = self.protocol.config().party_id;
        let protocol_id = self.protocol.config().protocol_id.clone();

        info!(partners = self.qualified.len(), "Starting protocol run");
        network.register(self.outbox.clone()).await?;

        for (round, name) in rounds.iter().enumerate() {
            self.current_round = round;
            debug!(round = name, qualified = ?self.qualified, "Running round");

            let output = self
                .protocol
                .run_round(round, &self.received, &self.qualified)?;
            for (party, reason) in &output.excluded {
                self.exclude(*party, name, ExclusionReason::Malicious(reason.clone()))?;
            }
            self.outbox.publish(round, output);

            let replies = collect_round(
                network,
                &self.outbox,
                &self.qualified,
                party_id,
                &protocol_id,
                round,
                timeout,
            )
            .await;
            self.accept(round, name, replies)?;
        }
        self.current_round = rounds.len();

        let last = rounds.last().copied().unwrap_or_default();
        for (party, reason) in self.protocol.reported(&self.received, &self.qualified) {
            self.exclude(party, last, ExclusionReason::Malicious(reason))?;
        }

        let required = self.protocol.config().threshold;
        if self.qualified.len() < required {
            warn!(
                required,
                qualified = self.qualified.len(),
                "Too few partners left to complete"
            );
            return Err(Error::InsufficientPartners {
                required,
                actual: self.qualified.len(),
                excluded: self.excluded.clone(),
            });
        }

        let output = self.protocol.on_complete(&self.received, &self.qualified)?;
        info!(qualified = ?self.qualified, "Protocol run completed");
        Ok(output)
    }

    /// Drop `party` from the qualified set. Fails the run when the party
    /// being dropped is this one.
    fn exclude(&mut self, party: PartyId, round: &str, reason: ExclusionReason) -> Result<()> {
        if !self.qualified.contains(&party) {
            return Ok(());
        }
        if party == self.protocol.config().party_id {
            warn!(round, %reason, "This party was excluded");
            return Err(Error::SelfExcluded {
                round: round.to_string(),
                reason: reason.to_string(),
            });
        }
        warn!(partner = %party, round, %reason, "Excluding partner");
        self.qualified.retain(|p| *p != party);
        self.excluded.push(Exclusion {
            party,
            round: round.to_string(),
            reason,
        });
        Ok(())
    }

    fn accept(
        &mut self,
        round: usize,
        name: &str,
        replies: Vec<(PartyId, Option<Result<PartnerPayload>>)>,
    ) -> Result<()> {
        for (partner, reply) in replies {
            let reason = match reply {
                None => ExclusionReason::NoResponse,
                Some(Err(e)) => ExclusionReason::Unreachable(e.to_string()),
                Some(Ok(payload)) => match self.protocol.validate(round, &partner, payload) {
                    Ok(message) => {
                        self.received.insert(round, partner, message);
                        continue;
                    }
                    Err(e) => ExclusionReason::InvalidPayload(e.to_string()),
                },
            };
            self.exclude(partner, name, reason)?;
        }
        Ok(())
    }
}

/// Ask every qualified partner for its `round` payload concurrently.
///
/// `None` marks a partner that missed the deadline. This party's own
/// payload is read straight from its outbox.
async fn collect_round<N>(
    network: &N,
    outbox: &RoundOutbox,
    qualified: &[PartyId],
    party_id: PartyId,
    protocol_id: &str,
    round: usize,
    timeout: Duration,
) -> Vec<(PartyId, Option<Result<PartnerPayload>>)>
where
    N: MpcNetwork + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let asks = qualified.iter().map(|partner| {
        let partner = *partner;
        async move {
            if partner == party_id {
                let own = outbox.try_partner_round_data(round, &partner).and_then(|payload| {
                    payload.ok_or_else(|| Error::Internal("own round output missing".into()))
                });
                return (partner, Some(own));
            }
            let reply = timeout_at(deadline, network.ask_round_data(&partner, protocol_id, round))
                .await
                .ok();
            (partner, reply)
        }
    });
    join_all(asks).await
}
