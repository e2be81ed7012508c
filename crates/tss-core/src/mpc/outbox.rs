//! Per-party store of published round outputs

use super::{PartnerPayload, RoundOutput};
use crate::{Error, MpcConfig, PartyId, ProtocolId, Result};
use dashmap::DashMap;
use tokio::sync::watch;

/// Round outputs one party has published in one protocol run.
///
/// Partners read from it through the network; reads for a round that has
/// not been published yet wait until it is.
#[derive(Debug)]
pub struct RoundOutbox {
    protocol_id: ProtocolId,
    owner: PartyId,
    partners: Vec<PartyId>,
    rounds: DashMap<usize, RoundOutput>,
    /// Number of rounds published so far
    published: watch::Sender<usize>,
}

impl RoundOutbox {
    pub fn new(config: &MpcConfig) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            protocol_id: config.protocol_id.clone(),
            owner: config.party_id,
            partners: config.partners.clone(),
            rounds: DashMap::new(),
            published,
        }
    }

    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    pub fn owner(&self) -> PartyId {
        self.owner
    }

    /// Number of rounds published so far
    pub fn published_rounds(&self) -> usize {
        *self.published.borrow()
    }

    pub(crate) fn publish(&self, round: usize, output: RoundOutput) {
        self.rounds.insert(round, output);
        self.published.send_replace(round + 1);
    }

    /// What was published for `partner` in `round`, if that round is done
    pub fn try_partner_round_data(
        &self,
        round: usize,
        partner: &PartyId,
    ) -> Result<Option<PartnerPayload>> {
        if !self.partners.contains(partner) {
            return Err(Error::Network(format!(
                "party {} is not a partner of {} in {}",
                partner, self.owner, self.protocol_id
            )));
        }
        Ok(self
            .rounds
            .get(&round)
            .map(|output| output.for_partner(partner)))
    }

    /// What was published for `partner` in `round`, waiting for the round
    /// to be published if needed
    pub async fn partner_round_data(
        &self,
        round: usize,
        partner: &PartyId,
    ) -> Result<PartnerPayload> {
        let mut rx = self.published.subscribe();
        rx.wait_for(|published| *published > round)
            .await
            .map_err(|_| Error::Network("outbox closed".into()))?;

        self.try_partner_round_data(round, partner)?.ok_or_else(|| {
            Error::Internal(format!("round {} marked published but missing", round))
        })
    }
}
