//! MPC coordination utilities
//!
//! A protocol is a fixed sequence of named rounds. Each round produces
//! per-partner private payloads plus one broadcast, which the party keeps in
//! its [`RoundOutbox`]. Partners pull what they need through an
//! [`MpcNetwork`]; the [`Mpc`] engine drives the rounds, validates what it
//! pulls and drops partners that stay silent or misbehave.

mod engine;
pub mod memory;
mod outbox;

pub use engine::{Mpc, RoundMessages, DEFAULT_ROUND_TIMEOUT};
pub use memory::{MemoryHub, MemoryNetwork};
pub use outbox::RoundOutbox;

use crate::{Error, PartyId, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use ::async_trait::async_trait;

/// What one party publishes for one partner in one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartnerPayload {
    /// Private payload addressed to this partner, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<Value>,
    /// Payload shared with every partner
    pub broadcast: Value,
}

impl PartnerPayload {
    /// Decode the broadcast part
    pub fn broadcast_as<T: DeserializeOwned>(&self) -> Result<T> {
        decode_payload(self.broadcast.clone())
    }

    /// Decode the private part, failing if there is none
    pub fn send_as<T: DeserializeOwned>(&self) -> Result<T> {
        let send = self
            .send
            .clone()
            .ok_or_else(|| Error::InvalidPayload("missing private payload".into()))?;
        decode_payload(send)
    }
}

fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::InvalidPayload(e.to_string()))
}

/// Result of running one round locally
#[derive(Debug, Clone, Default)]
pub struct RoundOutput {
    /// Private payloads keyed by recipient
    pub send: BTreeMap<PartyId, Value>,
    /// Payload for every partner
    pub broadcast: Value,
    /// Partners this round found misbehaving, with the reason
    pub excluded: Vec<(PartyId, String)>,
}

impl RoundOutput {
    /// Output carrying only a broadcast
    pub fn broadcast<B: Serialize>(broadcast: &B) -> Result<Self> {
        Ok(Self {
            broadcast: serde_json::to_value(broadcast)?,
            ..Default::default()
        })
    }

    /// Add a private payload for `to`
    pub fn with_send<S: Serialize>(mut self, to: PartyId, send: &S) -> Result<Self> {
        self.send.insert(to, serde_json::to_value(send)?);
        Ok(self)
    }

    /// Mark a partner as misbehaving
    pub fn exclude(mut self, party: PartyId, reason: impl Into<String>) -> Self {
        self.excluded.push((party, reason.into()));
        self
    }

    /// View of this output as seen by `partner`
    pub fn for_partner(&self, partner: &PartyId) -> PartnerPayload {
        PartnerPayload {
            send: self.send.get(partner).cloned(),
            broadcast: self.broadcast.clone(),
        }
    }
}

/// Why a partner was dropped from the qualified set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Did not answer before the round deadline
    NoResponse,
    /// The network failed to deliver its answer
    Unreachable(String),
    /// Answered with a payload that failed validation
    InvalidPayload(String),
    /// Protocol logic detected cheating
    Malicious(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NoResponse => write!(f, "no response"),
            ExclusionReason::Unreachable(e) => write!(f, "unreachable: {}", e),
            ExclusionReason::InvalidPayload(e) => write!(f, "invalid payload: {}", e),
            ExclusionReason::Malicious(e) => write!(f, "malicious: {}", e),
        }
    }
}

/// Record of a partner dropped during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub party: PartyId,
    /// Name of the round in which it was dropped
    pub round: String,
    pub reason: ExclusionReason,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party {} in {}: {}", self.party, self.round, self.reason)
    }
}

/// A multi-round protocol run by one party
pub trait RoundProtocol: Send {
    /// Validated payload received from one partner in one round
    type Message: Send;
    /// Final result
    type Output: Send;

    /// Identity of this run and of this party
    fn config(&self) -> &crate::MpcConfig;

    /// Round names, in execution order
    fn rounds(&self) -> &'static [&'static str];

    /// Compute this party's output for `round` from everything received in
    /// earlier rounds, restricted to the still-qualified partners.
    fn run_round(
        &mut self,
        round: usize,
        received: &RoundMessages<Self::Message>,
        qualified: &[PartyId],
    ) -> Result<RoundOutput>;

    /// Check the payload `from` published for this party in `round`.
    /// A failure drops `from` from the qualified set.
    fn validate(&self, round: usize, from: &PartyId, payload: PartnerPayload)
        -> Result<Self::Message>;

    /// Partners to drop after the last round because a qualified partner
    /// reported them, with the reason
    fn reported(
        &self,
        _received: &RoundMessages<Self::Message>,
        _qualified: &[PartyId],
    ) -> Vec<(PartyId, String)> {
        Vec::new()
    }

    /// Produce the final output once every round completed
    fn on_complete(
        &mut self,
        received: &RoundMessages<Self::Message>,
        qualified: &[PartyId],
    ) -> Result<Self::Output>;
}

/// Pull-based transport between parties
#[async_trait]
pub trait MpcNetwork: Send + Sync {
    /// Make this party's outbox reachable by its partners
    async fn register(&self, outbox: Arc<RoundOutbox>) -> Result<()>;

    /// Ask `from` for what it published for us in `round` of `protocol_id`.
    ///
    /// May wait until `from` has run that round; callers bound the wait.
    async fn ask_round_data(
        &self,
        from: &PartyId,
        protocol_id: &str,
        round: usize,
    ) -> Result<PartnerPayload>;
}
