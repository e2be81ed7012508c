//! DKG protocol implementation

use super::messages::{
    pop_message, CommitmentHash, DkgMessage, ProofOfPossession, Round1Broadcast,
    Round2Broadcast, Round2Send, Round3Broadcast,
};
use crate::math::{
    calc_poly_point, key_to_public, point_add, random_scalar, CurveContext, Polynomial,
};
use crate::mpc::{Mpc, MpcNetwork, PartnerPayload, RoundMessages, RoundOutput, RoundProtocol};
use crate::sign::{schnorr_sign, schnorr_verify};
use crate::types::PolynomialInfo;
use crate::{DistKey, Error, MpcConfig, PartyId, Result};
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Round names of the key generation protocol
pub const DKG_ROUNDS: &[&str] = &["round1", "round2", "round3"];

/// What one qualified partner contributed to the joint key
#[derive(Debug, Clone)]
pub struct Contribution<'a> {
    pub from: PartyId,
    /// The partner's round 1 commitments
    pub commitments: &'a [ProjectivePoint],
    /// The partner's polynomial evaluated at this party
    pub share: Scalar,
}

/// Everything key completion needs
#[derive(Debug, Clone)]
pub struct CompletionInput<'a> {
    pub index: PartyId,
    pub threshold: usize,
    pub qualified: &'a [PartyId],
    /// One entry per qualified partner, in qualified order
    pub contributions: Vec<Contribution<'a>>,
}

/// How the qualified contributions combine into this party's key
pub trait Completion: Send + Sync {
    /// Extra round 3 check on a partner's commitments; an error message
    /// marks the partner malicious
    fn check_commitments(
        &self,
        _from: &PartyId,
        _commitments: &[ProjectivePoint],
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    fn complete(&self, input: CompletionInput<'_>) -> Result<DistKey>;
}

/// Completion for a brand new key: contributions are averaged
#[derive(Debug, Clone, Copy, Default)]
pub struct NewKey;

impl Completion for NewKey {
    fn complete(&self, input: CompletionInput<'_>) -> Result<DistKey> {
        let count = input.contributions.len();
        if count < input.threshold {
            return Err(Error::InsufficientPartners {
                required: input.threshold,
                actual: count,
                excluded: Vec::new(),
            });
        }
        let inverse = Option::<Scalar>::from(Scalar::from(count as u64).invert())
            .ok_or_else(|| Error::Internal("no contributions to combine".into()))?;

        let share = input
            .contributions
            .iter()
            .fold(Scalar::ZERO, |acc, c| acc + c.share)
            * inverse;

        let mut fx = Vec::with_capacity(input.threshold);
        for i in 0..input.threshold {
            let sum = input
                .contributions
                .iter()
                .fold(None, |acc: Option<ProjectivePoint>, c| {
                    point_add(acc.as_ref(), c.commitments.get(i))
                })
                .ok_or_else(|| Error::Internal(format!("no commitments for coefficient {}", i)))?;
            fx.push(sum * inverse);
        }

        let public_key = fx
            .first()
            .copied()
            .ok_or_else(|| Error::Internal("empty commitment vector".into()))?;
        Ok(DistKey::new(
            input.index,
            share,
            public_key,
            input.qualified.to_vec(),
            PolynomialInfo {
                t: input.threshold,
                fx,
            },
        ))
    }
}

/// Three round Feldman-VSS key generation with proofs of possession.
///
/// 1. Commit to a random polynomial and prove knowledge of its secret.
/// 2. Check the proofs, send every partner its share privately and broadcast
///    a hash of every commitment vector received.
/// 3. Flag partners whose commitments were seen differently by others or
///    whose share does not match their commitments.
///
/// The qualified contributions are then combined by the [`Completion`].
pub struct KeyGeneration<C: Completion = NewKey> {
    config: MpcConfig,
    curve: CurveContext,
    value: Option<Scalar>,
    completion: C,
    fx: Option<Polynomial>,
    malicious: BTreeMap<PartyId, String>,
}

/// Key generation producing a fresh joint key
pub type DistributedKeyGeneration = KeyGeneration<NewKey>;

impl KeyGeneration<NewKey> {
    /// `value` fixes this party's secret contribution, random if `None`
    pub fn new(config: MpcConfig, value: Option<Scalar>) -> Result<Self> {
        Self::with_completion(config, value, NewKey)
    }
}

impl<C: Completion> KeyGeneration<C> {
    /// A fixed `value` must be nonzero
    pub fn with_completion(
        config: MpcConfig,
        value: Option<Scalar>,
        completion: C,
    ) -> Result<Self> {
        if value == Some(Scalar::ZERO) {
            return Err(Error::InvalidConfig(
                "Secret contribution cannot be zero".into(),
            ));
        }
        Ok(Self {
            config,
            curve: CurveContext::secp256k1(),
            value,
            completion,
            fx: None,
            malicious: BTreeMap::new(),
        })
    }

    /// Partners this party found cheating, with the reason
    pub fn malicious(&self) -> &BTreeMap<PartyId, String> {
        &self.malicious
    }

    fn round1(&mut self) -> Result<RoundOutput> {
        debug!("DKG Round 1: Commitment");
        let mut rng = OsRng;

        let fx = Polynomial::new(self.config.threshold, &self.curve, self.value, &mut rng)?;
        let commitments = fx.commitments().to_vec();
        let fx0 = commitments[0];

        let nonce = random_scalar(&mut rng);
        let nonce_point = key_to_public(&self.curve, &nonce);
        let message = pop_message(
            &self.config.party_id,
            &self.config.protocol_id,
            &fx0,
            &nonce_point,
        );
        let signature = schnorr_sign(fx.secret(), &nonce, &nonce_point, &fx0, &message);
        self.fx = Some(fx);

        RoundOutput::broadcast(&Round1Broadcast {
            fx: commitments,
            sig: ProofOfPossession {
                nonce: nonce_point,
                signature,
            },
        })
    }

    fn round2(
        &mut self,
        received: &RoundMessages<DkgMessage>,
        qualified: &[PartyId],
    ) -> Result<RoundOutput> {
        debug!("DKG Round 2: Secret sharing");

        let mut hashes = BTreeMap::new();
        let mut forged = Vec::new();
        for partner in qualified {
            let r1 = round1_of(received, partner)?;
            let fx0 = r1.fx[0];
            let message = pop_message(partner, &self.config.protocol_id, &fx0, &r1.sig.nonce);
            if !schnorr_verify(&self.curve, &fx0, &message, &r1.sig.signature) {
                warn!(partner = %partner, "Invalid proof of possession");
                forged.push(*partner);
                continue;
            }
            hashes.insert(*partner, CommitmentHash::of(&r1.fx));
        }

        let fx = self
            .fx
            .as_ref()
            .ok_or_else(|| Error::Internal("round 1 polynomial missing".into()))?;

        let mut output = RoundOutput::default();
        for partner in hashes.keys() {
            output = output.with_send(
                *partner,
                &Round2Send {
                    f: fx.evaluate_at(partner),
                },
            )?;
        }
        output.broadcast = serde_json::to_value(&Round2Broadcast {
            all_parties_fx_hash: hashes,
        })?;

        for partner in forged {
            let reason = "invalid proof of possession";
            self.malicious.insert(partner, reason.into());
            output = output.exclude(partner, reason);
        }
        Ok(output)
    }

    fn round3(
        &mut self,
        received: &RoundMessages<DkgMessage>,
        qualified: &[PartyId],
    ) -> Result<RoundOutput> {
        debug!("DKG Round 3: Verification");
        let party_id = self.config.party_id;

        let mut found = Vec::new();
        for sender in qualified {
            let r1 = round1_of(received, sender)?;
            let hash = CommitmentHash::of(&r1.fx);

            let disagreeing = qualified.iter().find(|receiver| {
                received
                    .get(1, receiver)
                    .and_then(DkgMessage::as_round2)
                    .map(|(_, broadcast)| {
                        broadcast.all_parties_fx_hash.get(sender) != Some(&hash)
                    })
                    .unwrap_or(false)
            });
            if let Some(receiver) = disagreeing {
                found.push((*sender, format!("commitments seen by {} differ", receiver)));
                continue;
            }

            let (send, _) = round2_of(received, sender)?;
            if calc_poly_point(party_id.get(), &r1.fx) != key_to_public(&self.curve, &send.f) {
                found.push((*sender, "share does not match commitments".to_string()));
                continue;
            }

            if let Err(reason) = self.completion.check_commitments(sender, &r1.fx) {
                found.push((*sender, reason));
            }
        }

        let mut output = RoundOutput::default();
        for (partner, reason) in found {
            warn!(partner = %partner, %reason, "Partner flagged as malicious");
            self.malicious.insert(partner, reason.clone());
            output = output.exclude(partner, reason);
        }
        output.broadcast = serde_json::to_value(&Round3Broadcast {
            malicious: self.malicious.keys().copied().collect(),
        })?;
        Ok(output)
    }
}

fn round1_of<'a>(
    received: &'a RoundMessages<DkgMessage>,
    party: &PartyId,
) -> Result<&'a Round1Broadcast> {
    received
        .get(0, party)
        .and_then(DkgMessage::as_round1)
        .ok_or_else(|| Error::Internal(format!("missing round 1 payload of party {}", party)))
}

fn round2_of<'a>(
    received: &'a RoundMessages<DkgMessage>,
    party: &PartyId,
) -> Result<(&'a Round2Send, &'a Round2Broadcast)> {
    received
        .get(1, party)
        .and_then(DkgMessage::as_round2)
        .ok_or_else(|| Error::Internal(format!("missing round 2 payload of party {}", party)))
}

impl<C: Completion> RoundProtocol for KeyGeneration<C> {
    type Message = DkgMessage;
    type Output = DistKey;

    fn config(&self) -> &MpcConfig {
        &self.config
    }

    fn rounds(&self) -> &'static [&'static str] {
        DKG_ROUNDS
    }

    fn run_round(
        &mut self,
        round: usize,
        received: &RoundMessages<DkgMessage>,
        qualified: &[PartyId],
    ) -> Result<RoundOutput> {
        match round {
            0 => self.round1(),
            1 => self.round2(received, qualified),
            2 => self.round3(received, qualified),
            _ => Err(Error::Internal(format!("unknown DKG round {}", round))),
        }
    }

    fn validate(
        &self,
        round: usize,
        _from: &PartyId,
        payload: PartnerPayload,
    ) -> Result<DkgMessage> {
        match round {
            0 => {
                let broadcast: Round1Broadcast = payload.broadcast_as()?;
                if broadcast.fx.len() != self.config.threshold {
                    return Err(Error::InvalidPayload(format!(
                        "expected {} commitments, got {}",
                        self.config.threshold,
                        broadcast.fx.len()
                    )));
                }
                Ok(DkgMessage::Round1(broadcast))
            }
            1 => Ok(DkgMessage::Round2 {
                send: payload.send_as()?,
                broadcast: payload.broadcast_as()?,
            }),
            2 => Ok(DkgMessage::Round3(payload.broadcast_as()?)),
            _ => Err(Error::Internal(format!("unknown DKG round {}", round))),
        }
    }

    /// Every id a qualified partner listed in its round 3 report
    fn reported(
        &self,
        received: &RoundMessages<DkgMessage>,
        qualified: &[PartyId],
    ) -> Vec<(PartyId, String)> {
        let mut reported = BTreeMap::new();
        for reporter in qualified {
            let Some(report) = received.get(2, reporter).and_then(DkgMessage::as_round3) else {
                continue;
            };
            if !report.malicious.is_empty() {
                debug!(
                    partner = %reporter,
                    malicious = ?report.malicious,
                    "Partner reported cheaters"
                );
            }
            for cheater in &report.malicious {
                reported
                    .entry(*cheater)
                    .or_insert_with(|| format!("reported by {}", reporter));
            }
        }
        reported.into_iter().collect()
    }

    fn on_complete(
        &mut self,
        received: &RoundMessages<DkgMessage>,
        qualified: &[PartyId],
    ) -> Result<DistKey> {
        let contributions = qualified
            .iter()
            .map(|partner| {
                let r1 = round1_of(received, partner)?;
                let (send, _) = round2_of(received, partner)?;
                Ok(Contribution {
                    from: *partner,
                    commitments: &r1.fx,
                    share: send.f,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let key = self.completion.complete(CompletionInput {
            index: self.config.party_id,
            threshold: self.config.threshold,
            qualified,
            contributions,
        })?;

        info!(
            party_id = %key.index,
            address = %key.address,
            partners = ?key.partners,
            "Key generation completed successfully"
        );
        Ok(key)
    }
}

/// Run the distributed key generation protocol for one party
#[instrument(skip(value, network))]
pub async fn run_dkg<N: MpcNetwork + ?Sized>(
    config: MpcConfig,
    value: Option<Scalar>,
    network: &N,
    timeout: Duration,
) -> Result<DistKey> {
    info!(
        party_id = %config.party_id,
        n_parties = config.n_parties(),
        threshold = config.threshold,
        "Starting DKG"
    );
    let mut mpc = Mpc::new(DistributedKeyGeneration::new(config, value)?);
    mpc.run_by_network(network, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::testing::{ids, run_parties};
    use crate::math::{encoding, reconstruct_key};
    use crate::mpc::{
        async_trait, ExclusionReason, MemoryHub, MemoryNetwork, RoundOutbox,
        DEFAULT_ROUND_TIMEOUT,
    };
    use crate::sign::{
        combine_partial_signatures, create_partial_signature, schnorr_verify_with_nonce_address,
    };
    use crate::types::Share;
    use serde_json::Value;
    use std::sync::Arc;

    fn shares_of(keys: &[&DistKey]) -> Vec<Share> {
        keys.iter()
            .map(|k| Share {
                index: k.index,
                value: k.share,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fixed_value_dkg() {
        let partners = PartyId::range(4);
        let runs = run_parties(&MemoryHub::new(), &partners, 2, DEFAULT_ROUND_TIMEOUT, |config| {
            DistributedKeyGeneration::new(config, Some(Scalar::ONE)).unwrap()
        })
        .await;

        let keys: BTreeMap<PartyId, DistKey> = runs
            .into_iter()
            .map(|(id, (_, result))| (id, result.unwrap()))
            .collect();

        for key in keys.values() {
            assert_eq!(key.public_key, ProjectivePoint::GENERATOR);
            assert_eq!(key.address, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
            assert_eq!(key.partners, partners);
            assert_eq!(key.curve.t, 2);
        }

        let k = |i: u64| &keys[&PartyId::new(i).unwrap()];
        assert_eq!(reconstruct_key(&shares_of(&[k(1), k(3)]), 2, 0).unwrap(), Scalar::ONE);
        assert_eq!(reconstruct_key(&shares_of(&[k(2), k(4)]), 2, 0).unwrap(), Scalar::ONE);
    }

    #[tokio::test]
    async fn test_random_dkg_consistency() {
        let partners = PartyId::range(5);
        let runs = run_parties(&MemoryHub::new(), &partners, 3, DEFAULT_ROUND_TIMEOUT, |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await;
        let keys: Vec<DistKey> = runs.into_values().map(|(_, r)| r.unwrap()).collect();

        let public_key = keys[0].public_key;
        for key in &keys {
            assert_eq!(key.public_key, public_key);
            assert_eq!(key.curve.fx, keys[0].curve.fx);
            assert_eq!(key.curve.fx.len(), 3);
            // every public share is derivable from the joint commitments
            assert_eq!(key.public_key_of(&key.index), ProjectivePoint::GENERATOR * key.share);
        }

        let secret = reconstruct_key(&shares_of(&[&keys[4], &keys[0], &keys[2]]), 3, 0).unwrap();
        assert_eq!(ProjectivePoint::GENERATOR * secret, public_key);

        let other = reconstruct_key(&shares_of(&[&keys[1], &keys[3], &keys[0]]), 3, 0).unwrap();
        assert_eq!(other, secret);
    }

    #[tokio::test]
    async fn test_dkg_key_survives_json() {
        let partners = PartyId::range(3);
        let runs = run_parties(&MemoryHub::new(), &partners, 2, DEFAULT_ROUND_TIMEOUT, |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await;

        for (_, (_, result)) in runs {
            let key = result.unwrap();
            let json = serde_json::to_string_pretty(&key).unwrap();
            let back: DistKey = serde_json::from_str(&json).unwrap();
            assert_eq!(back, key);
        }
    }

    /// Honest key generation whose round 1 proof is corrupted on the way out
    struct ForgedProof(DistributedKeyGeneration);

    impl RoundProtocol for ForgedProof {
        type Message = DkgMessage;
        type Output = DistKey;

        fn config(&self) -> &MpcConfig {
            self.0.config()
        }

        fn rounds(&self) -> &'static [&'static str] {
            self.0.rounds()
        }

        fn run_round(
            &mut self,
            round: usize,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Result<RoundOutput> {
            let mut output = self.0.run_round(round, received, qualified)?;
            if round == 0 {
                let mut broadcast: Round1Broadcast = serde_json::from_value(output.broadcast)?;
                broadcast.sig.signature.s += Scalar::ONE;
                output.broadcast = serde_json::to_value(&broadcast)?;
            }
            Ok(output)
        }

        fn validate(
            &self,
            round: usize,
            from: &PartyId,
            payload: PartnerPayload,
        ) -> Result<DkgMessage> {
            self.0.validate(round, from, payload)
        }

        fn reported(
            &self,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Vec<(PartyId, String)> {
            self.0.reported(received, qualified)
        }

        fn on_complete(
            &mut self,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Result<DistKey> {
            self.0.on_complete(received, qualified)
        }
    }

    #[tokio::test]
    async fn test_forged_proof_of_possession_is_excluded() {
        let partners = PartyId::range(4);
        let cheater = PartyId::new(3).unwrap();

        let hub = MemoryHub::new();
        let mut handles = Vec::new();
        for id in &partners {
            let config = MpcConfig::new("dkg-forged", *id, partners.clone(), 2).unwrap();
            let network = hub.network(*id);
            let id = *id;
            handles.push(tokio::spawn(async move {
                if id == cheater {
                    let dkg = DistributedKeyGeneration::new(config, None).unwrap();
                    let mut mpc = Mpc::new(ForgedProof(dkg));
                    let result = mpc.run_by_network(&network, DEFAULT_ROUND_TIMEOUT).await;
                    (id, result, Vec::new(), Vec::new())
                } else {
                    let mut mpc = Mpc::new(DistributedKeyGeneration::new(config, None).unwrap());
                    let result = mpc.run_by_network(&network, DEFAULT_ROUND_TIMEOUT).await;
                    let reports: Vec<Vec<PartyId>> = mpc
                        .received()
                        .round(2)
                        .filter_map(|(_, m)| m.as_round3())
                        .map(|r| r.malicious.clone())
                        .collect();
                    (id, result, reports, mpc.excluded().to_vec())
                }
            }));
        }

        let mut public_keys = Vec::new();
        for handle in handles {
            let (id, result, reports, excluded) = handle.await.unwrap();
            if id == cheater {
                match result {
                    Err(Error::SelfExcluded { round, .. }) => assert_eq!(round, "round2"),
                    other => panic!("unexpected result: {:?}", other),
                }
                continue;
            }
            let key = result.unwrap();
            assert_eq!(key.partners, ids(&[1, 2, 4]));
            public_keys.push(key.public_key);

            assert_eq!(reports.len(), 3);
            for report in reports {
                assert_eq!(report, vec![cheater]);
            }
            assert_eq!(excluded.len(), 1);
            assert_eq!(excluded[0].party, cheater);
            assert_eq!(excluded[0].round, "round2");
            assert!(matches!(excluded[0].reason, ExclusionReason::Malicious(_)));
        }
        assert!(public_keys.windows(2).all(|w| w[0] == w[1]));
    }

    /// Key generation that, when `victim` is set, sends it a wrong share
    struct BadShare {
        dkg: DistributedKeyGeneration,
        victim: Option<PartyId>,
    }

    impl RoundProtocol for BadShare {
        type Message = DkgMessage;
        type Output = DistKey;

        fn config(&self) -> &MpcConfig {
            self.dkg.config()
        }

        fn rounds(&self) -> &'static [&'static str] {
            self.dkg.rounds()
        }

        fn run_round(
            &mut self,
            round: usize,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Result<RoundOutput> {
            let mut output = self.dkg.run_round(round, received, qualified)?;
            if let (1, Some(victim)) = (round, self.victim) {
                let wrong = Round2Send {
                    f: Scalar::from(7u64),
                };
                output.send.insert(victim, serde_json::to_value(&wrong)?);
            }
            Ok(output)
        }

        fn validate(
            &self,
            round: usize,
            from: &PartyId,
            payload: PartnerPayload,
        ) -> Result<DkgMessage> {
            self.dkg.validate(round, from, payload)
        }

        fn reported(
            &self,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Vec<(PartyId, String)> {
            self.dkg.reported(received, qualified)
        }

        fn on_complete(
            &mut self,
            received: &RoundMessages<DkgMessage>,
            qualified: &[PartyId],
        ) -> Result<DistKey> {
            self.dkg.on_complete(received, qualified)
        }
    }

    #[tokio::test]
    async fn test_wrong_share_to_one_party_is_excluded_by_all() {
        let partners = PartyId::range(4);
        let cheater = PartyId::new(3).unwrap();
        let victim = PartyId::new(1).unwrap();

        let runs = run_parties(&MemoryHub::new(), &partners, 2, DEFAULT_ROUND_TIMEOUT, |config| {
            let victim = (config.party_id == cheater).then_some(victim);
            BadShare {
                dkg: DistributedKeyGeneration::new(config, None).unwrap(),
                victim,
            }
        })
        .await;

        let mut public_key = None;
        for (id, (excluded, result)) in runs {
            if id == cheater {
                assert!(matches!(result, Err(Error::SelfExcluded { .. })));
                continue;
            }
            let key = result.unwrap();
            assert_eq!(key.partners, ids(&[1, 2, 4]));
            assert_eq!(*public_key.get_or_insert(key.public_key), key.public_key);

            assert_eq!(excluded.len(), 1);
            assert_eq!(excluded[0].party, cheater);
            assert_eq!(excluded[0].round, "round3");
            let expected = if id == victim {
                "share does not match commitments".to_string()
            } else {
                format!("reported by {}", victim)
            };
            assert_eq!(excluded[0].reason, ExclusionReason::Malicious(expected));
        }
    }

    /// Network that shows this party a different `Fx[1]` for `sender`
    struct TamperedView {
        inner: MemoryNetwork,
        sender: PartyId,
    }

    #[async_trait]
    impl MpcNetwork for TamperedView {
        async fn register(&self, outbox: Arc<RoundOutbox>) -> Result<()> {
            self.inner.register(outbox).await
        }

        async fn ask_round_data(
            &self,
            from: &PartyId,
            protocol_id: &str,
            round: usize,
        ) -> Result<PartnerPayload> {
            let mut payload = self.inner.ask_round_data(from, protocol_id, round).await?;
            if *from == self.sender && round == 0 {
                payload.broadcast["Fx"][1] =
                    Value::String(encoding::point_to_hex(&ProjectivePoint::GENERATOR));
            }
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn test_equivocating_commitments_are_excluded() {
        let partners = PartyId::range(4);
        let sender = PartyId::new(3).unwrap();
        let fooled = PartyId::new(1).unwrap();

        let hub = MemoryHub::new();
        let mut handles = Vec::new();
        for id in &partners {
            let config = MpcConfig::new("dkg-equivocation", *id, partners.clone(), 2).unwrap();
            let mut mpc = Mpc::new(DistributedKeyGeneration::new(config, None).unwrap());
            let inner = hub.network(*id);
            let id = *id;
            handles.push(tokio::spawn(async move {
                let result = if id == fooled {
                    let network = TamperedView { inner, sender };
                    mpc.run_by_network(&network, DEFAULT_ROUND_TIMEOUT).await
                } else {
                    mpc.run_by_network(&inner, DEFAULT_ROUND_TIMEOUT).await
                };
                (id, result, mpc.excluded().to_vec())
            }));
        }

        let mut public_key = None;
        for handle in handles {
            let (id, result, excluded) = handle.await.unwrap();
            if id == sender {
                // it sees its own commitments contradicted by party 1
                assert!(matches!(result, Err(Error::SelfExcluded { .. })));
                continue;
            }
            let key = result.unwrap();
            assert_eq!(key.partners, ids(&[1, 2, 4]));
            assert!(key.partners.contains(&key.index));
            assert_eq!(*public_key.get_or_insert(key.public_key), key.public_key);

            assert_eq!(excluded.len(), 1);
            assert_eq!(excluded[0].party, sender);
            assert_eq!(excluded[0].round, "round3");
            match &excluded[0].reason {
                ExclusionReason::Malicious(reason) => {
                    assert!(reason.starts_with("commitments seen by"), "{}", reason)
                }
                other => panic!("unexpected reason: {}", other),
            }
        }
    }

    #[test]
    fn test_zero_contribution_rejected() {
        let config = MpcConfig::new("dkg-zero", PartyId::new(1).unwrap(), PartyId::range(2), 2)
            .unwrap();
        assert!(matches!(
            DistributedKeyGeneration::new(config.clone(), Some(Scalar::ZERO)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(DistributedKeyGeneration::new(config, Some(Scalar::ONE)).is_ok());
    }

    #[tokio::test]
    async fn test_silent_party_is_dropped() {
        let partners = PartyId::range(4);
        let hub = MemoryHub::new();
        hub.silence(PartyId::new(4).unwrap());

        let runs = run_parties(&hub, &partners, 2, Duration::from_millis(300), |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await;

        let mut public_key = None;
        for (id, (excluded, result)) in runs {
            if id.get() == 4 {
                assert!(matches!(result, Err(Error::InsufficientPartners { .. })));
                continue;
            }
            let key = result.unwrap();
            assert_eq!(key.partners, ids(&[1, 2, 3]));
            assert_eq!(excluded[0].reason, ExclusionReason::NoResponse);
            assert_eq!(*public_key.get_or_insert(key.public_key), key.public_key);
        }
    }

    #[tokio::test]
    async fn test_too_few_partners_fails() {
        let partners = PartyId::range(3);
        let hub = MemoryHub::new();
        hub.silence(PartyId::new(2).unwrap());
        hub.silence(PartyId::new(3).unwrap());

        let runs = run_parties(&hub, &partners, 2, Duration::from_millis(200), |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await;

        let (_, result) = &runs[&PartyId::new(1).unwrap()];
        match result {
            Err(Error::InsufficientPartners {
                required,
                actual,
                excluded,
            }) => {
                assert_eq!(*required, 2);
                assert_eq!(*actual, 1);
                assert_eq!(excluded.len(), 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_threshold_signature_flow() {
        let partners = PartyId::range(4);
        let hub = MemoryHub::new();
        let keys: Vec<DistKey> = run_parties(&hub, &partners, 3, DEFAULT_ROUND_TIMEOUT, |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await
        .into_values()
        .map(|(_, r)| r.unwrap())
        .collect();
        let nonces: Vec<DistKey> = run_parties(&hub, &partners, 3, DEFAULT_ROUND_TIMEOUT, |config| {
            DistributedKeyGeneration::new(config, None).unwrap()
        })
        .await
        .into_values()
        .map(|(_, r)| r.unwrap())
        .collect();

        let message = encoding::keccak256(&[b"transfer 10 tokens".as_slice()]);
        let partials: Vec<_> = [1usize, 3, 0]
            .iter()
            .map(|i| create_partial_signature(&keys[*i], &nonces[*i], &message).unwrap())
            .collect();

        let signature = combine_partial_signatures(3, &partials).unwrap();
        let curve = CurveContext::secp256k1();
        assert!(schnorr_verify(&curve, &keys[0].public_key, &message, &signature));

        let tampered = encoding::keccak256(&[b"transfer 99 tokens".as_slice()]);
        assert!(!schnorr_verify(&curve, &keys[0].public_key, &tampered, &signature));

        // on-chain style check against the nonce address only
        let s: [u8; 32] = signature.s.to_bytes().into();
        let nonce_address = &nonces[0].address;
        let public_key = &keys[0].public_key;
        assert!(
            schnorr_verify_with_nonce_address(&message, &s, nonce_address, public_key).unwrap()
        );
        assert!(
            !schnorr_verify_with_nonce_address(&tampered, &s, nonce_address, public_key).unwrap()
        );

        assert!(create_partial_signature(&keys[0], &nonces[1], &message).is_err());
    }
}
