//! Macaroon verification.
//!
//! A [`Verifier`] recomputes the signature chain of a macaroon from the root
//! secret, checking every first-party predicate against the registered
//! predicates and verifiers, and recursing into bound discharge macaroons for
//! third-party caveats. The outcome is a plain `bool`; only misconfigured
//! cryptography surfaces as an error.

use patisserie_core::{Limits, VerifierSettings};
use std::fmt;
use std::sync::Arc;

use crate::crypto::{self, CryptoProvider, Digest, HASH_BYTES, NONCE_BYTES, SECRETBOX_TAG_BYTES};
use crate::error::MacaroonError;
use crate::keys::{self, RootKey};
use crate::macaroon::Macaroon;

/// Decides whether a first-party predicate holds.
///
/// Any `Fn(&[u8]) -> bool` closure is a verifier.
pub trait CaveatVerifier: Send + Sync {
    fn verify_caveat(&self, predicate: &[u8]) -> bool;
}

impl<F> CaveatVerifier for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn verify_caveat(&self, predicate: &[u8]) -> bool {
        self(predicate)
    }
}

/// Verification context for one macaroon and its discharges.
///
/// Registration methods return `&mut Self`, so a verifier can be set up in
/// one chain or refined between attempts.
pub struct Verifier<'m> {
    macaroon: &'m Macaroon,
    exact: Vec<Vec<u8>>,
    general: Vec<Box<dyn CaveatVerifier + 'm>>,
    discharges: Vec<Macaroon>,
    crypto: Arc<dyn CryptoProvider>,
    limits: Limits,
    settings: VerifierSettings,
}

/// Why a verification attempt was rejected, reported in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Unsatisfied { caveat: usize },
    MissingDischarge { caveat: usize },
    UndecryptableVerifierId { caveat: usize },
    TooDeep { depth: usize },
    SignatureMismatch,
    UnboundDischarge,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Unsatisfied { caveat } => write!(f, "caveat {caveat} is not satisfied"),
            Failure::MissingDischarge { caveat } => {
                write!(f, "no unused discharge matches caveat {caveat}")
            }
            Failure::UndecryptableVerifierId { caveat } => {
                write!(f, "verifier id of caveat {caveat} does not decrypt")
            }
            Failure::TooDeep { depth } => write!(f, "discharge nesting exceeds {depth}"),
            Failure::SignatureMismatch => f.write_str("signature mismatch"),
            Failure::UnboundDischarge => {
                f.write_str("discharge is not bound to the root macaroon")
            }
        }
    }
}

/// A third-party caveat that some unused discharge still has to satisfy.
struct Obligation<'v> {
    caveat_id: &'v [u8],
    key: RootKey,
    depth: usize,
    caveat: usize,
}

/// A macaroon whose own caveats held, with the signature it recomputed to.
struct Walked<'v> {
    signature: Digest,
    obligations: Vec<Obligation<'v>>,
}

impl<'m> Verifier<'m> {
    pub fn new(macaroon: &'m Macaroon) -> Self {
        Self::with_crypto(macaroon, crypto::default_provider())
    }

    pub fn with_crypto(macaroon: &'m Macaroon, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            macaroon,
            exact: Vec::new(),
            general: Vec::new(),
            discharges: Vec::new(),
            crypto,
            limits: Limits::default(),
            settings: VerifierSettings::default(),
        }
    }

    pub fn with_limits(&mut self, limits: Limits) -> &mut Self {
        self.limits = limits;
        self
    }

    pub fn with_settings(&mut self, settings: VerifierSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Accept a first-party caveat whose predicate is exactly `predicate`.
    pub fn satisfy_exact(&mut self, predicate: impl AsRef<[u8]>) -> &mut Self {
        self.exact.push(predicate.as_ref().to_vec());
        self
    }

    /// Accept any first-party caveat that `verifier` approves.
    pub fn satisfy_general(&mut self, verifier: impl CaveatVerifier + 'm) -> &mut Self {
        self.general.push(Box::new(verifier));
        self
    }

    /// Supply a discharge macaroon, already bound to the root macaroon.
    pub fn add_discharge(&mut self, discharge: Macaroon) -> &mut Self {
        self.discharges.push(discharge);
        self
    }

    pub fn add_discharges(&mut self, discharges: impl IntoIterator<Item = Macaroon>) -> &mut Self {
        self.discharges.extend(discharges);
        self
    }

    /// Verify against the secret the root macaroon was minted with.
    pub fn is_valid(&self, secret: impl AsRef<[u8]>) -> Result<bool, MacaroonError> {
        let key = RootKey::derive(self.crypto.as_ref(), secret.as_ref())?;
        self.is_valid_with_key(&key)
    }

    /// Verify against an already derived root key.
    ///
    /// The order discharges were supplied in does not matter: every unused
    /// discharge with a matching identifier is tried for each third-party
    /// caveat until an assignment satisfies all of them.
    pub fn is_valid_with_key(&self, key: &RootKey) -> Result<bool, MacaroonError> {
        let mut search = Search::new(self.discharges.len());

        let valid = match self.walk(self.macaroon, key, 0, &mut search)? {
            None => false,
            Some(walked) => {
                if crypto::constant_time_eq(&walked.signature, self.macaroon.signature()) {
                    let mut obligations = walked.obligations;
                    self.assign(&mut obligations, &mut search)?
                } else {
                    search.reject(Failure::SignatureMismatch, 0);
                    false
                }
            }
        };

        if !valid && self.settings.diagnostics {
            if let Some((failure, depth)) = search.first_failure {
                tracing::debug!(depth, %failure, "macaroon verification failed");
            }
        }
        Ok(valid)
    }

    /// Like [`Verifier::is_valid`], but a rejected macaroon is an error.
    pub fn assert_valid(&self, secret: impl AsRef<[u8]>) -> Result<(), MacaroonError> {
        if self.is_valid(secret)? {
            Ok(())
        } else {
            Err(MacaroonError::Invalid)
        }
    }

    /// Recompute one macaroon's signature from `key`, checking its
    /// first-party caveats and collecting the discharges it still needs.
    ///
    /// Returns `None` when the macaroon cannot be valid whatever discharges
    /// are supplied.
    fn walk<'v>(
        &'v self,
        macaroon: &'v Macaroon,
        key: &RootKey,
        depth: usize,
        search: &mut Search,
    ) -> Result<Option<Walked<'v>>, MacaroonError> {
        let crypto = self.crypto.as_ref();
        let mut signature = keys::chain(crypto, key.as_bytes(), macaroon.identifier())?;
        let mut obligations = Vec::new();

        for (index, caveat) in macaroon.caveats().enumerate() {
            match caveat.verifier_id {
                None => {
                    if !self.satisfied(caveat.id) {
                        search.reject(Failure::Unsatisfied { caveat: index }, depth);
                        return Ok(None);
                    }
                    signature = keys::chain(crypto, &signature, caveat.id)?;
                }
                Some(verifier_id) => {
                    if depth + 1 > self.limits.max_discharge_depth {
                        let limit = self.limits.max_discharge_depth;
                        search.reject(Failure::TooDeep { depth: limit }, depth);
                        return Ok(None);
                    }
                    let Some(caveat_key) = self.open_verifier_id(&signature, verifier_id) else {
                        search.reject(Failure::UndecryptableVerifierId { caveat: index }, depth);
                        return Ok(None);
                    };
                    obligations.push(Obligation {
                        caveat_id: caveat.id,
                        key: caveat_key,
                        depth: depth + 1,
                        caveat: index,
                    });
                    signature = keys::chain_pair(crypto, &signature, verifier_id, caveat.id)?;
                }
            }
        }

        // Later obligations are popped first; keep caveat order.
        obligations.reverse();
        Ok(Some(Walked {
            signature,
            obligations,
        }))
    }

    /// Discharge every outstanding obligation, backtracking over the
    /// candidate discharges of each.
    fn assign<'v>(
        &'v self,
        obligations: &mut Vec<Obligation<'v>>,
        search: &mut Search,
    ) -> Result<bool, MacaroonError> {
        let Some(obligation) = obligations.pop() else {
            return Ok(true);
        };

        let mut matched = false;
        for (slot, discharge) in self.discharges.iter().enumerate() {
            if search.used[slot] || discharge.identifier() != obligation.caveat_id {
                continue;
            }
            matched = true;

            let Some(walked) = self.walk(discharge, &obligation.key, obligation.depth, search)?
            else {
                continue;
            };
            let bound = keys::bind_signature(
                self.crypto.as_ref(),
                self.macaroon.signature(),
                &walked.signature,
            )?;
            if !crypto::constant_time_eq(&bound, discharge.signature()) {
                search.reject(Failure::UnboundDischarge, obligation.depth);
                continue;
            }

            search.used[slot] = true;
            let mark = obligations.len();
            obligations.extend(walked.obligations);
            if self.assign(obligations, search)? {
                return Ok(true);
            }
            obligations.truncate(mark);
            search.used[slot] = false;
        }

        if !matched {
            search.reject(
                Failure::MissingDischarge {
                    caveat: obligation.caveat,
                },
                obligation.depth - 1,
            );
        }
        obligations.push(obligation);
        Ok(false)
    }

    fn satisfied(&self, predicate: &[u8]) -> bool {
        self.exact.iter().any(|p| p.as_slice() == predicate)
            || self.general.iter().any(|v| v.verify_caveat(predicate))
    }

    fn open_verifier_id(&self, signature: &Digest, verifier_id: &[u8]) -> Option<RootKey> {
        if verifier_id.len() < NONCE_BYTES + SECRETBOX_TAG_BYTES {
            return None;
        }
        let (nonce, sealed) = verifier_id.split_at(NONCE_BYTES);
        let nonce: &[u8; NONCE_BYTES] = nonce.try_into().ok()?;
        let plaintext = self.crypto.secretbox_open(signature, nonce, sealed)?;
        let bytes: [u8; HASH_BYTES] = plaintext.as_slice().try_into().ok()?;
        Some(RootKey::from_bytes(bytes))
    }
}

/// Discharge bookkeeping for one verification attempt.
struct Search {
    used: Vec<bool>,
    first_failure: Option<(Failure, usize)>,
}

impl Search {
    fn new(discharges: usize) -> Self {
        Self {
            used: vec![false; discharges],
            first_failure: None,
        }
    }

    /// Remember why a branch was rejected; only the first reason is reported.
    fn reject(&mut self, failure: Failure, depth: usize) {
        self.first_failure.get_or_insert((failure, depth));
    }
}
