//! Locate the highest layer at which the local mesh and a peer's mesh
//! agree.
//!
//! Every round requests sampled layer hashes for a range from the peer and
//! compares them with the local ones in ascending order. The last matching
//! sample is the agreement bound, the first mismatching sample the
//! disagreement bound. While the bounds are more than one layer apart, the
//! next round samples the layers strictly between them. With up to
//! [MAX_HASHES_IN_REQ] samples per round this converges in
//! O(log(To - From)) rounds.

use crate::peer_client::PeerClient;
use meshsync_api::{transport::*, *};
use std::time::Duration;

/// ForkFinder configuration types.
pub mod config {
    /// Configuration parameters for [ForkFinder](super::ForkFinder).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct ForkFinderConfig {
        /// Deadline of a single round. Default: 10 s.
        pub round_timeout_ms: u32,
        /// Max rounds of a single search. Default: 32.
        pub max_rounds: u32,
    }

    impl Default for ForkFinderConfig {
        fn default() -> Self {
            Self {
                round_timeout_ms: 10_000,
                max_rounds: 32,
            }
        }
    }

    impl meshsync_api::config::ModConfig for ForkFinderConfig {
        const MODULE_NAME: &'static str = "forkFinder";
    }
}

use config::*;

/// The result of a fork search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    /// Every sampled layer of the first round matched.
    NoDivergence,

    /// The meshes diverge.
    Diverged {
        /// The highest layer both sides agree on, `None` if they already
        /// disagree on the first layer of the range.
        last_agreed: Option<LayerId>,
        /// The lowest layer known to differ.
        first_diverged: LayerId,
        /// The number of rounds it took.
        rounds: u32,
    },
}

impl std::fmt::Display for ForkOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDivergence => f.write_str("no divergence"),
            Self::Diverged {
                last_agreed: Some(last_agreed),
                first_diverged,
                rounds,
            } => write!(
                f,
                "agreed up to {last_agreed}, diverged at {first_diverged} \
                 after {rounds} rounds"
            ),
            Self::Diverged {
                last_agreed: None,
                first_diverged,
                rounds,
            } => write!(
                f,
                "diverged at {first_diverged} after {rounds} rounds"
            ),
        }
    }
}

/// Searches for the divergence point with a peer.
///
/// Searches hold no shared state, any number of them may run concurrently.
#[derive(Debug)]
pub struct ForkFinder {
    config: ForkFinderConfig,
    client: PeerClient,
    mesh: DynMeshStore,
}

impl ForkFinder {
    /// Construct a new fork finder from the `forkFinder` module config.
    pub fn create(
        config: &meshsync_api::config::Config,
        transport: DynTransport,
        mesh: DynMeshStore,
    ) -> MsResult<Self> {
        let config: ForkFinderConfig = config.get_module_config()?;
        Ok(Self::new(config, transport, mesh))
    }

    /// Construct a new fork finder.
    pub fn new(
        config: ForkFinderConfig,
        transport: DynTransport,
        mesh: DynMeshStore,
    ) -> Self {
        let client = PeerClient::with_timeout(
            Duration::from_millis(config.round_timeout_ms as u64),
            transport,
        );
        Self {
            config,
            client,
            mesh,
        }
    }

    /// Search the range `from..=to` for the highest layer at which the
    /// local mesh and the mesh of `peer` agree.
    ///
    /// A range of a single layer is taken to be the divergence point
    /// already and issues no request.
    pub async fn find_fork(
        &self,
        peer: PeerId,
        from: LayerId,
        to: LayerId,
    ) -> MsResult<ForkOutcome> {
        if to < from {
            return Err(MsError::bad_request(Violation::Invariant {
                field: "to",
                reason: "must not be before from",
            }));
        }
        if from == to {
            return Ok(ForkOutcome::Diverged {
                last_agreed: None,
                first_diverged: to,
                rounds: 0,
            });
        }

        let mut last_agreed: Option<LayerId> = None;
        let mut first_diverged = to;
        let (mut lo, mut hi) = (from, to);
        let mut round = 0;

        loop {
            if round >= self.config.max_rounds {
                return Err(inconclusive(
                    peer,
                    round + 1,
                    "round limit reached",
                ));
            }
            round += 1;

            let request = MeshHashRequest::new(lo, hi);
            tracing::debug!("fork search with {peer} round {round}: {request}");
            let hashes = self
                .client
                .mesh_hashes(peer, request)
                .await
                .map_err(|err| inconclusive(peer, round, err))?;

            let expected = request.count().unwrap_or(0);
            if hashes.hashes().len() != expected {
                return Err(inconclusive(
                    peer,
                    round,
                    format!(
                        "expected {expected} hashes, received {}",
                        hashes.hashes().len()
                    ),
                ));
            }

            let mut mismatch = None;
            for (layer, remote) in request.layers().zip(hashes.hashes()) {
                let local = self
                    .mesh
                    .layer_hash(layer)
                    .await?
                    .ok_or(MsError::MissingLocalLayer(layer))?;
                if local != *remote {
                    mismatch = Some(layer);
                    break;
                }
                last_agreed = Some(layer);
            }

            match mismatch {
                None if round == 1 => {
                    tracing::debug!("no divergence with {peer} in {request}");
                    return Ok(ForkOutcome::NoDivergence);
                }
                // everything strictly between the bounds agreed
                None => break,
                Some(layer) => first_diverged = layer,
            }

            match last_agreed {
                Some(agreed) if first_diverged.difference(agreed) > 1 => {
                    lo = agreed.plus(1);
                    hi = first_diverged.prev().unwrap_or(first_diverged);
                }
                _ => break,
            }
        }

        let outcome = ForkOutcome::Diverged {
            last_agreed,
            first_diverged,
            rounds: round,
        };
        tracing::debug!("fork search with {peer}: {outcome}");
        Ok(outcome)
    }
}

fn inconclusive<R: std::fmt::Display>(
    peer: PeerId,
    round: u32,
    reason: R,
) -> MsError {
    let reason = reason.to_string();
    tracing::warn!("fork search with {peer} inconclusive in round {round}: {reason}");
    MsError::Inconclusive {
        peer,
        round,
        reason: reason.into_boxed_str().into(),
    }
}
