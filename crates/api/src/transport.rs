//! Boundary with the peer-to-peer transport.
//!
//! Connection management and stream handling are not part of meshsync. The
//! core only needs a single-shot request/response exchange with a peer, and
//! a handler the transport calls for requests coming in from peers.

use crate::*;
#[cfg(feature = "mockall")]
use mockall::automock;
use std::sync::Arc;

/// Single-shot request/response exchange with a peer.
#[cfg_attr(feature = "mockall", automock)]
pub trait Transport: 'static + Send + Sync + std::fmt::Debug {
    /// Send the payload to the peer, opening a connection if needed, and
    /// wait for its response payload.
    ///
    /// Implementations do not need to enforce a deadline, the callers wrap
    /// every exchange in their own timeout.
    fn send(
        &self,
        peer: PeerId,
        data: bytes::Bytes,
    ) -> BoxFut<'_, MsResult<bytes::Bytes>>;
}

/// Trait object [Transport].
pub type DynTransport = Arc<dyn Transport>;

/// Handler for requests coming in from peers.
#[cfg_attr(feature = "mockall", automock)]
pub trait Responder: 'static + Send + Sync + std::fmt::Debug {
    /// Answer a request payload received from `peer`.
    ///
    /// An error means the request is rejected. The transport must not
    /// forward the error details to the peer.
    fn respond(
        &self,
        peer: PeerId,
        data: bytes::Bytes,
    ) -> BoxFut<'_, MsResult<bytes::Bytes>>;
}

/// Trait object [Responder].
pub type DynResponder = Arc<dyn Responder>;

/// Source of candidate peers to fetch from.
///
/// Scoring and banning of peers is up to the implementation.
#[cfg_attr(feature = "mockall", automock)]
pub trait PeerProvider: 'static + Send + Sync + std::fmt::Debug {
    /// The peers currently eligible for fetch requests.
    fn peers(&self) -> Vec<PeerId>;
}

/// Trait object [PeerProvider].
pub type DynPeerProvider = Arc<dyn PeerProvider>;

/// A fixed list of peers.
#[derive(Debug, Default)]
pub struct StaticPeers(std::sync::RwLock<Vec<PeerId>>);

impl StaticPeers {
    /// Construct a new peer list.
    pub fn create(peers: Vec<PeerId>) -> Arc<Self> {
        Arc::new(Self(std::sync::RwLock::new(peers)))
    }

    /// Replace the peer list.
    pub fn set(&self, peers: Vec<PeerId>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = peers;
    }
}

impl PeerProvider for StaticPeers {
    fn peers(&self) -> Vec<PeerId> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
