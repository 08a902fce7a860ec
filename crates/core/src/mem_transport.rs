//! The in-process stub transport.
//!
//! This is NOT a production module. It is for testing only. It only
//! "connects" peers registered on the same [MemNetwork].

use meshsync_api::{transport::*, *};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A set of peers reachable from each other within this process.
#[derive(Debug, Default)]
pub struct MemNetwork {
    nodes: Mutex<HashMap<PeerId, DynResponder>>,
}

impl MemNetwork {
    /// Construct a new, empty network.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a peer reachable, its requests are answered by `responder`.
    pub fn register(&self, peer: PeerId, responder: DynResponder) {
        self.nodes.lock().unwrap().insert(peer, responder);
    }

    /// Make a peer unreachable.
    pub fn unregister(&self, peer: &PeerId) {
        self.nodes.lock().unwrap().remove(peer);
    }

    /// The transport used by `local` to reach the other peers.
    pub fn transport(self: &Arc<Self>, local: PeerId) -> DynTransport {
        let out: DynTransport = Arc::new(MemTransport {
            network: self.clone(),
            local,
        });
        out
    }
}

#[derive(Debug)]
struct MemTransport {
    network: Arc<MemNetwork>,
    local: PeerId,
}

impl Transport for MemTransport {
    fn send(
        &self,
        peer: PeerId,
        data: bytes::Bytes,
    ) -> BoxFut<'_, MsResult<bytes::Bytes>> {
        Box::pin(async move {
            let responder = self.network.nodes.lock().unwrap().get(&peer).cloned();
            let Some(responder) = responder else {
                return Err(MsError::transport(peer, "peer unreachable"));
            };
            // like a real transport, the reason for a rejection is not
            // passed back to the requester
            responder.respond(self.local, data).await.map_err(|err| {
                tracing::debug!("{peer} rejected request from {}: {err}", self.local);
                MsError::transport(peer, "request rejected")
            })
        })
    }
}
