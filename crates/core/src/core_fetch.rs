//! Fetch is the meshsync module for requesting artifacts by content hash
//! from peers.
//!
//! Many parts of a node ask for the same artifacts at about the same time.
//! Fetch collapses those requests: every content hash has at most one
//! pending entry, and every caller asking for it while the entry exists is
//! resolved with the same result.
//!
//! It consists of multiple parts:
//! - State object that tracks pending content hashes and their waiters
//! - Batch task that groups queued hashes into request batches per peer
//! - Send tasks, one per outgoing batch, that process the response
//!
//! ### State object
//!
//! - [CoreFetch::request] registers a waiter against the pending entry of
//!   a hash, creating and queueing the entry if it does not exist yet.
//! - Dropping the returned [FetchHandle] withdraws the waiter again. An
//!   entry that is still queued and has no waiters left is pruned.
//! - The state is guarded by a single mutex that is never held across an
//!   await point.
//!
//! ### Batch task
//!
//! - Waits for the first queued hash, then for the queue to reach the batch
//!   size or the batch delay to pass, whichever comes first.
//! - Shuffles the peers and assigns every queued hash to the first peer it
//!   has not been tried against and that is not backed off.
//! - Hashes without such a peer, or out of retries, are resolved with
//!   [MsError::NotFound] if any peer answered without the artifact, and
//!   with [MsError::Exhausted] otherwise.
//! - Spawns a send task per batch of at most the batch size. A peer has at
//!   most `parallel_request_count` batches in flight, hashes that could only
//!   go to busy peers stay queued until one of their batches completes.
//!
//! ### Send tasks
//!
//! - Send the batch with a deadline and match responses by hash.
//! - Verified artifacts resolve all waiters of their entry.
//! - Artifacts failing verification, and hashes the peer did not have, are
//!   queued again for a different peer.
//! - If the round trip fails as a whole (error, timeout, malformed or
//!   mismatched response batch), the peer is backed off and every entry of
//!   the batch is queued again.

use crate::peer_client::PeerClient;
use back_off::BackOffList;
use bytes::Bytes;
use meshsync_api::{transport::*, *};
use rand::seq::SliceRandom;
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::{oneshot, Notify},
    task::{JoinHandle, JoinSet},
};

mod back_off;

/// CoreFetch configuration types.
pub mod config {
    /// Configuration parameters for [CoreFetch](super::CoreFetch).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreFetchConfig {
        /// Max number of requests per batch, at most 100. Default: 20.
        pub batch_size: usize,
        /// How long to wait for a batch to fill up. Default: 50 ms.
        pub batch_delay_ms: u32,
        /// Deadline of a batch round trip. Default: 10 s.
        pub batch_timeout_ms: u32,
        /// How many request batches can be in flight to a single peer at
        /// once. Default: 2.
        pub parallel_request_count: u8,
        /// Retries of a hash after its first attempt. Default: 5.
        pub max_retries: u32,
        /// Duration of first interval to back off an unresponsive peer.
        /// Default: 20 s.
        pub first_back_off_interval_ms: u32,
        /// Duration of last interval to back off an unresponsive peer.
        /// Default: 10 min.
        pub last_back_off_interval_ms: u32,
        /// Number of back off intervals. Default: 4.
        pub num_back_off_intervals: usize,
    }

    impl Default for CoreFetchConfig {
        // Maximum back off is 11:40 min.
        fn default() -> Self {
            Self {
                batch_size: 20,
                batch_delay_ms: 50,
                batch_timeout_ms: 10_000,
                parallel_request_count: 2,
                max_retries: 5,
                first_back_off_interval_ms: 20_000,
                last_back_off_interval_ms: 600_000,
                num_back_off_intervals: 4,
            }
        }
    }

    impl CoreFetchConfig {
        /// The batch size in effect, clamped to `1..=MAX_BATCH_REQUESTS`.
        pub fn effective_batch_size(&self) -> usize {
            self.batch_size
                .clamp(1, meshsync_api::wire::MAX_BATCH_REQUESTS)
        }

        /// The number of batches allowed in flight per peer, at least 1.
        pub fn effective_parallel_request_count(&self) -> usize {
            self.parallel_request_count.max(1) as usize
        }
    }

    impl meshsync_api::config::ModConfig for CoreFetchConfig {
        const MODULE_NAME: &'static str = "coreFetch";
    }
}

use config::*;

type Waiter = oneshot::Sender<MsResult<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    InFlight,
}

#[derive(Debug)]
struct Pending {
    hint: Hint,
    waiters: HashMap<u64, Waiter>,
    tried: HashSet<PeerId>,
    attempts: u32,
    not_found: bool,
    phase: Phase,
}

impl Pending {
    fn resolve(self, result: MsResult<Bytes>) {
        for (_, waiter) in self.waiters {
            // the caller may have gone away in the meantime
            let _ = waiter.send(result.clone());
        }
    }

    fn give_up(self, hash: ContentHash) {
        let err = if self.not_found {
            MsError::NotFound { hash }
        } else {
            MsError::Exhausted { hash }
        };
        tracing::debug!("giving up on {hash} after {} attempts", self.attempts);
        self.resolve(Err(err));
    }
}

#[derive(Debug)]
struct State {
    pending: HashMap<ContentHash, Pending>,
    queue: Vec<ContentHash>,
    back_off_list: BackOffList,
    in_flight: HashMap<PeerId, usize>,
    next_waiter_id: u64,
    shut_down: bool,
}

impl State {
    /// Queue an in-flight entry again, or resolve it if it has used up its
    /// retries. Entries nobody waits for anymore are dropped.
    fn requeue(&mut self, hash: ContentHash, max_retries: u32) {
        let Some(entry) = self.pending.get_mut(&hash) else {
            return;
        };
        if entry.phase != Phase::InFlight {
            return;
        }
        if entry.waiters.is_empty() {
            self.pending.remove(&hash);
            return;
        }
        if entry.attempts > max_retries {
            if let Some(entry) = self.pending.remove(&hash) {
                entry.give_up(hash);
            }
            return;
        }
        entry.phase = Phase::Queued;
        self.queue.push(hash);
    }

    /// A request batch to `peer` has completed.
    fn release_peer(&mut self, peer: &PeerId) {
        if let Entry::Occupied(mut o) = self.in_flight.entry(*peer) {
            *o.get_mut() -= 1;
            if *o.get() == 0 {
                o.remove();
            }
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
struct Ctx {
    config: CoreFetchConfig,
    state: Arc<Mutex<State>>,
    flush: Notify,
    client: PeerClient,
    peers: DynPeerProvider,
    verifier: DynArtifactVerifier,
}

/// A production-ready fetch module.
#[derive(Debug)]
pub struct CoreFetch {
    ctx: Arc<Ctx>,
    batch_task: JoinHandle<()>,
}

impl Drop for CoreFetch {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CoreFetch {
    /// Construct a new fetch module from the `coreFetch` module config.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(
        config: &meshsync_api::config::Config,
        transport: DynTransport,
        peers: DynPeerProvider,
        verifier: DynArtifactVerifier,
    ) -> MsResult<Self> {
        let config: CoreFetchConfig = config.get_module_config()?;
        Ok(Self::new(config, transport, peers, verifier))
    }

    /// Construct a new fetch module.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: CoreFetchConfig,
        transport: DynTransport,
        peers: DynPeerProvider,
        verifier: DynArtifactVerifier,
    ) -> Self {
        tracing::info!("starting fetch with {config:?}");
        let state = Arc::new(Mutex::new(State {
            pending: HashMap::new(),
            queue: Vec::new(),
            back_off_list: BackOffList::new(
                config.first_back_off_interval_ms,
                config.last_back_off_interval_ms,
                config.num_back_off_intervals,
            ),
            in_flight: HashMap::new(),
            next_waiter_id: 0,
            shut_down: false,
        }));
        let client = PeerClient::with_timeout(
            Duration::from_millis(config.batch_timeout_ms as u64),
            transport,
        );
        let ctx = Arc::new(Ctx {
            config,
            state,
            flush: Notify::new(),
            client,
            peers,
            verifier,
        });
        let batch_task = tokio::task::spawn(batch_task(ctx.clone()));
        Self { ctx, batch_task }
    }

    /// Request an artifact.
    ///
    /// Requests for a hash that is already pending join the pending entry,
    /// the hint of the first request is used for the wire request.
    pub fn request(&self, hint: Hint, hash: ContentHash) -> FetchHandle {
        let (tx, rx) = oneshot::channel();
        let mut handle = FetchHandle {
            hash,
            waiter_id: 0,
            state: self.ctx.state.clone(),
            rx,
            done: false,
        };

        let queued = {
            let mut lock = lock(&self.ctx.state);
            if lock.shut_down {
                let _ = tx.send(Err(MsError::Shutdown));
                return handle;
            }
            handle.waiter_id = lock.next_waiter_id;
            lock.next_waiter_id += 1;
            let state = &mut *lock;
            match state.pending.entry(hash) {
                Entry::Occupied(mut o) => {
                    tracing::trace!("joining pending request for {hash}");
                    o.get_mut().waiters.insert(handle.waiter_id, tx);
                    false
                }
                Entry::Vacant(v) => {
                    v.insert(Pending {
                        hint,
                        waiters: HashMap::from([(handle.waiter_id, tx)]),
                        tried: HashSet::new(),
                        attempts: 0,
                        not_found: false,
                        phase: Phase::Queued,
                    });
                    state.queue.push(hash);
                    true
                }
            }
        };

        if queued {
            self.ctx.flush.notify_one();
        }
        handle
    }

    /// Request a list of artifacts and wait for all of them.
    ///
    /// Results are returned in the order of the hashes.
    pub async fn request_all(
        &self,
        hint: Hint,
        hashes: Vec<ContentHash>,
    ) -> Vec<(ContentHash, MsResult<Bytes>)> {
        let handles = hashes
            .iter()
            .map(|hash| self.request(hint, *hash))
            .collect::<Vec<_>>();
        let results = futures::future::join_all(handles).await;
        hashes.into_iter().zip(results).collect()
    }

    /// The number of content hashes with a pending entry.
    pub fn pending_count(&self) -> usize {
        lock(&self.ctx.state).pending.len()
    }

    /// Stop fetching. Every pending request resolves with
    /// [MsError::Shutdown], as does every later request.
    pub fn shutdown(&self) {
        self.batch_task.abort();
        let pending = {
            let mut lock = lock(&self.ctx.state);
            if lock.shut_down {
                return;
            }
            lock.shut_down = true;
            lock.queue.clear();
            std::mem::take(&mut lock.pending)
        };
        tracing::info!(
            "shutting down fetch with {} pending requests",
            pending.len()
        );
        for (_, entry) in pending {
            entry.resolve(Err(MsError::Shutdown));
        }
    }
}

async fn batch_task(ctx: Arc<Ctx>) {
    // dropping the set with this task aborts all outstanding sends
    let mut sends = JoinSet::new();
    let delay = Duration::from_millis(ctx.config.batch_delay_ms as u64);
    let batch_size = ctx.config.effective_batch_size();

    loop {
        while ctx.queued() == 0 {
            tokio::select! {
                _ = ctx.flush.notified() => (),
                Some(_) = sends.join_next(), if !sends.is_empty() => (),
            }
        }

        let deadline = tokio::time::Instant::now() + delay;
        while ctx.queued() < batch_size {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ctx.flush.notified() => (),
                Some(_) = sends.join_next(), if !sends.is_empty() => (),
            }
        }

        let batches = ctx.plan_batches();
        if batches.is_empty() && ctx.queued() > 0 {
            // every peer left to ask is at its in-flight limit
            tokio::select! {
                _ = ctx.flush.notified() => (),
                Some(_) = sends.join_next(), if !sends.is_empty() => (),
            }
        }
        for (peer, batch) in batches {
            sends.spawn(send_batch(ctx.clone(), peer, batch));
        }
    }
}

async fn send_batch(ctx: Arc<Ctx>, peer: PeerId, batch: RequestBatch) {
    let requests = batch.requests().to_vec();
    tracing::debug!(
        "requesting {} artifacts from {peer} in batch {}",
        requests.len(),
        batch.id()
    );
    match ctx.client.hash_batch(peer, batch).await {
        Ok(response) => ctx.handle_response(peer, &requests, response),
        Err(err) => ctx.handle_failure(peer, &requests, err),
    }
    ctx.flush.notify_one();
}

impl Ctx {
    fn queued(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Drain the queue into request batches, resolving entries that have
    /// no attempt left. Entries that can only go to peers at their
    /// in-flight limit stay queued.
    fn plan_batches(&self) -> Vec<(PeerId, RequestBatch)> {
        let mut peers = self.peers.peers();
        peers.shuffle(&mut rand::thread_rng());
        let batch_size = self.config.effective_batch_size();
        let max_batches = self.config.effective_parallel_request_count();

        let mut lock = lock(&self.state);
        let state = &mut *lock;
        let queue = std::mem::take(&mut state.queue);

        // requests each peer can still take in this round
        let mut capacity = peers
            .iter()
            .map(|peer| {
                let busy = state.in_flight.get(peer).copied().unwrap_or(0);
                (*peer, max_batches.saturating_sub(busy) * batch_size)
            })
            .collect::<HashMap<_, _>>();

        let mut deferred = Vec::new();
        let mut per_peer: Vec<(PeerId, Vec<RequestMessage>)> = Vec::new();
        for hash in queue {
            let Some(entry) = state.pending.get_mut(&hash) else {
                // pruned
                continue;
            };
            if entry.phase != Phase::Queued {
                continue;
            }
            if entry.waiters.is_empty() {
                state.pending.remove(&hash);
                continue;
            }

            let mut busy = false;
            let peer = if entry.attempts > self.config.max_retries {
                None
            } else {
                peers
                    .iter()
                    .filter(|p| {
                        !entry.tried.contains(*p)
                            && !state.back_off_list.is_peer_on_back_off(p)
                    })
                    .find(|p| {
                        let free = capacity.get(*p).is_some_and(|c| *c > 0);
                        busy |= !free;
                        free
                    })
                    .copied()
            };
            let Some(peer) = peer else {
                if busy {
                    deferred.push(hash);
                } else if let Some(entry) = state.pending.remove(&hash) {
                    entry.give_up(hash);
                }
                continue;
            };
            if let Some(c) = capacity.get_mut(&peer) {
                *c -= 1;
            }

            entry.attempts += 1;
            entry.tried.insert(peer);
            entry.phase = Phase::InFlight;
            let request = RequestMessage {
                hint: entry.hint,
                hash,
            };
            match per_peer.iter_mut().find(|(p, _)| *p == peer) {
                Some((_, requests)) => requests.push(request),
                None => per_peer.push((peer, vec![request])),
            }
        }

        if !deferred.is_empty() {
            tracing::trace!(
                "{} requests wait for a peer to finish a batch",
                deferred.len()
            );
            state.queue.extend(deferred);
        }

        let mut out = Vec::new();
        for (peer, requests) in per_peer {
            for chunk in requests.chunks(batch_size) {
                match RequestBatch::new(chunk.to_vec()) {
                    Ok(batch) => {
                        *state.in_flight.entry(peer).or_default() += 1;
                        out.push((peer, batch));
                    }
                    Err(err) => {
                        tracing::warn!("could not build request batch: {err}");
                        for request in chunk {
                            if let Some(entry) =
                                state.pending.remove(&request.hash)
                            {
                                entry.resolve(Err(err.clone()));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn handle_response(
        &self,
        peer: PeerId,
        requests: &[RequestMessage],
        response: ResponseBatch,
    ) {
        let hints = requests
            .iter()
            .map(|r| (r.hash, r.hint))
            .collect::<HashMap<_, _>>();

        // verify before taking the lock, artifacts can be large
        let mut found = HashMap::new();
        let mut corrupt = HashSet::new();
        for response in response.into_responses() {
            let hash = *response.hash();
            let Some(hint) = hints.get(&hash) else {
                tracing::debug!("ignoring unrequested {hash} from {peer}");
                continue;
            };
            if self.verifier.verify(*hint, &hash, response.data()) {
                found.insert(hash, response.into_data());
            } else {
                corrupt.insert(hash);
            }
        }

        let mut lock = lock(&self.state);
        lock.release_peer(&peer);
        lock.back_off_list.remove_peer(&peer);
        for request in requests {
            let hash = request.hash;
            let Some(entry) = lock.pending.get_mut(&hash) else {
                continue;
            };
            if entry.phase != Phase::InFlight {
                continue;
            }
            if let Some(data) = found.remove(&hash) {
                tracing::trace!("fetched {hash} from {peer}");
                if let Some(entry) = lock.pending.remove(&hash) {
                    entry.resolve(Ok(data));
                }
                continue;
            }
            if corrupt.contains(&hash) {
                tracing::warn!(
                    "peer {peer} sent data for {hash} that does not match the hash"
                );
            } else {
                tracing::trace!("peer {peer} does not have {hash}");
                entry.not_found = true;
            }
            lock.requeue(hash, self.config.max_retries);
        }
    }

    fn handle_failure(
        &self,
        peer: PeerId,
        requests: &[RequestMessage],
        err: MsError,
    ) {
        tracing::warn!(
            "fetch batch of {} requests to {peer} failed: {err}",
            requests.len()
        );
        let mut lock = lock(&self.state);
        lock.release_peer(&peer);
        lock.back_off_list.back_off_peer(&peer);
        for request in requests {
            lock.requeue(request.hash, self.config.max_retries);
        }
    }
}

/// The pending result of a [CoreFetch::request].
///
/// Dropping the handle (or calling [FetchHandle::cancel]) withdraws the
/// interest in the artifact.
pub struct FetchHandle {
    hash: ContentHash,
    waiter_id: u64,
    state: Arc<Mutex<State>>,
    rx: oneshot::Receiver<MsResult<Bytes>>,
    done: bool,
}

impl std::fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle")
            .field("hash", &self.hash)
            .field("done", &self.done)
            .finish()
    }
}

impl FetchHandle {
    /// The requested content hash.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Withdraw the interest in the artifact.
    pub fn cancel(self) {}
}

impl Future for FetchHandle {
    type Output = MsResult<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                self.done = true;
                // the sender is only dropped without sending on shutdown
                Poll::Ready(result.unwrap_or(Err(MsError::Shutdown)))
            }
        }
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut lock = lock(&self.state);
        let Some(entry) = lock.pending.get_mut(&self.hash) else {
            return;
        };
        entry.waiters.remove(&self.waiter_id);
        if entry.waiters.is_empty() && entry.phase == Phase::Queued {
            tracing::trace!("pruning abandoned request for {}", self.hash);
            lock.pending.remove(&self.hash);
        }
    }
}

#[cfg(test)]
mod test;
