use super::*;
use meshsync_test_utils::{
    enable_tracing,
    id::{random_artifact, random_hash, random_peer_id},
    iter_check,
};
use std::sync::atomic::{AtomicUsize, Ordering};

type RequestsSent = Arc<Mutex<Vec<(PeerId, Vec<RequestMessage>)>>>;

const SLOW_RESPONSE: Duration = Duration::from_millis(200);

/// Tracks how many round trips run at the same time.
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

struct InFlightGuard(Arc<Concurrency>);

impl InFlightGuard {
    fn enter(concurrency: Arc<Concurrency>) -> Self {
        let now = concurrency.current.fetch_add(1, Ordering::SeqCst) + 1;
        concurrency.max.fetch_max(now, Ordering::SeqCst);
        Self(concurrency)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a mocked peer answers a request batch.
#[derive(Clone)]
enum Behavior {
    /// Answer with the artifacts it has.
    Serve(HashMap<ContentHash, Bytes>),
    /// Answer with the artifacts it has, after a while.
    Slow(HashMap<ContentHash, Bytes>),
    /// Never answer.
    Hang,
    /// Answer with garbage for every requested hash.
    Corrupt,
    /// Answer with a response batch for some other request.
    WrongId,
    /// Fail the round trip.
    Fail,
}

struct TestCase {
    fetch: CoreFetch,
    requests_sent: RequestsSent,
    peers: Arc<StaticPeers>,
    concurrency: Arc<Concurrency>,
}

fn serve(
    batch: &RequestBatch,
    artifacts: &HashMap<ContentHash, Bytes>,
) -> MsResult<Bytes> {
    let responses = batch
        .requests()
        .iter()
        .filter_map(|r| {
            artifacts
                .get(&r.hash)
                .map(|data| ResponseMessage::new(r.hash, data.clone()).unwrap())
        })
        .collect();
    Ok(ResponseBatch::new(*batch.id(), responses).unwrap().encode())
}

fn setup_test(
    config: CoreFetchConfig,
    peers: Vec<(PeerId, Behavior)>,
) -> TestCase {
    enable_tracing();
    let requests_sent: RequestsSent = Arc::new(Mutex::new(Vec::new()));
    let concurrency = Arc::new(Concurrency::default());
    let behaviors = peers.iter().cloned().collect::<HashMap<_, _>>();

    let mut transport = MockTransport::new();
    transport.expect_send().returning({
        let requests_sent = requests_sent.clone();
        let concurrency = concurrency.clone();
        move |peer, data| {
            let batch = match PeerRequest::decode(data).unwrap() {
                PeerRequest::HashBatch(batch) => batch,
                oth => panic!("unexpected request {oth:?}"),
            };
            requests_sent
                .lock()
                .unwrap()
                .push((peer, batch.requests().to_vec()));
            let behavior = behaviors.get(&peer).unwrap();
            let out = match behavior {
                Behavior::Serve(artifacts) | Behavior::Slow(artifacts) => {
                    serve(&batch, artifacts)
                }
                Behavior::Hang => Err(MsError::other("never answered")),
                Behavior::Corrupt => {
                    let responses = batch
                        .requests()
                        .iter()
                        .map(|r| {
                            ResponseMessage::new(
                                r.hash,
                                Bytes::from_static(b"garbage"),
                            )
                            .unwrap()
                        })
                        .collect();
                    Ok(ResponseBatch::new(*batch.id(), responses)
                        .unwrap()
                        .encode())
                }
                Behavior::WrongId => {
                    Ok(ResponseBatch::new(random_hash(), vec![])
                        .unwrap()
                        .encode())
                }
                Behavior::Fail => {
                    Err(MsError::transport(peer, "connection refused"))
                }
            };
            let (slow, hang) = (
                matches!(behavior, Behavior::Slow(_)),
                matches!(behavior, Behavior::Hang),
            );
            let guard = InFlightGuard::enter(concurrency.clone());
            Box::pin(async move {
                let _guard = guard;
                if hang {
                    std::future::pending::<()>().await;
                }
                if slow {
                    tokio::time::sleep(SLOW_RESPONSE).await;
                }
                out
            })
        }
    });

    let static_peers =
        StaticPeers::create(peers.iter().map(|(p, _)| *p).collect());
    let fetch = CoreFetch::new(
        config,
        Arc::new(transport),
        static_peers.clone(),
        Arc::new(DigestVerifier),
    );

    TestCase {
        fetch,
        requests_sent,
        peers: static_peers,
        concurrency,
    }
}

fn sent_hashes(requests_sent: &RequestsSent) -> Vec<ContentHash> {
    requests_sent
        .lock()
        .unwrap()
        .iter()
        .flat_map(|(_, r)| r.iter().map(|r| r.hash))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_are_deduplicated() {
    let (hash, data) = random_artifact();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![(
            random_peer_id(),
            Behavior::Serve(HashMap::from([(hash, data.clone())])),
        )],
    );

    let handles = (0..10)
        .map(|_| fetch.request(Hint::Ballot, hash))
        .collect::<Vec<_>>();
    assert_eq!(1, fetch.pending_count());

    for result in futures::future::join_all(handles).await {
        assert_eq!(data, result.unwrap());
    }
    assert_eq!(vec![hash], sent_hashes(&requests_sent));
    assert_eq!(0, fetch.pending_count());
}

#[tokio::test(start_paused = true)]
async fn full_queue_is_split_into_batches() {
    let artifacts = (0..45).map(|_| random_artifact()).collect::<Vec<_>>();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![(
            random_peer_id(),
            Behavior::Serve(artifacts.iter().cloned().collect()),
        )],
    );

    let results = fetch
        .request_all(
            Hint::Tx,
            artifacts.iter().map(|(hash, _)| *hash).collect(),
        )
        .await;
    for ((hash, data), (res_hash, result)) in artifacts.iter().zip(results) {
        assert_eq!(*hash, res_hash);
        assert_eq!(*data, result.unwrap());
    }

    let sent = requests_sent.lock().unwrap();
    assert!(sent.len() >= 3);
    assert!(sent.iter().all(|(_, r)| r.len() <= 20));
    assert_eq!(45, sent.iter().map(|(_, r)| r.len()).sum::<usize>());
}

#[tokio::test(start_paused = true)]
async fn absent_hashes_are_retried_elsewhere() {
    let (have_a, data_a) = random_artifact();
    let (have_b, data_b) = random_artifact();
    let peer_a = random_peer_id();
    let peer_b = random_peer_id();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![
            (
                peer_a,
                Behavior::Serve(HashMap::from([(have_a, data_a.clone())])),
            ),
            (
                peer_b,
                Behavior::Serve(HashMap::from([(have_b, data_b.clone())])),
            ),
        ],
    );

    let results = fetch.request_all(Hint::Atx, vec![have_a, have_b]).await;
    assert_eq!(data_a, results[0].1.clone().unwrap());
    assert_eq!(data_b, results[1].1.clone().unwrap());

    // every hash was asked of each peer at most once
    let sent = requests_sent.lock().unwrap();
    for hash in [have_a, have_b] {
        for peer in [peer_a, peer_b] {
            assert!(
                sent.iter()
                    .filter(|(p, r)| {
                        *p == peer && r.iter().any(|r| r.hash == hash)
                    })
                    .count()
                    <= 1
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_is_not_found() {
    let config = CoreFetchConfig {
        max_retries: 2,
        ..Default::default()
    };
    let peers = (0..10)
        .map(|_| (random_peer_id(), Behavior::Serve(HashMap::new())))
        .collect();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(config, peers);

    let hash = random_hash();
    match fetch.request(Hint::Block, hash).await {
        Err(MsError::NotFound { hash: h }) => assert_eq!(hash, h),
        oth => panic!("unexpected {oth:?}"),
    }

    // the first attempt plus two retries, each to a different peer
    let sent = requests_sent.lock().unwrap();
    assert_eq!(3, sent.len());
    let peers = sent.iter().map(|(p, _)| *p).collect::<HashSet<_>>();
    assert_eq!(3, peers.len());
}

#[tokio::test(start_paused = true)]
async fn no_peers_is_exhausted() {
    let TestCase { fetch, .. } = setup_test(CoreFetchConfig::default(), vec![]);
    let hash = random_hash();
    match fetch.request(Hint::Block, hash).await {
        Err(MsError::Exhausted { hash: h }) => assert_eq!(hash, h),
        oth => panic!("unexpected {oth:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn failing_peers_are_backed_off_and_exhausted() {
    let (hash, data) = random_artifact();
    let failing = random_peer_id();
    let good = random_peer_id();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![
            (failing, Behavior::Fail),
            (good, Behavior::Serve(HashMap::from([(hash, data.clone())]))),
        ],
    );

    assert_eq!(data, fetch.request(Hint::Poet, hash).await.unwrap());

    let failed_first = requests_sent.lock().unwrap()[0].0 == failing;
    assert_eq!(
        failed_first,
        fetch
            .ctx
            .state
            .lock()
            .unwrap()
            .back_off_list
            .is_peer_on_back_off(&failing)
    );

    // with only failing peers there is nobody left to ask
    let TestCase { fetch, .. } = setup_test(
        CoreFetchConfig::default(),
        vec![(random_peer_id(), Behavior::Fail)],
    );
    match fetch.request(Hint::Poet, hash).await {
        Err(MsError::Exhausted { .. }) => (),
        oth => panic!("unexpected {oth:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn mismatched_batch_id_is_retried() {
    let (hash, data) = random_artifact();
    let confused = random_peer_id();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![
            (confused, Behavior::WrongId),
            (
                random_peer_id(),
                Behavior::Serve(HashMap::from([(hash, data.clone())])),
            ),
        ],
    );

    assert_eq!(data, fetch.request(Hint::Ballot, hash).await.unwrap());
    let sent = requests_sent.lock().unwrap();
    if sent[0].0 == confused {
        assert_eq!(2, sent.len());
        assert!(fetch
            .ctx
            .state
            .lock()
            .unwrap()
            .back_off_list
            .is_peer_on_back_off(&confused));
    }
}

#[tokio::test(start_paused = true)]
async fn corrupt_data_is_never_accepted() {
    let (hash, data) = random_artifact();
    let corrupt = random_peer_id();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![
            (corrupt, Behavior::Corrupt),
            (
                random_peer_id(),
                Behavior::Serve(HashMap::from([(hash, data.clone())])),
            ),
        ],
    );

    assert_eq!(data, fetch.request(Hint::Proposal, hash).await.unwrap());
    let sent = requests_sent.lock().unwrap();
    assert_eq!(
        1,
        sent.iter().filter(|(p, _)| *p == corrupt).count(),
        "the corrupt peer is asked once at most"
    );

    // a corrupt peer alone never resolves with data
    let TestCase { fetch, .. } = setup_test(
        CoreFetchConfig::default(),
        vec![(corrupt, Behavior::Corrupt)],
    );
    assert!(matches!(
        fetch.request(Hint::Proposal, hash).await,
        Err(MsError::Exhausted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_is_pruned() {
    let (hash, data) = random_artifact();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig {
            batch_delay_ms: 1_000,
            ..Default::default()
        },
        vec![(
            random_peer_id(),
            Behavior::Serve(HashMap::from([(hash, data)])),
        )],
    );

    let a = fetch.request(Hint::Tx, hash);
    let b = fetch.request(Hint::Tx, hash);
    a.cancel();
    assert_eq!(1, fetch.pending_count());
    drop(b);
    assert_eq!(0, fetch.pending_count());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(requests_sent.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn remaining_waiters_survive_cancellation() {
    let (hash, data) = random_artifact();
    let TestCase { fetch, .. } = setup_test(
        CoreFetchConfig::default(),
        vec![(
            random_peer_id(),
            Behavior::Serve(HashMap::from([(hash, data.clone())])),
        )],
    );

    let a = fetch.request(Hint::Tx, hash);
    let b = fetch.request(Hint::Tx, hash);
    drop(a);
    assert_eq!(data, b.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_resolves_pending_requests() {
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig {
            batch_delay_ms: 60_000,
            ..Default::default()
        },
        vec![(random_peer_id(), Behavior::Serve(HashMap::new()))],
    );

    let handles = (0..5)
        .map(|_| fetch.request(Hint::Malfeasance, random_hash()))
        .collect::<Vec<_>>();
    fetch.shutdown();

    for result in futures::future::join_all(handles).await {
        assert!(matches!(result, Err(MsError::Shutdown)));
    }
    assert!(matches!(
        fetch.request(Hint::Malfeasance, random_hash()).await,
        Err(MsError::Shutdown)
    ));
    assert!(requests_sent.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_fetch_resolves_pending_requests() {
    let TestCase { fetch, .. } = setup_test(
        CoreFetchConfig {
            batch_delay_ms: 60_000,
            ..Default::default()
        },
        vec![],
    );
    let handle = fetch.request(Hint::ActiveSet, random_hash());
    drop(fetch);
    assert!(matches!(handle.await, Err(MsError::Shutdown)));
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_keep_flowing() {
    let artifacts = (0..30).map(|_| random_artifact()).collect::<Vec<_>>();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig {
            batch_delay_ms: 5,
            ..Default::default()
        },
        vec![(
            random_peer_id(),
            Behavior::Serve(artifacts.iter().cloned().collect()),
        )],
    );

    let fetch = Arc::new(fetch);
    let mut tasks = JoinSet::new();
    for (hash, data) in artifacts.iter().cloned() {
        let fetch = fetch.clone();
        tasks.spawn(async move {
            assert_eq!(data, fetch.request(Hint::Ballot, hash).await.unwrap());
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    iter_check!({
        if fetch.pending_count() == 0 {
            break;
        }
    });
    assert_eq!(30, sent_hashes(&requests_sent).len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_from_many_tasks_are_deduplicated() {
    const TASKS: usize = 16;
    let (hash, data) = random_artifact();
    let TestCase {
        fetch,
        requests_sent,
        ..
    } = setup_test(
        CoreFetchConfig {
            batch_delay_ms: 500,
            ..Default::default()
        },
        vec![(
            random_peer_id(),
            Behavior::Serve(HashMap::from([(hash, data.clone())])),
        )],
    );

    let fetch = Arc::new(fetch);
    let barrier = Arc::new(tokio::sync::Barrier::new(TASKS + 1));
    let mut tasks = JoinSet::new();
    for _ in 0..TASKS {
        let fetch = fetch.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            let handle = fetch.request(Hint::Ballot, hash);
            barrier.wait().await;
            handle.await
        });
    }
    barrier.wait().await;
    assert_eq!(1, fetch.pending_count());

    while let Some(res) = tasks.join_next().await {
        assert_eq!(data, res.unwrap().unwrap());
    }
    assert_eq!(vec![hash], sent_hashes(&requests_sent));
}

#[tokio::test(start_paused = true)]
async fn batches_in_flight_per_peer_are_limited() {
    let artifacts = (0..400).map(|_| random_artifact()).collect::<Vec<_>>();
    for parallel_request_count in [2, 5] {
        let TestCase {
            fetch,
            requests_sent,
            concurrency,
            ..
        } = setup_test(
            CoreFetchConfig {
                parallel_request_count,
                ..Default::default()
            },
            vec![(
                random_peer_id(),
                Behavior::Slow(artifacts.iter().cloned().collect()),
            )],
        );

        let results = fetch
            .request_all(
                Hint::Tx,
                artifacts.iter().map(|(hash, _)| *hash).collect(),
            )
            .await;
        assert!(results.iter().all(|(_, result)| result.is_ok()));

        assert_eq!(
            parallel_request_count as usize,
            concurrency.max.load(Ordering::SeqCst)
        );
        let sent = requests_sent.lock().unwrap();
        assert_eq!(20, sent.len());
        assert!(sent.iter().all(|(_, r)| r.len() == 20));
        assert!(fetch.ctx.state.lock().unwrap().in_flight.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_peer_times_out_and_is_backed_off() {
    let (hash, data) = random_artifact();
    let hanging = random_peer_id();
    let serving = random_peer_id();
    let TestCase {
        fetch,
        requests_sent,
        peers,
        ..
    } = setup_test(
        CoreFetchConfig::default(),
        vec![
            (hanging, Behavior::Hang),
            (serving, Behavior::Serve(HashMap::from([(hash, data.clone())]))),
        ],
    );

    // only the hanging peer is known when the request goes out
    peers.set(vec![hanging]);
    let start = tokio::time::Instant::now();
    let handle = fetch.request(Hint::Block, hash);
    iter_check!({
        if !requests_sent.lock().unwrap().is_empty() {
            break;
        }
    });
    peers.set(vec![hanging, serving]);

    assert_eq!(data, handle.await.unwrap());
    assert!(start.elapsed() >= Duration::from_millis(10_000));

    let sent = requests_sent
        .lock()
        .unwrap()
        .iter()
        .map(|(p, _)| *p)
        .collect::<Vec<_>>();
    assert_eq!(vec![hanging, serving], sent);
    let lock = fetch.ctx.state.lock().unwrap();
    assert!(lock.back_off_list.is_peer_on_back_off(&hanging));
    assert!(!lock.back_off_list.is_peer_on_back_off(&serving));
    assert!(lock.in_flight.is_empty());
}
