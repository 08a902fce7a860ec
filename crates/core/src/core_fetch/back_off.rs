use backon::BackoffBuilder;
use meshsync_api::PeerId;
use std::{
    collections::{hash_map::Entry, HashMap},
    time::Duration,
};
use tokio::time::Instant;

/// Peers that failed at the transport level, with exponentially growing
/// intervals during which they are not asked for anything.
#[derive(Debug)]
pub struct BackOffList {
    pub(crate) state: HashMap<PeerId, BackOff>,
    first_back_off_interval_ms: u32,
    last_back_off_interval_ms: u32,
    num_back_off_intervals: usize,
}

impl BackOffList {
    pub fn new(
        first_back_off_interval_ms: u32,
        last_back_off_interval_ms: u32,
        num_back_off_intervals: usize,
    ) -> Self {
        Self {
            state: HashMap::new(),
            first_back_off_interval_ms,
            last_back_off_interval_ms,
            num_back_off_intervals,
        }
    }

    /// Start or extend the back off of a peer.
    pub fn back_off_peer(&mut self, peer: &PeerId) {
        match self.state.entry(*peer) {
            Entry::Occupied(mut o) => {
                o.get_mut().back_off();
            }
            Entry::Vacant(v) => {
                v.insert(BackOff::new(
                    self.first_back_off_interval_ms,
                    self.last_back_off_interval_ms,
                    self.num_back_off_intervals,
                ));
            }
        }
    }

    pub fn is_peer_on_back_off(&self, peer: &PeerId) -> bool {
        match self.state.get(peer) {
            Some(back_off) => back_off.is_on_back_off(),
            None => false,
        }
    }

    /// Forget a peer, called after a successful round trip.
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.state.remove(peer);
    }
}

#[derive(Debug)]
pub(crate) struct BackOff {
    back_off: backon::ExponentialBackoff,
    pub(crate) current_interval: Duration,
    interval_start: Instant,
}

impl BackOff {
    pub fn new(
        first_back_off_interval_ms: u32,
        last_back_off_interval_ms: u32,
        num_back_off_intervals: usize,
    ) -> Self {
        let first = Duration::from_millis(first_back_off_interval_ms as u64);
        let mut back_off = backon::ExponentialBuilder::default()
            .with_factor(2.0)
            .with_min_delay(first)
            .with_max_delay(Duration::from_millis(
                last_back_off_interval_ms as u64,
            ))
            .with_max_times(num_back_off_intervals)
            .build();
        // zero intervals still backs off once
        let current_interval = back_off.next().unwrap_or(first);
        Self {
            back_off,
            current_interval,
            interval_start: Instant::now(),
        }
    }

    /// Move on to the next interval. Once all intervals are used up the
    /// last one is repeated.
    pub fn back_off(&mut self) {
        if let Some(interval) = self.back_off.next() {
            self.current_interval = interval;
        }
        self.interval_start = Instant::now();
    }

    pub fn is_on_back_off(&self) -> bool {
        self.interval_start.elapsed() < self.current_interval
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use meshsync_test_utils::id::random_peer_id;

    #[tokio::test(start_paused = true)]
    async fn back_off() {
        let mut back_off_list = BackOffList::new(10, 40, 3);
        let peer = random_peer_id();
        assert!(!back_off_list.is_peer_on_back_off(&peer));

        back_off_list.back_off_peer(&peer);
        assert!(back_off_list.is_peer_on_back_off(&peer));
        let first = back_off_list.state.get(&peer).unwrap().current_interval;
        assert_eq!(Duration::from_millis(10), first);

        tokio::time::sleep(first).await;
        assert!(!back_off_list.is_peer_on_back_off(&peer));

        back_off_list.back_off_peer(&peer);
        assert!(back_off_list.is_peer_on_back_off(&peer));
        let second = back_off_list.state.get(&peer).unwrap().current_interval;
        assert!(second > first);

        tokio::time::sleep(second).await;
        assert!(!back_off_list.is_peer_on_back_off(&peer));
    }

    #[tokio::test(start_paused = true)]
    async fn intervals_are_capped() {
        let mut back_off_list = BackOffList::new(10, 20, 2);
        let peer = random_peer_id();
        for _ in 0..10 {
            back_off_list.back_off_peer(&peer);
        }
        let interval = back_off_list.state.get(&peer).unwrap().current_interval;
        assert!(interval <= Duration::from_millis(20));
        assert!(back_off_list.is_peer_on_back_off(&peer));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!back_off_list.is_peer_on_back_off(&peer));
    }

    #[test]
    fn remove_peer() {
        let mut back_off_list = BackOffList::new(60_000, 60_000, 1);
        let peer = random_peer_id();
        back_off_list.back_off_peer(&peer);
        assert!(back_off_list.is_peer_on_back_off(&peer));
        back_off_list.remove_peer(&peer);
        assert!(!back_off_list.is_peer_on_back_off(&peer));
    }
}
