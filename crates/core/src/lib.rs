#![deny(missing_docs)]
//! Meshsync data fetch and mesh synchronization.
//!
//! - [core_fetch::CoreFetch] coalesces artifact requests by content hash
//!   into batched round trips to peers.
//! - [core_fork_finder::ForkFinder] locates where the local mesh and a
//!   peer's mesh diverge.
//! - [core_responder::CoreResponder] answers the requests of other peers.
//! - [peer_client::PeerClient] performs single typed requests.

use core_fetch::config::CoreFetchConfig;
use core_fork_finder::config::ForkFinderConfig;
use meshsync_api::{config::Config, MsResult};
use peer_client::config::PeerClientConfig;

/// A configuration holding the default config of every core module.
///
/// Serialize this to produce an example configuration file.
pub fn default_config() -> MsResult<Config> {
    let mut config = Config::default();
    config.add_default_module_config::<CoreFetchConfig>()?;
    config.add_default_module_config::<ForkFinderConfig>()?;
    config.add_default_module_config::<PeerClientConfig>()?;
    Ok(config)
}

pub mod core_fetch;
pub mod core_fork_finder;
pub mod core_responder;
pub mod mem_store;
pub mod mem_transport;
pub mod peer_client;
