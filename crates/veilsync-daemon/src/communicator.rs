//! The daemon loop.
//!
//! One [`Communicator`] ticks on a fixed interval. Each tick it drains the
//! command queue and then, on their own cadences, runs:
//!
//! 1. peer exchange: ask a random sample of addresses for the addresses
//!    and public keys they know, and merge them into the directory;
//! 2. reconciliation: compare each address's block-index digest with the
//!    one seen last time and, when it moved, record the hashes it lists as
//!    pending;
//! 3. download: fetch every pending block from the first address that
//!    returns content matching its hash;
//! 4. decay: lower failure counters that hit the ceiling.
//!
//! Tasks run one after another; nothing inside a tick overlaps. Every
//! network call is bounded by the transport's timeouts and a failure only
//! skips that address. A `shutdown` command ends the loop after the tick
//! it was read in.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use veilsync_net::{split_lines, Fetched, PeerAction, PeerTransport};
use veilsync_shared::constants::DEFAULT_POW_WORKERS;
use veilsync_shared::pow::{PowState, ProofOfWork, StaticBeacon};
use veilsync_shared::{BlockHash, PeerAddress};
use veilsync_store::StoreError;

use crate::node::{Node, SHUTDOWN_COMMAND};
use crate::session::SessionTracker;

/// Longest digest accepted from a peer.
const MAX_DIGEST_LEN: usize = 128;

const POW_POLL: Duration = Duration::from_millis(20);

/// Cadences and limits for the daemon loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub tick: Duration,
    pub pex_every: u64,
    pub sync_every: u64,
    pub decay_every: u64,
    pub pex_sample: usize,
    pub failure_ceiling: u32,
    pub exchange_pow: usize,
    pub pow_workers: usize,
    /// Exchange rounds unsolved after this long go out without a token.
    pub pow_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            pex_every: 10,
            sync_every: 5,
            decay_every: 30,
            pex_sample: 5,
            failure_ceiling: 5,
            exchange_pow: 0,
            pow_workers: DEFAULT_POW_WORKERS,
            pow_timeout: Duration::from_secs(30),
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub contacted: usize,
    pub changed: usize,
    pub new_hashes: usize,
}

pub struct Communicator<T: PeerTransport> {
    node: Node,
    transport: T,
    settings: SyncSettings,
    sessions: SessionTracker,
    ticks: u64,
    stopping: bool,
}

impl<T: PeerTransport> Communicator<T> {
    pub fn new(node: Node, transport: T, settings: SyncSettings) -> Self {
        Self {
            node,
            transport,
            settings,
            sessions: SessionTracker::new(),
            ticks: 0,
            stopping: false,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick until a `shutdown` command arrives, then fold the session
    /// statistics into the address directory.
    pub async fn run(&mut self) {
        info!(
            tick = ?self.settings.tick,
            pex_every = self.settings.pex_every,
            sync_every = self.settings.sync_every,
            decay_every = self.settings.decay_every,
            "Communicator started"
        );

        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !self.tick().await {
                break;
            }
        }

        self.flush_sessions();
        info!(ticks = self.ticks, "Communicator stopped");
    }

    /// Run one tick. Returns `false` once a shutdown has been requested.
    pub async fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.poll_commands();

        if self.due(self.settings.pex_every) {
            self.peer_exchange().await;
        }
        if self.due(self.settings.sync_every) {
            self.reconcile().await;
            self.download().await;
        }
        if self.due(self.settings.decay_every) {
            let decayed = self.sessions.decay(self.settings.failure_ceiling);
            if decayed > 0 {
                debug!(count = decayed, "Decayed failure counters");
            }
        }

        !self.stopping
    }

    fn due(&self, every: u64) -> bool {
        every > 0 && self.ticks % every == 0
    }

    fn poll_commands(&mut self) {
        loop {
            let command = match self.node.database().pop_command() {
                Ok(Some(command)) => command,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "Failed to read command queue");
                    return;
                }
            };

            match command.command.as_str() {
                SHUTDOWN_COMMAND => {
                    info!(id = command.id, "Shutdown requested");
                    self.stopping = true;
                }
                other => warn!(id = command.id, command = %other, "Ignoring unknown command"),
            }
        }
    }

    /// Contact `address`, recording the outcome in the session tracker.
    async fn contact(&mut self, address: &PeerAddress, action: &PeerAction) -> Fetched {
        let fetched = self.transport.request(address, action).await;
        if fetched.is_available() {
            self.sessions.record_success(address);
        } else {
            self.sessions.record_failure(address);
        }
        fetched
    }

    /// Known addresses in random order, minus those over the failure ceiling.
    fn contactable_addresses(&self) -> Vec<PeerAddress> {
        match self.node.database().list_addresses(true) {
            Ok(addresses) => addresses
                .into_iter()
                .filter(|a| !self.sessions.is_high_failure(a, self.settings.failure_ceiling))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list addresses");
                Vec::new()
            }
        }
    }

    // -- Peer exchange -------------------------------------------------------

    /// Returns how many new addresses and keys were learned.
    pub async fn peer_exchange(&mut self) -> (usize, usize) {
        let sample: Vec<PeerAddress> = self
            .contactable_addresses()
            .into_iter()
            .take(self.settings.pex_sample)
            .collect();
        if sample.is_empty() {
            return (0, 0);
        }

        let token = self.exchange_token().await;
        let own_key = self.node.public_key();
        let (mut new_addresses, mut new_keys) = (0, 0);

        for address in &sample {
            if let Some(body) = self.contact(address, &PeerAction::Pex).await.into_data() {
                for line in split_lines(&body) {
                    match self.node.database().add_address(&line) {
                        Ok(true) => new_addresses += 1,
                        Ok(false) => {}
                        Err(StoreError::Invalid(e)) => {
                            debug!(from = %address, error = %e, "Dropping gossiped address")
                        }
                        Err(e) => warn!(error = %e, "Failed to store address"),
                    }
                }
            }

            let kex = PeerAction::Kex(token.clone());
            if let Some(body) = self.contact(address, &kex).await.into_data() {
                for key in split_lines(&body) {
                    if key == own_key {
                        continue;
                    }
                    match self.node.database().add_peer(&key, "") {
                        Ok(true) => new_keys += 1,
                        Ok(false) => {}
                        Err(StoreError::Invalid(e)) => {
                            debug!(from = %address, error = %e, "Dropping gossiped key")
                        }
                        Err(e) => warn!(error = %e, "Failed to store peer key"),
                    }
                }
            }
        }

        info!(
            contacted = sample.len(),
            new_addresses,
            new_keys,
            "Peer exchange finished"
        );
        (new_addresses, new_keys)
    }

    /// Solve one challenge for this exchange round when gating is enabled.
    async fn exchange_token(&self) -> Option<String> {
        let difficulty = self.settings.exchange_pow;
        if difficulty == 0 {
            return None;
        }

        let beacon = match self.node.blocks().digest() {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "Failed to read digest for proof of work");
                return None;
            }
        };
        let mut pow = match ProofOfWork::start(
            difficulty,
            Arc::new(StaticBeacon(beacon)),
            self.settings.pow_workers,
        ) {
            Ok(pow) => pow,
            Err(e) => {
                warn!(error = %e, "Proof of work failed");
                return None;
            }
        };

        let deadline = tokio::time::Instant::now() + self.settings.pow_timeout;
        let token = loop {
            match pow.state() {
                PowState::Solved => break pow.get_result(),
                PowState::Solving if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(POW_POLL).await;
                }
                PowState::Solving => {
                    warn!(
                        difficulty,
                        timeout = ?self.settings.pow_timeout,
                        "Exchange challenge not solved in time, sending without token"
                    );
                    break None;
                }
                PowState::Idle | PowState::Cancelled => break None,
            }
        };

        let puzzle = pow.puzzle().to_string();
        // workers see the solved or cancelled flag within one attempt
        let stopped = tokio::task::spawn_blocking(move || pow.shutdown()).await;
        if let Err(e) = stopped {
            warn!(error = %e, "Proof of work task failed");
        }

        if token.is_some() {
            debug!(difficulty, puzzle = %puzzle, "Solved exchange challenge");
        }
        token
    }

    // -- Reconciliation ------------------------------------------------------

    pub async fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for address in self.contactable_addresses() {
            let Some(remote) = self
                .contact(&address, &PeerAction::GetDbHash)
                .await
                .into_text()
            else {
                continue;
            };
            report.contacted += 1;
            if remote.len() > MAX_DIGEST_LEN {
                debug!(address = %address, "Ignoring oversized digest");
                continue;
            }

            let stored = match self.node.database().address_digest(&address) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to read stored digest");
                    continue;
                }
            };
            if stored.as_deref() == Some(remote.as_str()) {
                debug!(address = %address, "Digest unchanged");
                continue;
            }
            report.changed += 1;

            // a failed listing keeps the old digest so the next pass retries
            let Some(body) = self
                .contact(&address, &PeerAction::GetBlockHashes)
                .await
                .into_data()
            else {
                continue;
            };

            let mut added = 0;
            for line in split_lines(&body) {
                match self.node.blocks().record_known_hash(&line, false) {
                    Ok(true) => added += 1,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Failed to record block hash"),
                }
            }
            report.new_hashes += added;

            if let Err(e) = self.node.database().set_address_digest(&address, &remote) {
                warn!(address = %address, error = %e, "Failed to store digest");
            }
            debug!(address = %address, new_hashes = added, "Reconciled with peer");
        }

        if report.new_hashes > 0 {
            info!(
                contacted = report.contacted,
                changed = report.changed,
                new_hashes = report.new_hashes,
                "Reconciliation found new blocks"
            );
        }
        report
    }

    // -- Download ------------------------------------------------------------

    /// Fetch pending blocks. Returns how many were saved.
    pub async fn download(&mut self) -> usize {
        let pending = match self.node.blocks().list_unsaved() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to list pending blocks");
                return 0;
            }
        };
        if pending.is_empty() {
            return 0;
        }

        let addresses = self.contactable_addresses();
        let mut saved = 0;
        for hash in &pending {
            if self.download_block(hash, &addresses).await {
                saved += 1;
            }
        }

        info!(pending = pending.len(), saved, "Download pass finished");
        saved
    }

    /// Try `addresses` in turn until one returns content matching `hash`.
    async fn download_block(&mut self, hash: &BlockHash, addresses: &[PeerAddress]) -> bool {
        let empty = BlockHash::of(b"");
        let action = PeerAction::GetData(hash.clone());

        for address in addresses {
            if self
                .sessions
                .is_high_failure(address, self.settings.failure_ceiling)
            {
                continue;
            }
            let Some(data) = self.contact(address, &action).await.into_data() else {
                continue;
            };
            if data.is_empty() && *hash != empty {
                debug!(address = %address, hash = %hash.short(), "Peer does not have block");
                continue;
            }

            match self.node.blocks().put_verified(hash, &data) {
                Ok(true) => {
                    debug!(address = %address, hash = %hash.short(), "Downloaded block");
                    return true;
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(hash = %hash.short(), error = %e, "Failed to store block");
                    return false;
                }
            }
        }
        false
    }

    // -- Shutdown ------------------------------------------------------------

    /// Add this run's contact counts to the persisted address statistics.
    pub fn flush_sessions(&mut self) {
        let sessions = self.sessions.drain();
        for (address, stats) in &sessions {
            if let Err(e) = self.node.database().record_session_outcome(
                address,
                stats.connect_count,
                stats.fail_count,
            ) {
                warn!(address = %address, error = %e, "Failed to persist session statistics");
            }
        }
        debug!(count = sessions.len(), "Flushed session statistics");
    }
}
