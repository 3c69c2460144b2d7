//! Proof-of-work challenge generator.
//!
//! A round derives a fresh puzzle hash and races `workers` OS threads to find
//! a token whose leading `difficulty` hex characters match the puzzle's.
//! Tokens are BLAKE3 over fresh randomness plus the current value of an
//! external [`Beacon`], so they cannot be computed ahead of time.
//!
//! The first worker to match flips the round's `solved` flag while holding
//! the result slot, so exactly one token is recorded per round. Every other
//! worker polls the flag on each attempt and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rand::RngCore;
use tracing::debug;

use crate::constants::BLOCK_HASH_LEN;
use crate::error::PowError;

/// Attempts between beacon refreshes in a worker.
const BEACON_REFRESH: u64 = 1024;

/// An unpredictable, externally verifiable seed such as a recent block hash.
pub trait Beacon: Send + Sync {
    fn current(&self) -> String;
}

/// A beacon whose value is fixed for the lifetime of the challenge.
#[derive(Debug, Clone)]
pub struct StaticBeacon(pub String);

impl Beacon for StaticBeacon {
    fn current(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowState {
    Idle,
    Solving,
    Solved,
    Cancelled,
}

#[derive(Default)]
struct Round {
    solved: AtomicBool,
    cancelled: AtomicBool,
    result: Mutex<Option<String>>,
}

impl Round {
    fn should_stop(&self) -> bool {
        self.solved.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire)
    }

    /// Record `token` unless another worker already won or the round was cancelled.
    fn offer(&self, token: String) -> bool {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        if self
            .solved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *slot = Some(token);
        true
    }

    fn take(&self) -> Option<String> {
        self.result.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// A solved challenge: the puzzle it answers and the winning token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSolution {
    pub puzzle: String,
    pub token: String,
    pub difficulty: usize,
}

pub struct ProofOfWork {
    difficulty: usize,
    workers: usize,
    beacon: Arc<dyn Beacon>,
    puzzle: String,
    round: Arc<Round>,
    handles: Vec<JoinHandle<()>>,
}

impl ProofOfWork {
    /// An idle generator; call [`ProofOfWork::start_round`] to begin solving.
    pub fn new(
        difficulty: usize,
        beacon: Arc<dyn Beacon>,
        workers: usize,
    ) -> Result<Self, PowError> {
        check_difficulty(difficulty)?;
        if workers == 0 {
            return Err(PowError::NoWorkers);
        }
        Ok(Self {
            difficulty,
            workers,
            beacon,
            puzzle: String::new(),
            round: Arc::new(Round::default()),
            handles: Vec::new(),
        })
    }

    /// Construct and immediately start solving the first round.
    pub fn start(
        difficulty: usize,
        beacon: Arc<dyn Beacon>,
        workers: usize,
    ) -> Result<Self, PowError> {
        let mut pow = Self::new(difficulty, beacon, workers)?;
        pow.start_round()?;
        Ok(pow)
    }

    /// Solve one round to completion on the calling thread's behalf.
    pub fn solve(
        difficulty: usize,
        beacon: Arc<dyn Beacon>,
        workers: usize,
    ) -> Result<Option<PowSolution>, PowError> {
        let mut pow = Self::start(difficulty, beacon, workers)?;
        pow.wait();
        let puzzle = pow.puzzle.clone();
        Ok(pow.get_result().map(|token| PowSolution {
            puzzle,
            token,
            difficulty,
        }))
    }

    /// Derive a new puzzle at the current difficulty and spawn the workers.
    pub fn start_round(&mut self) -> Result<(), PowError> {
        if self.state() == PowState::Solving {
            return Err(PowError::AlreadySolving);
        }
        self.join_workers();

        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        self.puzzle = blake3::hash(&seed).to_hex().to_string();
        self.round = Arc::new(Round::default());

        debug!(
            difficulty = self.difficulty,
            workers = self.workers,
            puzzle = %self.puzzle,
            "starting proof-of-work round"
        );

        let prefix = self.puzzle[..self.difficulty].to_string();
        for _ in 0..self.workers {
            let round = Arc::clone(&self.round);
            let beacon = Arc::clone(&self.beacon);
            let prefix = prefix.clone();
            self.handles
                .push(std::thread::spawn(move || work(&round, &prefix, beacon.as_ref())));
        }
        Ok(())
    }

    /// Applies to rounds started after this call.
    pub fn change_difficulty(&mut self, difficulty: usize) -> Result<(), PowError> {
        check_difficulty(difficulty)?;
        self.difficulty = difficulty;
        Ok(())
    }

    /// Stop all workers without recording a solution.
    pub fn shutdown(&mut self) {
        self.round.cancelled.store(true, Ordering::Release);
        self.join_workers();
    }

    /// Block until the current round is solved or cancelled.
    pub fn wait(&mut self) {
        self.join_workers();
    }

    /// Returns the winning token once, then `None` until another round solves.
    pub fn get_result(&mut self) -> Option<String> {
        self.round.take()
    }

    pub fn state(&self) -> PowState {
        if self.round.solved.load(Ordering::Acquire) {
            PowState::Solved
        } else if self.round.cancelled.load(Ordering::Acquire) {
            PowState::Cancelled
        } else if self.handles.iter().any(|h| !h.is_finished()) {
            PowState::Solving
        } else {
            PowState::Idle
        }
    }

    pub fn puzzle(&self) -> &str {
        &self.puzzle
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    fn join_workers(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ProofOfWork {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Check that `token` answers `puzzle` at `difficulty`.
pub fn verify(token: &str, puzzle: &str, difficulty: usize) -> bool {
    difficulty <= BLOCK_HASH_LEN
        && token.len() >= difficulty
        && puzzle.len() >= difficulty
        && token.as_bytes()[..difficulty].eq_ignore_ascii_case(&puzzle.as_bytes()[..difficulty])
}

fn check_difficulty(difficulty: usize) -> Result<(), PowError> {
    if difficulty > BLOCK_HASH_LEN {
        return Err(PowError::DifficultyTooHigh(difficulty));
    }
    Ok(())
}

fn work(round: &Round, prefix: &str, beacon: &dyn Beacon) {
    let mut rng = rand::thread_rng();
    let mut nonce = [0u8; 32];
    let mut beacon_value = beacon.current();
    let mut attempts: u64 = 0;

    while !round.should_stop() {
        if attempts > 0 && attempts % BEACON_REFRESH == 0 {
            beacon_value = beacon.current();
        }
        attempts += 1;

        rng.fill_bytes(&mut nonce);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&nonce);
        hasher.update(beacon_value.as_bytes());
        let token = hasher.finalize().to_hex();

        if token.starts_with(prefix) {
            if round.offer(token.to_string()) {
                debug!(attempts, token = %token, "proof-of-work solved");
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon() -> Arc<dyn Beacon> {
        Arc::new(StaticBeacon("00000000000000000001a2b3".to_string()))
    }

    #[test]
    fn test_solution_matches_puzzle_prefix() {
        let solution = ProofOfWork::solve(2, beacon(), 3).unwrap().unwrap();
        assert_eq!(solution.token[..2], solution.puzzle[..2]);
        assert!(verify(&solution.token, &solution.puzzle, 2));
    }

    #[test]
    fn test_result_is_read_once() {
        let mut pow = ProofOfWork::start(1, beacon(), 4).unwrap();
        pow.wait();
        assert_eq!(pow.state(), PowState::Solved);

        let token = pow.get_result().expect("solved");
        assert_eq!(token[..1], pow.puzzle()[..1]);
        assert_eq!(pow.get_result(), None);
    }

    #[test]
    fn test_exactly_one_winner_with_many_workers() {
        // difficulty 0 matches on the first attempt for every worker
        let mut pow = ProofOfWork::start(0, beacon(), 8).unwrap();
        pow.wait();
        assert!(pow.get_result().is_some());
        assert!(pow.get_result().is_none());
    }

    #[test]
    fn test_shutdown_before_match_has_no_result() {
        let mut pow = ProofOfWork::start(64, beacon(), 2).unwrap();
        assert_eq!(pow.state(), PowState::Solving);
        pow.shutdown();
        assert_eq!(pow.state(), PowState::Cancelled);
        assert_eq!(pow.get_result(), None);
    }

    #[test]
    fn test_change_difficulty_applies_to_next_round() {
        let mut pow = ProofOfWork::start(1, beacon(), 2).unwrap();
        pow.change_difficulty(2).unwrap();
        pow.wait();
        assert!(pow.get_result().is_some());

        pow.start_round().unwrap();
        pow.wait();
        let token = pow.get_result().unwrap();
        assert!(verify(&token, pow.puzzle(), 2));
    }

    #[test]
    fn test_start_round_while_solving_rejected() {
        let mut pow = ProofOfWork::start(64, beacon(), 1).unwrap();
        assert_eq!(pow.start_round(), Err(PowError::AlreadySolving));
        pow.shutdown();
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            ProofOfWork::new(65, beacon(), 1),
            Err(PowError::DifficultyTooHigh(65))
        ));
        assert!(matches!(
            ProofOfWork::new(1, beacon(), 0),
            Err(PowError::NoWorkers)
        ));
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        assert!(!verify("ab", "cd", 1));
        assert!(verify("AB12", "ab34", 2));
        assert!(!verify("a", "abc", 2));
    }
}
