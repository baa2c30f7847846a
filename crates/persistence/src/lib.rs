#![deny(warnings)]

//! Persistence layer: the store the resolution engine talks to.
//!
//! [`GameStore`] is the seam. [`MemoryStore`] backs tests and headless runs,
//! [`SqliteStore`] is the durable backend with schema migrations.
//!
//! Two operations carry the concurrency contract:
//! - [`GameStore::claim_quarter`] is a compare-and-set `active → resolving`;
//!   exactly one caller ever wins it.
//! - [`GameStore::commit_resolution`] writes every effect of a resolved
//!   quarter as one unit, and only while the caller still holds the claim.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sim_core::{
    Game, GameId, GameSettings, Player, PlayerId, PlayerResources, PolicyChoices, Quarter,
    QuarterId, QuarterResult, SnapshotMetrics,
};
use std::collections::BTreeMap;
use std::future::Future;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::{init_db, SqliteStore};

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/quarterly.db"
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("{0} not found")]
    NotFound(String),
    /// The quarter is no longer held by the claim this commit was made under.
    #[error("claim on {0} is no longer held")]
    StaleClaim(QuarterId),
    /// The quarter stopped taking submissions once it was claimed.
    #[error("{0} is no longer accepting submissions")]
    QuarterClosed(QuarterId),
}

/// What happens to the game once a quarter is committed.
#[derive(Clone, Debug, PartialEq)]
pub enum GameAdvance {
    /// Open quarter `number` and make it the game's current quarter.
    Next {
        number: u32,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    Complete,
}

/// Every write produced by resolving one quarter.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionCommit {
    pub quarter_id: QuarterId,
    pub game_id: GameId,
    /// Claim token: must match the quarter's `claimed_at` at commit time.
    pub claimed_at: DateTime<Utc>,
    pub result: QuarterResult,
    pub snapshots: Vec<SnapshotMetrics>,
    pub advance: GameAdvance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A queued request to resolve a quarter.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionJob {
    pub id: JobId,
    pub quarter_id: QuarterId,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Storage operations consumed by the orchestrator and lobby.
///
/// Methods return `Send` futures so callers can drive them from spawned tasks.
pub trait GameStore: Send + Sync {
    /// Insert a `waiting` game with `current_quarter` 0.
    fn create_game(
        &self,
        settings: &GameSettings,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    /// Join `name` to a game with `resources` as both current and starting state.
    fn add_player(
        &self,
        game_id: GameId,
        name: &str,
        resources: &PlayerResources,
    ) -> impl Future<Output = Result<Player, StoreError>> + Send;

    fn load_game(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Option<Game>, StoreError>> + Send;

    /// The game and its players ordered by id.
    fn load_game_with_players(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Option<(Game, Vec<Player>)>, StoreError>> + Send;

    /// Move a `waiting` game to `active` and open quarter 1.
    ///
    /// Returns `None` if the game was not `waiting`.
    fn start_game(
        &self,
        game_id: GameId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Quarter>, StoreError>> + Send;

    fn load_quarter(
        &self,
        quarter_id: QuarterId,
    ) -> impl Future<Output = Result<Option<Quarter>, StoreError>> + Send;

    fn active_quarter(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Option<Quarter>, StoreError>> + Send;

    /// `active` quarters whose deadline is before `now`.
    fn expired_quarters(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Quarter>, StoreError>> + Send;

    /// `resolving` quarters claimed before `cutoff`.
    fn stale_claims(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Quarter>, StoreError>> + Send;

    /// Atomic `active → resolving`. `true` only for the single winning caller.
    fn claim_quarter(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Take over a `resolving` quarter whose claim is older than `cutoff`.
    fn reclaim_quarter(
        &self,
        quarter_id: QuarterId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// One submission per player per quarter; the last write wins.
    ///
    /// Fails with [`StoreError::QuarterClosed`] unless the quarter is still `active`.
    fn upsert_submission(
        &self,
        quarter_id: QuarterId,
        player_id: PlayerId,
        policies: &PolicyChoices,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_submissions(
        &self,
        quarter_id: QuarterId,
    ) -> impl Future<Output = Result<BTreeMap<PlayerId, PolicyChoices>, StoreError>> + Send;

    /// Persist outcomes, the quarter result and snapshots, complete the quarter,
    /// drop its submissions and advance the game, all or nothing.
    ///
    /// Fails with [`StoreError::StaleClaim`] and writes nothing if the quarter
    /// is not `resolving` under `commit.claimed_at`.
    fn commit_resolution(
        &self,
        commit: &ResolutionCommit,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_quarter_result(
        &self,
        quarter_id: QuarterId,
    ) -> impl Future<Output = Result<Option<QuarterResult>, StoreError>> + Send;

    /// Chart history for a game as `(quarter number, metrics)`, oldest first.
    fn load_snapshots(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Vec<(u32, SnapshotMetrics)>, StoreError>> + Send;

    /// Queue a resolution job. At most one pending job per quarter; returns
    /// `None` when one is already queued.
    fn enqueue_job(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<JobId>, StoreError>> + Send;

    /// Pending jobs, oldest first.
    fn pending_jobs(&self) -> impl Future<Output = Result<Vec<ResolutionJob>, StoreError>> + Send;

    fn complete_job(&self, job_id: JobId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Count a failed attempt; the job turns `failed` once `max_attempts` is reached.
    fn record_job_failure(
        &self,
        job_id: JobId,
        error: &str,
        max_attempts: u32,
    ) -> impl Future<Output = Result<JobStatus, StoreError>> + Send;
}
