//! In-process store. One mutex guards all tables, so every method is atomic.

use crate::{
    GameAdvance, GameStore, JobId, JobStatus, ResolutionCommit, ResolutionJob, StoreError,
};
use chrono::{DateTime, Utc};
use sim_core::{
    Game, GameId, GameSettings, GameStatus, Player, PlayerId, PlayerResources, PolicyChoices,
    Quarter, QuarterId, QuarterResult, QuarterStatus, SnapshotMetrics,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    next_id: i64,
    games: BTreeMap<GameId, Game>,
    players: BTreeMap<PlayerId, Player>,
    quarters: BTreeMap<QuarterId, Quarter>,
    submissions: BTreeMap<(QuarterId, PlayerId), PolicyChoices>,
    results: BTreeMap<QuarterId, QuarterResult>,
    snapshots: Vec<(GameId, u32, SnapshotMetrics)>,
    jobs: BTreeMap<JobId, ResolutionJob>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl GameStore for MemoryStore {
    async fn create_game(
        &self,
        settings: &GameSettings,
        now: DateTime<Utc>,
    ) -> Result<Game, StoreError> {
        let mut t = self.lock()?;
        let game = Game {
            id: GameId(t.next_id()),
            settings: settings.clone(),
            status: GameStatus::Waiting,
            current_quarter: 0,
            created_at: now,
        };
        t.games.insert(game.id, game.clone());
        Ok(game)
    }

    async fn add_player(
        &self,
        game_id: GameId,
        name: &str,
        resources: &PlayerResources,
    ) -> Result<Player, StoreError> {
        let mut t = self.lock()?;
        if !t.games.contains_key(&game_id) {
            return Err(StoreError::NotFound(game_id.to_string()));
        }
        let player = Player {
            id: PlayerId(t.next_id()),
            game_id,
            name: name.to_string(),
            score: 0,
            resources: resources.clone(),
            starting_resources: resources.clone(),
            is_active: true,
        };
        t.players.insert(player.id, player.clone());
        Ok(player)
    }

    async fn load_game(&self, game_id: GameId) -> Result<Option<Game>, StoreError> {
        Ok(self.lock()?.games.get(&game_id).cloned())
    }

    async fn load_game_with_players(
        &self,
        game_id: GameId,
    ) -> Result<Option<(Game, Vec<Player>)>, StoreError> {
        let t = self.lock()?;
        let Some(game) = t.games.get(&game_id).cloned() else {
            return Ok(None);
        };
        let players = t
            .players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        Ok(Some((game, players)))
    }

    async fn start_game(
        &self,
        game_id: GameId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Option<Quarter>, StoreError> {
        let mut t = self.lock()?;
        match t.games.get(&game_id) {
            None => return Err(StoreError::NotFound(game_id.to_string())),
            Some(g) if g.status != GameStatus::Waiting => return Ok(None),
            Some(_) => {}
        }
        let quarter = Quarter {
            id: QuarterId(t.next_id()),
            game_id,
            number: 1,
            starts_at,
            ends_at,
            status: QuarterStatus::Active,
            claimed_at: None,
        };
        t.quarters.insert(quarter.id, quarter.clone());
        if let Some(game) = t.games.get_mut(&game_id) {
            game.status = GameStatus::Active;
            game.current_quarter = 1;
        }
        Ok(Some(quarter))
    }

    async fn load_quarter(&self, quarter_id: QuarterId) -> Result<Option<Quarter>, StoreError> {
        Ok(self.lock()?.quarters.get(&quarter_id).cloned())
    }

    async fn active_quarter(&self, game_id: GameId) -> Result<Option<Quarter>, StoreError> {
        Ok(self
            .lock()?
            .quarters
            .values()
            .find(|q| q.game_id == game_id && q.status == QuarterStatus::Active)
            .cloned())
    }

    async fn expired_quarters(&self, now: DateTime<Utc>) -> Result<Vec<Quarter>, StoreError> {
        Ok(self
            .lock()?
            .quarters
            .values()
            .filter(|q| q.status == QuarterStatus::Active && q.ends_at < now)
            .cloned()
            .collect())
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<Quarter>, StoreError> {
        Ok(self
            .lock()?
            .quarters
            .values()
            .filter(|q| {
                q.status == QuarterStatus::Resolving && q.claimed_at.is_some_and(|c| c < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn claim_quarter(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        match t.quarters.get_mut(&quarter_id) {
            Some(q) if q.status == QuarterStatus::Active => {
                q.status = QuarterStatus::Resolving;
                q.claimed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reclaim_quarter(
        &self,
        quarter_id: QuarterId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.lock()?;
        match t.quarters.get_mut(&quarter_id) {
            Some(q)
                if q.status == QuarterStatus::Resolving
                    && q.claimed_at.is_some_and(|c| c < cutoff) =>
            {
                q.claimed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_submission(
        &self,
        quarter_id: QuarterId,
        player_id: PlayerId,
        policies: &PolicyChoices,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        match t.quarters.get(&quarter_id) {
            None => return Err(StoreError::NotFound(quarter_id.to_string())),
            Some(q) if q.status != QuarterStatus::Active => {
                return Err(StoreError::QuarterClosed(quarter_id))
            }
            Some(_) => {}
        }
        t.submissions.insert((quarter_id, player_id), policies.clone());
        Ok(())
    }

    async fn load_submissions(
        &self,
        quarter_id: QuarterId,
    ) -> Result<BTreeMap<PlayerId, PolicyChoices>, StoreError> {
        Ok(self
            .lock()?
            .submissions
            .range((quarter_id, PlayerId(i64::MIN))..=(quarter_id, PlayerId(i64::MAX)))
            .map(|((_, player), policies)| (*player, policies.clone()))
            .collect())
    }

    async fn commit_resolution(&self, commit: &ResolutionCommit) -> Result<(), StoreError> {
        let mut t = self.lock()?;

        // Check everything before the first write.
        let number = match t.quarters.get(&commit.quarter_id) {
            Some(q)
                if q.status == QuarterStatus::Resolving
                    && q.claimed_at == Some(commit.claimed_at) =>
            {
                q.number
            }
            _ => return Err(StoreError::StaleClaim(commit.quarter_id)),
        };
        if !t.games.contains_key(&commit.game_id) {
            return Err(StoreError::NotFound(commit.game_id.to_string()));
        }
        if let Some(missing) = commit
            .result
            .outcomes
            .iter()
            .find(|o| !t.players.contains_key(&o.player_id))
        {
            return Err(StoreError::NotFound(missing.player_id.to_string()));
        }

        for outcome in &commit.result.outcomes {
            if let Some(player) = t.players.get_mut(&outcome.player_id) {
                player.resources = outcome.resources.clone();
                player.score = outcome.score.round() as i64;
            }
        }
        t.results.insert(commit.quarter_id, commit.result.clone());
        for snapshot in &commit.snapshots {
            t.snapshots.push((commit.game_id, number, snapshot.clone()));
        }
        if let Some(q) = t.quarters.get_mut(&commit.quarter_id) {
            q.status = QuarterStatus::Completed;
        }
        t.submissions.retain(|(q, _), _| *q != commit.quarter_id);

        match &commit.advance {
            GameAdvance::Next {
                number,
                starts_at,
                ends_at,
            } => {
                let quarter = Quarter {
                    id: QuarterId(t.next_id()),
                    game_id: commit.game_id,
                    number: *number,
                    starts_at: *starts_at,
                    ends_at: *ends_at,
                    status: QuarterStatus::Active,
                    claimed_at: None,
                };
                t.quarters.insert(quarter.id, quarter);
                if let Some(game) = t.games.get_mut(&commit.game_id) {
                    game.current_quarter = *number;
                }
            }
            GameAdvance::Complete => {
                if let Some(game) = t.games.get_mut(&commit.game_id) {
                    game.status = GameStatus::Completed;
                }
            }
        }
        Ok(())
    }

    async fn load_quarter_result(
        &self,
        quarter_id: QuarterId,
    ) -> Result<Option<QuarterResult>, StoreError> {
        Ok(self.lock()?.results.get(&quarter_id).cloned())
    }

    async fn load_snapshots(
        &self,
        game_id: GameId,
    ) -> Result<Vec<(u32, SnapshotMetrics)>, StoreError> {
        let t = self.lock()?;
        let mut rows: Vec<(u32, SnapshotMetrics)> = t
            .snapshots
            .iter()
            .filter(|(g, _, _)| *g == game_id)
            .map(|(_, n, s)| (*n, s.clone()))
            .collect();
        rows.sort_by_key(|(n, s)| (*n, s.rank));
        Ok(rows)
    }

    async fn enqueue_job(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobId>, StoreError> {
        let mut t = self.lock()?;
        let queued = t
            .jobs
            .values()
            .any(|j| j.quarter_id == quarter_id && j.status == JobStatus::Pending);
        if queued {
            return Ok(None);
        }
        let id = JobId(t.next_id());
        t.jobs.insert(
            id,
            ResolutionJob {
                id,
                quarter_id,
                status: JobStatus::Pending,
                attempts: 0,
                last_error: None,
                enqueued_at: now,
            },
        );
        Ok(Some(id))
    }

    async fn pending_jobs(&self) -> Result<Vec<ResolutionJob>, StoreError> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect())
    }

    async fn complete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        let job = t
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job#{}", job_id.0)))?;
        job.status = JobStatus::Done;
        Ok(())
    }

    async fn record_job_failure(
        &self,
        job_id: JobId,
        error: &str,
        max_attempts: u32,
    ) -> Result<JobStatus, StoreError> {
        let mut t = self.lock()?;
        let job = t
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job#{}", job_id.0)))?;
        job.attempts += 1;
        job.last_error = Some(error.to_string());
        if job.attempts >= max_attempts {
            job.status = JobStatus::Failed;
        }
        Ok(job.status)
    }
}
