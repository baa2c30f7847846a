//! SQLite store on sqlx.
//!
//! Conditional `UPDATE ... WHERE status = ?` statements are the compare-and-set
//! primitive; `rows_affected` tells the caller whether it won.

use crate::{
    GameAdvance, GameStore, JobId, JobStatus, ResolutionCommit, ResolutionJob, StoreError,
};
use chrono::{DateTime, TimeZone, Utc};
use sim_core::{
    Game, GameId, GameSettings, GameStatus, Player, PlayerId, PlayerOutcome, PlayerResources,
    PolicyChoices, Quarter, QuarterId, QuarterResult, QuarterStatus, SnapshotMetrics,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database at `url` and apply migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    // Each connection to `:memory:` is its own database.
    let in_memory = url.contains(":memory:");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(url, "database ready");
    Ok(pool)
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self::from_pool(init_db(url).await?))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {secs}")))
}

fn small(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn game_from_row(row: &SqliteRow) -> Result<Game, StoreError> {
    let status: String = row.try_get("status")?;
    let settings: String = row.try_get("settings")?;
    Ok(Game {
        id: GameId(row.try_get("id")?),
        settings: serde_json::from_str(&settings)?,
        status: GameStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("game status {status}")))?,
        current_quarter: small(row.try_get("current_quarter")?, "current_quarter")?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

fn player_from_row(row: &SqliteRow) -> Result<Player, StoreError> {
    let resources: String = row.try_get("resources")?;
    let starting: String = row.try_get("starting_resources")?;
    Ok(Player {
        id: PlayerId(row.try_get("id")?),
        game_id: GameId(row.try_get("game_id")?),
        name: row.try_get("name")?,
        score: row.try_get("score")?,
        resources: serde_json::from_str(&resources)?,
        starting_resources: serde_json::from_str(&starting)?,
        is_active: row.try_get("is_active")?,
    })
}

fn quarter_from_row(row: &SqliteRow) -> Result<Quarter, StoreError> {
    let status: String = row.try_get("status")?;
    let claimed_at: Option<i64> = row.try_get("claimed_at")?;
    Ok(Quarter {
        id: QuarterId(row.try_get("id")?),
        game_id: GameId(row.try_get("game_id")?),
        number: small(row.try_get("number")?, "number")?,
        starts_at: timestamp(row.try_get("starts_at")?)?,
        ends_at: timestamp(row.try_get("ends_at")?)?,
        status: QuarterStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("quarter status {status}")))?,
        claimed_at: claimed_at.map(timestamp).transpose()?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<ResolutionJob, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(ResolutionJob {
        id: JobId(row.try_get("id")?),
        quarter_id: QuarterId(row.try_get("quarter_id")?),
        status: JobStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("job status {status}")))?,
        attempts: small(row.try_get("attempts")?, "attempts")?,
        last_error: row.try_get("last_error")?,
        enqueued_at: timestamp(row.try_get("enqueued_at")?)?,
    })
}

const QUARTER_COLUMNS: &str =
    "SELECT id, game_id, number, starts_at, ends_at, status, claimed_at FROM quarters";

async fn insert_quarter(
    conn: &mut SqliteConnection,
    game_id: GameId,
    number: u32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<Quarter, StoreError> {
    let id = sqlx::query(
        "INSERT INTO quarters (game_id, number, starts_at, ends_at, status) \
         VALUES (?, ?, ?, ?, 'active')",
    )
    .bind(game_id.0)
    .bind(i64::from(number))
    .bind(starts_at.timestamp())
    .bind(ends_at.timestamp())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(Quarter {
        id: QuarterId(id),
        game_id,
        number,
        starts_at: timestamp(starts_at.timestamp())?,
        ends_at: timestamp(ends_at.timestamp())?,
        status: QuarterStatus::Active,
        claimed_at: None,
    })
}

/// Guarded `resolving → completed`; returns the quarter number.
async fn complete_quarter(
    conn: &mut SqliteConnection,
    quarter_id: QuarterId,
    claimed_at: DateTime<Utc>,
) -> Result<u32, StoreError> {
    let row = sqlx::query(
        "UPDATE quarters SET status = 'completed' \
         WHERE id = ? AND status = 'resolving' AND claimed_at = ? RETURNING number",
    )
    .bind(quarter_id.0)
    .bind(claimed_at.timestamp())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::StaleClaim(quarter_id))?;
    small(row.try_get("number")?, "number")
}

async fn persist_player_outcome(
    conn: &mut SqliteConnection,
    game_id: GameId,
    outcome: &PlayerOutcome,
) -> Result<(), StoreError> {
    let affected = sqlx::query(
        "UPDATE players SET resources = ?, score = ? WHERE id = ? AND game_id = ?",
    )
    .bind(serde_json::to_string(&outcome.resources)?)
    .bind(outcome.score.round() as i64)
    .bind(outcome.player_id.0)
    .bind(game_id.0)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(StoreError::NotFound(outcome.player_id.to_string()));
    }
    Ok(())
}

async fn persist_quarter_result(
    conn: &mut SqliteConnection,
    result: &QuarterResult,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO quarter_results (quarter_id, game_id, result, resolved_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(result.quarter_id.0)
    .bind(result.game_id.0)
    .bind(serde_json::to_string(result)?)
    .bind(result.resolved_at.timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn persist_snapshots(
    conn: &mut SqliteConnection,
    quarter_id: QuarterId,
    game_id: GameId,
    number: u32,
    snapshots: &[SnapshotMetrics],
) -> Result<(), StoreError> {
    for snapshot in snapshots {
        sqlx::query(
            "INSERT INTO quarter_snapshots \
             (quarter_id, game_id, quarter_number, player_id, rank, metrics) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(quarter_id.0)
        .bind(game_id.0)
        .bind(i64::from(number))
        .bind(snapshot.player_id.0)
        .bind(i64::from(snapshot.rank))
        .bind(serde_json::to_string(snapshot)?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn delete_submissions(
    conn: &mut SqliteConnection,
    quarter_id: QuarterId,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM submissions WHERE quarter_id = ?")
        .bind(quarter_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// `Some(n)` makes quarter `n` current; `None` completes the game.
async fn advance_or_complete_game(
    conn: &mut SqliteConnection,
    game_id: GameId,
    next_quarter: Option<u32>,
) -> Result<(), StoreError> {
    let query = match next_quarter {
        Some(n) => sqlx::query("UPDATE games SET current_quarter = ? WHERE id = ?")
            .bind(i64::from(n))
            .bind(game_id.0),
        None => sqlx::query("UPDATE games SET status = 'completed' WHERE id = ?").bind(game_id.0),
    };
    if query.execute(&mut *conn).await?.rows_affected() == 0 {
        return Err(StoreError::NotFound(game_id.to_string()));
    }
    Ok(())
}

impl GameStore for SqliteStore {
    async fn create_game(
        &self,
        settings: &GameSettings,
        now: DateTime<Utc>,
    ) -> Result<Game, StoreError> {
        let id = sqlx::query(
            "INSERT INTO games (settings, status, current_quarter, created_at) \
             VALUES (?, 'waiting', 0, ?)",
        )
        .bind(serde_json::to_string(settings)?)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(Game {
            id: GameId(id),
            settings: settings.clone(),
            status: GameStatus::Waiting,
            current_quarter: 0,
            created_at: timestamp(now.timestamp())?,
        })
    }

    async fn add_player(
        &self,
        game_id: GameId,
        name: &str,
        resources: &PlayerResources,
    ) -> Result<Player, StoreError> {
        if self.load_game(game_id).await?.is_none() {
            return Err(StoreError::NotFound(game_id.to_string()));
        }
        let json = serde_json::to_string(resources)?;
        let id = sqlx::query(
            "INSERT INTO players (game_id, name, score, resources, starting_resources, is_active) \
             VALUES (?, ?, 0, ?, ?, 1)",
        )
        .bind(game_id.0)
        .bind(name)
        .bind(&json)
        .bind(&json)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(Player {
            id: PlayerId(id),
            game_id,
            name: name.to_string(),
            score: 0,
            resources: resources.clone(),
            starting_resources: resources.clone(),
            is_active: true,
        })
    }

    async fn load_game(&self, game_id: GameId) -> Result<Option<Game>, StoreError> {
        sqlx::query(
            "SELECT id, settings, status, current_quarter, created_at FROM games WHERE id = ?",
        )
        .bind(game_id.0)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(game_from_row)
        .transpose()
    }

    async fn load_game_with_players(
        &self,
        game_id: GameId,
    ) -> Result<Option<(Game, Vec<Player>)>, StoreError> {
        let Some(game) = self.load_game(game_id).await? else {
            return Ok(None);
        };
        let players = sqlx::query(
            "SELECT id, game_id, name, score, resources, starting_resources, is_active \
             FROM players WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(player_from_row)
        .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((game, players)))
    }

    async fn start_game(
        &self,
        game_id: GameId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Option<Quarter>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query(
            "UPDATE games SET status = 'active', current_quarter = 1 \
             WHERE id = ? AND status = 'waiting'",
        )
        .bind(game_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            drop(tx);
            return match self.load_game(game_id).await? {
                Some(_) => Ok(None),
                None => Err(StoreError::NotFound(game_id.to_string())),
            };
        }
        let quarter = insert_quarter(&mut tx, game_id, 1, starts_at, ends_at).await?;
        tx.commit().await?;
        Ok(Some(quarter))
    }

    async fn load_quarter(&self, quarter_id: QuarterId) -> Result<Option<Quarter>, StoreError> {
        sqlx::query(&format!("{QUARTER_COLUMNS} WHERE id = ?"))
            .bind(quarter_id.0)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(quarter_from_row)
            .transpose()
    }

    async fn active_quarter(&self, game_id: GameId) -> Result<Option<Quarter>, StoreError> {
        sqlx::query(&format!(
            "{QUARTER_COLUMNS} WHERE game_id = ? AND status = 'active'"
        ))
        .bind(game_id.0)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(quarter_from_row)
        .transpose()
    }

    async fn expired_quarters(&self, now: DateTime<Utc>) -> Result<Vec<Quarter>, StoreError> {
        sqlx::query(&format!(
            "{QUARTER_COLUMNS} WHERE status = 'active' AND ends_at < ? ORDER BY id"
        ))
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(quarter_from_row)
        .collect()
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<Quarter>, StoreError> {
        sqlx::query(&format!(
            "{QUARTER_COLUMNS} WHERE status = 'resolving' AND claimed_at < ? ORDER BY id"
        ))
        .bind(cutoff.timestamp())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(quarter_from_row)
        .collect()
    }

    async fn claim_quarter(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "UPDATE quarters SET status = 'resolving', claimed_at = ? \
             WHERE id = ? AND status = 'active'",
        )
        .bind(now.timestamp())
        .bind(quarter_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    async fn reclaim_quarter(
        &self,
        quarter_id: QuarterId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "UPDATE quarters SET claimed_at = ? \
             WHERE id = ? AND status = 'resolving' AND claimed_at < ?",
        )
        .bind(now.timestamp())
        .bind(quarter_id.0)
        .bind(cutoff.timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    async fn upsert_submission(
        &self,
        quarter_id: QuarterId,
        player_id: PlayerId,
        policies: &PolicyChoices,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "INSERT INTO submissions (quarter_id, player_id, policies, submitted_at) \
             SELECT ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM quarters WHERE id = ? AND status = 'active') \
             ON CONFLICT (quarter_id, player_id) \
             DO UPDATE SET policies = excluded.policies, submitted_at = excluded.submitted_at",
        )
        .bind(quarter_id.0)
        .bind(player_id.0)
        .bind(serde_json::to_string(policies)?)
        .bind(now.timestamp())
        .bind(quarter_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 1 {
            return Ok(());
        }
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM quarters WHERE id = ?")
            .bind(quarter_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Err(StoreError::QuarterClosed(quarter_id)),
            None => Err(StoreError::NotFound(quarter_id.to_string())),
        }
    }

    async fn load_submissions(
        &self,
        quarter_id: QuarterId,
    ) -> Result<BTreeMap<PlayerId, PolicyChoices>, StoreError> {
        let rows = sqlx::query("SELECT player_id, policies FROM submissions WHERE quarter_id = ?")
            .bind(quarter_id.0)
            .fetch_all(&self.pool)
            .await?;
        let mut out = BTreeMap::new();
        for row in &rows {
            let policies: String = row.try_get("policies")?;
            out.insert(
                PlayerId(row.try_get("player_id")?),
                serde_json::from_str(&policies)?,
            );
        }
        Ok(out)
    }

    async fn commit_resolution(&self, commit: &ResolutionCommit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // The claim check runs first; a stale commit rolls back before writing anything else.
        let number = complete_quarter(&mut tx, commit.quarter_id, commit.claimed_at).await?;
        for outcome in &commit.result.outcomes {
            persist_player_outcome(&mut tx, commit.game_id, outcome).await?;
        }
        persist_quarter_result(&mut tx, &commit.result).await?;
        persist_snapshots(
            &mut tx,
            commit.quarter_id,
            commit.game_id,
            number,
            &commit.snapshots,
        )
        .await?;
        delete_submissions(&mut tx, commit.quarter_id).await?;
        match &commit.advance {
            GameAdvance::Next {
                number,
                starts_at,
                ends_at,
            } => {
                insert_quarter(&mut tx, commit.game_id, *number, *starts_at, *ends_at).await?;
                advance_or_complete_game(&mut tx, commit.game_id, Some(*number)).await?;
            }
            GameAdvance::Complete => {
                advance_or_complete_game(&mut tx, commit.game_id, None).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_quarter_result(
        &self,
        quarter_id: QuarterId,
    ) -> Result<Option<QuarterResult>, StoreError> {
        let row = sqlx::query("SELECT result FROM quarter_results WHERE quarter_id = ?")
            .bind(quarter_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("result")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn load_snapshots(
        &self,
        game_id: GameId,
    ) -> Result<Vec<(u32, SnapshotMetrics)>, StoreError> {
        let rows = sqlx::query(
            "SELECT quarter_number, metrics FROM quarter_snapshots \
             WHERE game_id = ? ORDER BY quarter_number, rank",
        )
        .bind(game_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(u32, SnapshotMetrics), StoreError> {
                let json: String = row.try_get("metrics")?;
                Ok((
                    small(row.try_get("quarter_number")?, "quarter_number")?,
                    serde_json::from_str(&json)?,
                ))
            })
            .collect()
    }

    async fn enqueue_job(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobId>, StoreError> {
        let result = sqlx::query(
            "INSERT INTO resolution_jobs (quarter_id, status, attempts, enqueued_at) \
             VALUES (?, 'pending', 0, ?) ON CONFLICT DO NOTHING",
        )
        .bind(quarter_id.0)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        Ok((result.rows_affected() == 1).then(|| JobId(result.last_insert_rowid())))
    }

    async fn pending_jobs(&self) -> Result<Vec<ResolutionJob>, StoreError> {
        sqlx::query(
            "SELECT id, quarter_id, status, attempts, last_error, enqueued_at \
             FROM resolution_jobs WHERE status = 'pending' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(job_from_row)
        .collect()
    }

    async fn complete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        let affected = sqlx::query("UPDATE resolution_jobs SET status = 'done' WHERE id = ?")
            .bind(job_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("job#{}", job_id.0)));
        }
        Ok(())
    }

    async fn record_job_failure(
        &self,
        job_id: JobId,
        error: &str,
        max_attempts: u32,
    ) -> Result<JobStatus, StoreError> {
        let row = sqlx::query(
            "UPDATE resolution_jobs SET attempts = attempts + 1, last_error = ?, \
             status = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE status END \
             WHERE id = ? RETURNING status",
        )
        .bind(error)
        .bind(i64::from(max_attempts))
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("job#{}", job_id.0)))?;
        let status: String = row.try_get("status")?;
        JobStatus::parse(&status).ok_or_else(|| StoreError::Corrupt(format!("job status {status}")))
    }
}
