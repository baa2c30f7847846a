//! Game setup and policy submission.

use crate::RuntimeError;
use chrono::{DateTime, Duration, Utc};
use persistence::{GameStore, JobId};
use sim_core::{
    validate_policies, Game, GameId, GameSettings, GameStatus, Player, PlayerId, PlayerResources,
    PolicyChoices, Quarter, QuarterId, TriggerMode,
};
use tracing::info;

/// Create a `waiting` game with its creator already seated.
pub async fn create_game<S: GameStore>(
    store: &S,
    settings: &GameSettings,
    creator: &str,
    now: DateTime<Utc>,
) -> Result<(Game, Player), RuntimeError> {
    let game = store.create_game(settings, now).await?;
    let player = store
        .add_player(game.id, creator, &PlayerResources::default())
        .await?;
    info!(game = %game.id, name = %settings.name, creator, "game created");
    Ok((game, player))
}

pub async fn join_game<S: GameStore>(
    store: &S,
    game_id: GameId,
    name: &str,
) -> Result<Player, RuntimeError> {
    let (game, players) = store
        .load_game_with_players(game_id)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(game_id.to_string()))?;
    if game.status != GameStatus::Waiting {
        return Err(RuntimeError::InvalidState(format!(
            "{game_id} is {}",
            game.status.as_str()
        )));
    }
    if players.len() >= game.settings.max_players as usize {
        return Err(RuntimeError::InvalidState(format!("{game_id} is full")));
    }
    if players.iter().any(|p| p.name == name) {
        return Err(RuntimeError::InvalidState(format!(
            "{name} already joined {game_id}"
        )));
    }
    let player = store
        .add_player(game_id, name, &PlayerResources::default())
        .await?;
    info!(game = %game_id, player = %player.id, name, "player joined");
    Ok(player)
}

/// Open quarter 1 with a deadline one quarter duration from `now`.
pub async fn start_game<S: GameStore>(
    store: &S,
    game_id: GameId,
    now: DateTime<Utc>,
) -> Result<Quarter, RuntimeError> {
    let (game, players) = store
        .load_game_with_players(game_id)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(game_id.to_string()))?;
    if game.status != GameStatus::Waiting {
        return Err(RuntimeError::InvalidState(format!(
            "{game_id} is {}",
            game.status.as_str()
        )));
    }
    let needed = game.settings.min_players_to_start as usize;
    if players.len() < needed {
        return Err(RuntimeError::InvalidState(format!(
            "{game_id} needs {needed} players, has {}",
            players.len()
        )));
    }
    let ends_at = now + Duration::seconds(i64::from(game.settings.quarter_duration_seconds));
    let quarter = store
        .start_game(game_id, now, ends_at)
        .await?
        .ok_or_else(|| RuntimeError::InvalidState(format!("{game_id} was started concurrently")))?;
    info!(game = %game_id, quarter = %quarter.id, players = players.len(), "game started");
    Ok(quarter)
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitReceipt {
    pub quarter_id: QuarterId,
    /// Every active player has a submission on file.
    pub all_submitted: bool,
    /// Set when this submission queued the quarter for resolution.
    pub job: Option<JobId>,
}

/// Validate and record a player's policies for the open quarter.
///
/// Invalid policies are rejected with every violation and nothing is stored.
pub async fn submit_policies<S: GameStore>(
    store: &S,
    game_id: GameId,
    player_id: PlayerId,
    policies: &PolicyChoices,
    now: DateTime<Utc>,
) -> Result<SubmitReceipt, RuntimeError> {
    validate_policies(policies).map_err(RuntimeError::InvalidPolicies)?;

    let (game, players) = store
        .load_game_with_players(game_id)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(game_id.to_string()))?;
    if !players.iter().any(|p| p.id == player_id && p.is_active) {
        return Err(RuntimeError::NotFound(format!("{player_id} in {game_id}")));
    }
    let quarter = store
        .active_quarter(game_id)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(format!("active quarter of {game_id}")))?;

    store
        .upsert_submission(quarter.id, player_id, policies, now)
        .await?;

    let submitted = store.load_submissions(quarter.id).await?;
    let all_submitted = players
        .iter()
        .filter(|p| p.is_active)
        .all(|p| submitted.contains_key(&p.id));
    let job = if all_submitted && game.settings.trigger_mode == TriggerMode::AllSubmit {
        let job = store.enqueue_job(quarter.id, now).await?;
        if let Some(id) = job {
            info!(quarter = %quarter.id, job = id.0, "all players submitted; resolution queued");
        }
        job
    } else {
        None
    };
    Ok(SubmitReceipt {
        quarter_id: quarter.id,
        all_submitted,
        job,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use persistence::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap()
    }

    fn small_game() -> GameSettings {
        GameSettings {
            name: "duel".into(),
            max_players: 2,
            ..GameSettings::default()
        }
    }

    #[tokio::test]
    async fn lobby_enforces_capacity_and_names() {
        let store = MemoryStore::new();
        let (game, creator) = create_game(&store, &small_game(), "ada", t0()).await.unwrap();
        assert_eq!(creator.resources, PlayerResources::default());
        assert!(matches!(
            join_game(&store, game.id, "ada").await,
            Err(RuntimeError::InvalidState(_))
        ));
        join_game(&store, game.id, "bo").await.unwrap();
        assert!(matches!(
            join_game(&store, game.id, "cy").await,
            Err(RuntimeError::InvalidState(_))
        ));
        assert!(matches!(
            join_game(&store, GameId(77), "cy").await,
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn start_needs_enough_players_and_runs_once() {
        let store = MemoryStore::new();
        let (game, _) = create_game(&store, &small_game(), "ada", t0()).await.unwrap();
        assert!(matches!(
            start_game(&store, game.id, t0()).await,
            Err(RuntimeError::InvalidState(_))
        ));
        join_game(&store, game.id, "bo").await.unwrap();
        let q = start_game(&store, game.id, t0()).await.unwrap();
        assert_eq!(q.number, 1);
        assert_eq!(q.ends_at, t0() + Duration::seconds(300));
        assert!(matches!(
            start_game(&store, game.id, t0()).await,
            Err(RuntimeError::InvalidState(_))
        ));
        assert!(matches!(
            join_game(&store, game.id, "late").await,
            Err(RuntimeError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn invalid_policies_are_not_recorded() {
        let store = MemoryStore::new();
        let (game, ada) = create_game(&store, &small_game(), "ada", t0()).await.unwrap();
        join_game(&store, game.id, "bo").await.unwrap();
        let q = start_game(&store, game.id, t0()).await.unwrap();

        let mut bad = PolicyChoices {
            tax_rate: 60.0,
            gov_spending_healthcare: 25.0,
            ..PolicyChoices::default()
        };
        bad.cabinet.warrior.focus = 4;
        match submit_policies(&store, game.id, ada.id, &bad, t0()).await {
            Err(RuntimeError::InvalidPolicies(v)) => assert!(v.len() >= 3, "{v:?}"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.load_submissions(q.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_submission_queues_one_job() {
        let store = MemoryStore::new();
        let (game, ada) = create_game(&store, &small_game(), "ada", t0()).await.unwrap();
        let bo = join_game(&store, game.id, "bo").await.unwrap();
        start_game(&store, game.id, t0()).await.unwrap();
        let p = PolicyChoices::default();

        let first = submit_policies(&store, game.id, ada.id, &p, t0()).await.unwrap();
        assert!(!first.all_submitted);
        assert!(first.job.is_none());

        let second = submit_policies(&store, game.id, bo.id, &p, t0()).await.unwrap();
        assert!(second.all_submitted);
        assert!(second.job.is_some());

        // Resubmitting does not queue a duplicate.
        let again = submit_policies(&store, game.id, bo.id, &p, t0()).await.unwrap();
        assert!(again.job.is_none());
        assert_eq!(store.pending_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn submission_after_claim_is_rejected() {
        let store = MemoryStore::new();
        let (game, ada) = create_game(&store, &small_game(), "ada", t0()).await.unwrap();
        join_game(&store, game.id, "bo").await.unwrap();
        let q = start_game(&store, game.id, t0()).await.unwrap();
        // A resolver wins the claim while the player is still submitting.
        assert!(store.claim_quarter(q.id, t0()).await.unwrap());
        let late = submit_policies(&store, game.id, ada.id, &PolicyChoices::default(), t0()).await;
        assert!(matches!(late, Err(RuntimeError::NotFound(_))));
        // Losing the race after the lookup surfaces as a conflict from the store.
        let raced = store
            .upsert_submission(q.id, ada.id, &PolicyChoices::default(), t0())
            .await
            .map_err(RuntimeError::from);
        assert!(matches!(raced, Err(RuntimeError::Conflict(id)) if id == q.id));
        assert!(store.load_submissions(q.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deadline_games_never_queue() {
        let store = MemoryStore::new();
        let settings = GameSettings {
            trigger_mode: TriggerMode::Deadline,
            min_players_to_start: 1,
            ..small_game()
        };
        let (game, ada) = create_game(&store, &settings, "ada", t0()).await.unwrap();
        start_game(&store, game.id, t0()).await.unwrap();
        let r = submit_policies(&store, game.id, ada.id, &PolicyChoices::default(), t0())
            .await
            .unwrap();
        assert!(r.all_submitted);
        assert!(r.job.is_none());
        assert!(matches!(
            submit_policies(&store, game.id, PlayerId(999), &PolicyChoices::default(), t0()).await,
            Err(RuntimeError::NotFound(_))
        ));
    }
}
