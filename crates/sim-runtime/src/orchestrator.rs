//! Quarter orchestrator: claim, resolve, commit, advance.
//!
//! The store's compare-and-set claim is the only lock. Whoever wins it runs
//! the pass and commits; everyone else gets [`RuntimeError::Conflict`].

use crate::convergence::run_pass;
use crate::recovery::RecoveryPolicy;
use crate::RuntimeError;
use chrono::{DateTime, Duration, Utc};
use persistence::{GameAdvance, GameStore, ResolutionCommit};
use sim_core::{
    Game, Player, PlayerId, PolicyChoices, Quarter, QuarterId, QuarterResult, ResolutionInput,
};
use sim_econ::pass_seed;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolution inputs for every active player, in player order.
///
/// Players without a submission get [`PolicyChoices::default`].
pub fn build_inputs(
    game: &Game,
    players: &[Player],
    submissions: &BTreeMap<PlayerId, PolicyChoices>,
    quarter_number: u32,
) -> Vec<ResolutionInput> {
    players
        .iter()
        .filter(|p| p.is_active)
        .map(|p| ResolutionInput {
            player_id: p.id,
            resources: p.resources.clone(),
            policies: submissions.get(&p.id).cloned().unwrap_or_default(),
            starting_resources: p.starting_resources.clone(),
            quarters_played: quarter_number,
            rng_seed: pass_seed(game.settings.rng_seed, quarter_number, p.id.0),
        })
        .collect()
}

pub struct Orchestrator<S> {
    store: Arc<S>,
    recovery: RecoveryPolicy,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            recovery: self.recovery,
        }
    }
}

impl<S: GameStore> Orchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn recovery(&self) -> &RecoveryPolicy {
        &self.recovery
    }

    /// Claim `quarter_id` and resolve it. Returns `Conflict` if the claim is lost.
    pub async fn resolve_quarter(
        &self,
        quarter_id: QuarterId,
        now: DateTime<Utc>,
    ) -> Result<QuarterResult, RuntimeError> {
        let quarter = self
            .store
            .load_quarter(quarter_id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(quarter_id.to_string()))?;
        if !self.store.claim_quarter(quarter_id, now).await? {
            debug!(quarter = %quarter_id, "claim lost");
            return Err(RuntimeError::Conflict(quarter_id));
        }
        info!(quarter = %quarter_id, game = %quarter.game_id, number = quarter.number, "quarter claimed");
        self.resolve_claimed(&quarter, now).await
    }

    /// Run and commit a quarter this caller holds under `claimed_at`.
    pub(crate) async fn resolve_claimed(
        &self,
        quarter: &Quarter,
        claimed_at: DateTime<Utc>,
    ) -> Result<QuarterResult, RuntimeError> {
        let (game, players) = self
            .store
            .load_game_with_players(quarter.game_id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(quarter.game_id.to_string()))?;
        let submissions = self.store.load_submissions(quarter.id).await?;
        let inputs = build_inputs(&game, &players, &submissions, quarter.number);
        debug!(
            quarter = %quarter.id,
            players = inputs.len(),
            submitted = submissions.len(),
            "resolving"
        );

        let pass = run_pass(&inputs, game.settings.resolution_mode, &game.settings.weights());

        let result = QuarterResult {
            quarter_id: quarter.id,
            game_id: game.id,
            world: pass.world,
            iterations: pass.iterations,
            converged: pass.converged,
            outcomes: pass.outcomes,
            resolved_at: claimed_at,
        };
        let advance = if quarter.number < game.settings.total_quarters {
            GameAdvance::Next {
                number: quarter.number + 1,
                starts_at: claimed_at,
                ends_at: claimed_at
                    + Duration::seconds(i64::from(game.settings.quarter_duration_seconds)),
            }
        } else {
            GameAdvance::Complete
        };
        let commit = ResolutionCommit {
            quarter_id: quarter.id,
            game_id: game.id,
            claimed_at,
            result,
            snapshots: pass.snapshots,
            advance,
        };
        self.store.commit_resolution(&commit).await?;
        info!(
            quarter = %quarter.id,
            iterations = commit.result.iterations,
            converged = commit.result.converged,
            game_over = commit.advance == GameAdvance::Complete,
            "quarter resolved"
        );
        Ok(commit.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::{create_game, join_game, start_game, submit_policies};
    use chrono::TimeZone;
    use persistence::{MemoryStore, SqliteStore};
    use sim_core::{GameSettings, GameStatus, QuarterStatus, ResolutionMode};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    async fn two_player_game<S: GameStore>(
        store: &S,
        settings: GameSettings,
    ) -> (Game, Vec<Player>, Quarter) {
        let (game, ada) = create_game(store, &settings, "ada", t0()).await.unwrap();
        let bo = join_game(store, game.id, "bo").await.unwrap();
        let q = start_game(store, game.id, t0()).await.unwrap();
        (game, vec![ada, bo], q)
    }

    #[test]
    fn missing_submissions_fall_back_to_default_policy() {
        let game = Game {
            id: sim_core::GameId(1),
            settings: GameSettings::default(),
            status: GameStatus::Active,
            current_quarter: 3,
            created_at: t0(),
        };
        let player = |id: i64, active: bool| Player {
            id: PlayerId(id),
            game_id: game.id,
            name: format!("p{id}"),
            score: 0,
            resources: Default::default(),
            starting_resources: Default::default(),
            is_active: active,
        };
        let players = vec![player(1, true), player(2, true), player(3, false)];
        let mut submissions = BTreeMap::new();
        let custom = PolicyChoices {
            tax_rate: 40.0,
            ..PolicyChoices::default()
        };
        submissions.insert(PlayerId(1), custom.clone());

        let inputs = build_inputs(&game, &players, &submissions, 3);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].policies, custom);
        assert_eq!(inputs[1].policies, PolicyChoices::default());
        assert_eq!(inputs[1].quarters_played, 3);
        assert_ne!(inputs[0].rng_seed, inputs[1].rng_seed);
    }

    #[tokio::test]
    async fn second_resolution_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let (_, _, q) = two_player_game(store.as_ref(), GameSettings::default()).await;
        let orch = Orchestrator::new(Arc::clone(&store));
        let now = t0() + Duration::seconds(10);
        let result = orch.resolve_quarter(q.id, now).await.unwrap();
        assert_eq!(result.outcomes.len(), 2);
        assert!(matches!(
            orch.resolve_quarter(q.id, now).await,
            Err(RuntimeError::Conflict(id)) if id == q.id
        ));
        assert!(matches!(
            orch.resolve_quarter(QuarterId(404), now).await,
            Err(RuntimeError::NotFound(_))
        ));
    }

    async fn race<S: GameStore + 'static>(store: Arc<S>) {
        let (_, _, q) = two_player_game(store.as_ref(), GameSettings::default()).await;
        let orch = Orchestrator::new(store);
        let mut handles = Vec::new();
        for i in 0..8 {
            let orch = orch.clone();
            handles.push(tokio::spawn(async move {
                orch.resolve_quarter(q.id, t0() + Duration::seconds(60 + i))
                    .await
            }));
        }
        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RuntimeError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 7));
        let (game, _) = orch
            .store()
            .load_game_with_players(q.game_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(game.current_quarter, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_happens_once_in_memory() {
        race(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_happens_once_in_sqlite() {
        race(Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap())).await;
    }

    #[tokio::test]
    async fn game_runs_to_completion() {
        let store = Arc::new(MemoryStore::new());
        let settings = GameSettings {
            total_quarters: 3,
            resolution_mode: ResolutionMode::Equilibrium,
            ..GameSettings::default()
        };
        let (game, players, _) = two_player_game(store.as_ref(), settings).await;
        let orch = Orchestrator::new(Arc::clone(&store));

        let mut now = t0();
        for number in 1..=3u32 {
            let q = store.active_quarter(game.id).await.unwrap().unwrap();
            assert_eq!(q.number, number);
            now += Duration::seconds(30);
            let result = orch.resolve_quarter(q.id, now).await.unwrap();
            assert!(result.iterations >= 1);
            let q = store.load_quarter(q.id).await.unwrap().unwrap();
            assert_eq!(q.status, QuarterStatus::Completed);
        }

        let (game, after) = store.load_game_with_players(game.id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.current_quarter, 3);
        assert!(store.active_quarter(game.id).await.unwrap().is_none());
        assert_eq!(store.load_snapshots(game.id).await.unwrap().len(), 6);
        for (before, after) in players.iter().zip(&after) {
            assert_eq!(before.starting_resources, after.starting_resources);
            assert_ne!(before.resources, after.resources);
        }
    }

    #[tokio::test]
    async fn submitted_policies_are_used_and_consumed() {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let settings = GameSettings {
            trigger_mode: sim_core::TriggerMode::Deadline,
            ..GameSettings::default()
        };
        let (game, players, q) = two_player_game(store.as_ref(), settings).await;
        let hawk = PolicyChoices {
            cbrf_autopilot: false,
            interest_rate: 15.0,
            ..PolicyChoices::default()
        };
        submit_policies(store.as_ref(), game.id, players[0].id, &hawk, t0())
            .await
            .unwrap();

        let orch = Orchestrator::new(Arc::clone(&store));
        let result = orch
            .resolve_quarter(q.id, t0() + Duration::seconds(5))
            .await
            .unwrap();
        let hawk_out = result
            .outcomes
            .iter()
            .find(|o| o.player_id == players[0].id)
            .unwrap();
        assert_eq!(hawk_out.resources.interest_rate, 15.0);
        assert!(store.load_submissions(q.id).await.unwrap().is_empty());
        let stored = store.load_quarter_result(q.id).await.unwrap().unwrap();
        assert_eq!(stored.outcomes.len(), 2);
    }
}
