#![deny(warnings)]

//! Headless CLI: play a scripted scenario through the full resolution pipeline.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use persistence::{GameStore, MemoryStore, SqliteStore};
use serde::{Deserialize, Serialize};
use sim_core::{GameId, GameSettings, GameStatus, PolicyChoices};
use sim_runtime::{
    create_game, join_game, start_game, submit_policies, Orchestrator, RecoveryPolicy,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<String>,
    quarters: Option<u32>,
    db: Option<String>,
    json: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--quarters" => args.quarters = it.next().and_then(|s| s.parse().ok()),
            "--db" => args.db = it.next(),
            "--json" => args.json = true,
            _ => {}
        }
    }
    args
}

#[derive(Debug, Deserialize)]
struct ScenarioPlayer {
    name: String,
    /// Submitted every quarter; omitted players fall back to the default policy.
    #[serde(default)]
    policies: Option<PolicyChoices>,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    settings: GameSettings,
    #[serde(default)]
    recovery: RecoveryPolicy,
    players: Vec<ScenarioPlayer>,
}

impl Scenario {
    fn duel() -> Self {
        Self {
            settings: GameSettings {
                name: "duel".into(),
                total_quarters: 8,
                ..GameSettings::default()
            },
            recovery: RecoveryPolicy::default(),
            players: vec![
                ScenarioPlayer {
                    name: "alpha".into(),
                    policies: None,
                },
                ScenarioPlayer {
                    name: "beta".into(),
                    policies: Some(PolicyChoices {
                        tax_rate: 24.0,
                        ..PolicyChoices::default()
                    }),
                },
            ],
        }
    }
}

#[derive(Debug, Serialize)]
struct Standing {
    rank: usize,
    name: String,
    score: i64,
    gdp: f64,
    inflation: f64,
    debt_to_gdp: f64,
    unemployment: f64,
}

async fn play<S: GameStore>(store: Arc<S>, scenario: &Scenario) -> Result<Vec<Standing>> {
    let Some((creator, others)) = scenario.players.split_first() else {
        bail!("scenario has no players");
    };
    let mut clock: DateTime<Utc> = Utc::now();
    let (game, first) = create_game(store.as_ref(), &scenario.settings, &creator.name, clock).await?;
    let mut seats = vec![(first.id, creator.policies.clone())];
    for p in others {
        let joined = join_game(store.as_ref(), game.id, &p.name).await?;
        seats.push((joined.id, p.policies.clone()));
    }
    start_game(store.as_ref(), game.id, clock).await?;

    let orch = Orchestrator::new(Arc::clone(&store)).with_recovery(scenario.recovery);
    loop {
        let Some(quarter) = store.active_quarter(game.id).await? else {
            break;
        };
        for (player_id, policies) in &seats {
            if let Some(policies) = policies {
                submit_policies(store.as_ref(), game.id, *player_id, policies, clock).await?;
            }
        }
        let queued = orch.run_pending_jobs(clock).await?;
        if queued.resolved == 0 {
            clock = quarter.ends_at + Duration::seconds(1);
            let swept = orch.sweep_expired(clock).await?;
            if swept.resolved == 0 {
                bail!("quarter {} failed to resolve", quarter.number);
            }
        }
        info!(quarter = quarter.number, "quarter done");
        clock += Duration::seconds(1);
    }
    standings(store.as_ref(), game.id).await
}

async fn standings<S: GameStore>(store: &S, game_id: GameId) -> Result<Vec<Standing>> {
    let (game, mut players) = store
        .load_game_with_players(game_id)
        .await?
        .context("game vanished")?;
    if game.status != GameStatus::Completed {
        warn!(game = %game_id, status = game.status.as_str(), "game did not complete");
    }
    players.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(players
        .into_iter()
        .enumerate()
        .map(|(i, p)| Standing {
            rank: i + 1,
            name: p.name,
            score: p.score,
            gdp: p.resources.gdp,
            inflation: p.resources.inflation,
            debt_to_gdp: p.resources.debt_to_gdp,
            unemployment: p.resources.unemployment,
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args();
    info!(
        sha = env!("GIT_SHA"),
        built = env!("BUILD_DATE"),
        scenario = ?args.scenario,
        quarters = ?args.quarters,
        "starting CLI"
    );

    let mut scenario = match &args.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => Scenario::duel(),
    };
    if let Some(q) = args.quarters {
        scenario.settings.total_quarters = q;
    }
    scenario.settings.min_players_to_start = scenario
        .settings
        .min_players_to_start
        .min(scenario.players.len() as u32);

    let table = match &args.db {
        Some(url) => play(Arc::new(SqliteStore::connect(url).await?), &scenario).await?,
        None => play(Arc::new(MemoryStore::new()), &scenario).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        println!(
            "{} | {} quarters | {:?} mode",
            scenario.settings.name, scenario.settings.total_quarters, scenario.settings.resolution_mode
        );
        for s in &table {
            println!(
                "#{} {:<12} score {:>7} | gdp ${:.3}T | infl {:>5.2}% | debt {:>6.1}% | unemp {:>5.2}%",
                s.rank,
                s.name,
                s.score,
                s.gdp / 1e12,
                s.inflation,
                s.debt_to_gdp,
                s.unemployment
            );
        }
    }
    Ok(())
}
