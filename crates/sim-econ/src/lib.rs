#![deny(warnings)]

//! Macroeconomic models for the quarterly economics game.
//!
//! This crate provides pure, deterministic building blocks:
//! - World aggregation across every player in a pass
//! - Cross-country interaction models (capital flows, trade, migration, QE, twin deficits)
//! - The per-player resolution pipeline
//! - Seeded random shocks and crisis detection
//! - Scoring and ranking

pub mod events;
pub mod interaction;
pub mod resolver;
pub mod scoring;
pub mod world;

pub use events::{detect_crises, event_rng, pass_seed, roll_random_events, RandomEvent};
pub use interaction::{
    capital_flows, migration, money_supply, net_exports, twin_deficits, CapitalFlowEffect,
    MigrationEffect, MoneySupplyEffect, NetExportsEffect, TwinDeficitEffect,
};
pub use resolver::resolve_player;
pub use scoring::{rank, score, stability_score};
pub use world::{aggregate, Participant};
