//! SkyHigh Round Server
//!
//! `skyhigh-server [serve]` runs the WebSocket server (configured through
//! `SKYHIGH_*` environment variables). `skyhigh-server demo [rounds]` runs
//! rounds offline on a simulated clock and re-verifies every one.

use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skyhigh::{
    game::{events::RoundEvent, state::PlayerId},
    network::{RoundServer, ServerConfig},
    verify_record, EngineConfig, OsSeedSource, RoundController, TICK_RATE, VERSION,
};

/// Simulated clock step for the demo.
const DEMO_STEP: Duration = Duration::from_millis(1000 / TICK_RATE as u64);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("SkyHigh Server v{}", VERSION);

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("demo") => {
            let rounds = match args.next() {
                Some(n) => n.parse().with_context(|| format!("invalid round count `{}`", n))?,
                None => 10,
            };
            demo_rounds(rounds)
        }
        Some("serve") | None => serve().await,
        Some(other) => anyhow::bail!("unknown command `{}` (expected `serve` or `demo [rounds]`)", other),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("reading SKYHIGH_* configuration")?;
    info!("Tick Rate: {} Hz", config.tick_rate);
    if config.admin_key.is_none() {
        warn!("SKYHIGH_ADMIN_KEY not set, admin actions are disabled");
    }

    let server = RoundServer::start(config)?;
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}

/// Run `rounds` rounds with a few scripted players, then audit the history.
fn demo_rounds(rounds: usize) -> anyhow::Result<()> {
    info!("=== Running {} demo rounds ===", rounds);

    let config = EngineConfig {
        history_capacity: rounds.max(1),
        ..EngineConfig::default()
    };
    let mut controller = RoundController::new(config, Box::new(OsSeedSource));
    let players: Vec<PlayerId> = (1..=3u8).map(|i| PlayerId::new([i; 16])).collect();

    // One overridden round so the audit shows an intervention
    if rounds > 2 {
        controller.set_next_override(Some(2.0))?;
    }

    let mut now = Instant::now();
    while controller.history().len() < rounds {
        controller.tick(now);
        for event in controller.drain_events() {
            match event {
                RoundEvent::Committed { round, server_hash, house_edge, .. } => {
                    info!("Round {} committed: {} (edge {})", round, server_hash, house_edge);
                    for (i, player) in players.iter().enumerate() {
                        let target = 1.5 + i as f64;
                        controller.place_bet(*player, 100, Some(target))?;
                    }
                }
                RoundEvent::CashedOut { cash_out, .. } => {
                    info!("  cash-out at {} pays {}", cash_out.at, cash_out.payout);
                }
                RoundEvent::Crashed { round, crash_point, server_seed, provenance, .. } => {
                    info!("Round {} crashed at {} ({:?}), seed {}", round, crash_point, provenance, server_seed);
                }
                RoundEvent::AwaitingEntropy { reason } => warn!("Waiting for entropy: {}", reason),
                _ => {}
            }
        }
        now += DEMO_STEP;
    }

    info!("=== Verifying History ===");
    let mut fair = 0;
    for record in controller.history().iter() {
        let verdict = verify_record(record);
        if verdict.is_fair() {
            fair += 1;
        } else {
            info!("Round {}: {:?}", record.round_id(), verdict);
        }
    }
    info!("{}/{} rounds verified organic", fair, controller.history().len());

    let stats = controller.stats();
    info!(
        "Wagered {}, paid {}, net {}, margin {:.2}%",
        stats.total_wagered,
        stats.total_paid_out,
        stats.net(),
        stats.margin_percent()
    );
    info!("Audit entries: {}", controller.audit().len());

    Ok(())
}
