//! Fair Blackjack Server
//!
//! Runs the WebSocket table server, or with `demo` plays one round
//! against the automated house and verifies it.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fair_blackjack::{
    game::Card,
    network::{GameServer, ServerConfig},
    proof::Party,
    table::{wait_for_phase, Phase, PlayerId, SetupStage, WaitConfig},
    HouseAgent, Secret, TableService, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let default_level = if cfg!(feature = "debug-tracing") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Fair Blackjack v{}", VERSION);

    match std::env::args().nth(1).as_deref() {
        Some("demo") => demo_round().await,
        None | Some("serve") => {
            let config = ServerConfig::from_env().context("Reading server configuration")?;
            let server = GameServer::new(config, Arc::new(TableService::in_memory()));
            server.run().await.context("Server stopped")?;
            Ok(())
        }
        Some(other) => bail!("Unknown command {:?}; expected `serve` or `demo`", other),
    }
}

fn cards(cards: &[Card]) -> String {
    cards.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

/// Play one round against the house and check it.
async fn demo_round() -> anyhow::Result<()> {
    info!("=== Starting Demo Round ===");

    let tables = TableService::in_memory();
    let house = HouseAgent::new();
    let player = PlayerId::random();

    let round = tables.join(player, 1).await?;
    info!("Round ID: {}", hex::encode(round));

    tables.place_bet(round, 50).await?;
    house.drive(&tables, round).await?;

    let secret = Secret::generate();
    let chain = secret.commit();
    tables.commit_randomness(round, Party::Player, chain.cv).await?;
    house.drive(&tables, round).await?;

    tables.reveal_hash(round, Party::Player, chain.co).await?;
    house.drive(&tables, round).await?;

    let view = wait_for_phase(&tables, round, WaitConfig::default(), |v| {
        v.awaiting.contains(&Party::Player)
    })
    .await?;
    info!("Awaiting player at {:?}", view.setup_stage);

    tables.reveal_secret(round, Party::Player, secret).await?;
    let view = tables.get_phase(round).await?;
    if view.setup_stage != Some(SetupStage::Cut) {
        bail!("Expected the cut, got {:?}", view.setup_stage);
    }

    tables.submit_cut(round, Party::Player, 26).await?;
    house.forget(&round).await;

    // Basic strategy stand-in: draw to 17
    loop {
        let hands = tables.get_hands(round).await?;
        info!(
            "Player: {} ({}), Dealer: {} ({})",
            cards(&hands.player),
            hands.player_score,
            cards(&hands.dealer),
            hands.dealer_score
        );
        if tables.get_phase(round).await?.phase != Phase::Game {
            break;
        }
        if hands.player_score < 17 {
            tables.hit(round).await?;
        } else {
            tables.stand(round).await?;
        }
    }

    let hands = tables.get_hands(round).await?;
    info!("=== Round Result ===");
    info!("Result: {:?}, payout {}, chips {}", hands.result, hands.payout, hands.chips);

    let verdict = tables.verify(round).await?;
    let transcript = tables
        .transcript(round)
        .await?
        .context("Finished round has no transcript")?;
    info!("Transcript digest: {}", hex::encode(transcript.digest()));
    info!("Seed: {}", hex::encode(transcript.seed));

    if verdict.is_verified() {
        info!("FAIRNESS VERIFIED: every card matches the committed shuffle");
        Ok(())
    } else {
        bail!("FAIRNESS FAILURE: {:?}", verdict)
    }
}
