//! House Party Automation
//!
//! Plays the house side of the commit-reveal exchange. Secrets live only
//! in this agent until reveal2 and are dropped once the round is seeded.

use std::collections::BTreeMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::core::hash::Secret;
use crate::proof::commitment::{Party, ProtocolStep};
use crate::table::round::{Phase, RoundId, SetupStage};
use crate::table::service::{TableError, TableService};

/// House agent errors.
#[derive(Debug, thiserror::Error)]
pub enum HouseError {
    /// A reveal is due but this agent never committed for the round.
    #[error("No house secret for round {}", hex::encode(.0))]
    SecretLost(RoundId),

    /// The table rejected the step.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Automated house party.
#[derive(Default)]
pub struct HouseAgent {
    secrets: RwLock<BTreeMap<RoundId, Secret>>,
}

impl HouseAgent {
    /// Agent with no rounds in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform the house step due on the round, if any.
    pub async fn step(
        &self,
        service: &TableService,
        round: RoundId,
    ) -> Result<Option<ProtocolStep>, HouseError> {
        let view = service.get_phase(round).await?;
        if view.phase != Phase::Setup || view.termination.is_some() {
            self.forget(&round).await;
            return Ok(None);
        }
        if !view.awaiting.contains(&Party::House) {
            return Ok(None);
        }

        let step = match view.setup_stage {
            Some(SetupStage::RngCommit) => {
                let secret = Secret::generate();
                service
                    .commit_randomness(round, Party::House, secret.commit().cv)
                    .await?;
                self.secrets.write().await.insert(round, secret);
                ProtocolStep::Commit
            }
            Some(SetupStage::RngReveal1) => {
                let secret = self.secret(&round).await?;
                service.reveal_hash(round, Party::House, secret.commit().co).await?;
                ProtocolStep::Reveal1
            }
            Some(SetupStage::RngReveal2) => {
                let secret = self.secret(&round).await?;
                service.reveal_secret(round, Party::House, secret).await?;
                ProtocolStep::Reveal2
            }
            _ => return Ok(None),
        };

        debug!(round = %hex::encode(&round[..4]), %step, "House step");
        Ok(Some(step))
    }

    /// Perform house steps until none is due. Returns how many ran.
    pub async fn drive(&self, service: &TableService, round: RoundId) -> Result<usize, HouseError> {
        let mut steps = 0;
        while self.step(service, round).await?.is_some() {
            steps += 1;
        }
        Ok(steps)
    }

    /// Drop the secret held for a round.
    pub async fn forget(&self, round: &RoundId) {
        self.secrets.write().await.remove(round);
    }

    /// Rounds with a secret in flight.
    pub async fn pending(&self) -> usize {
        self.secrets.read().await.len()
    }

    async fn secret(&self, round: &RoundId) -> Result<Secret, HouseError> {
        self.secrets
            .read()
            .await
            .get(round)
            .copied()
            .ok_or(HouseError::SecretLost(*round))
    }
}
