use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{KeeperError, KeeperResult};

/// Blocks the shutdown must stay observed before facilitation
pub const REQUIRED_CONFIRMATIONS: u32 = 12;

/// Named view of where a session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    Watching,
    Confirming(u32),
    /// Confirmed, facilitation not run yet
    Facilitating,
    CoolingDown,
    /// Cooldown is over, supply not fixed yet
    Finalizing,
    Terminated,
}

/// Orchestrator state, owned by the caller and handed to every tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementSession {
    pub contract_enabled: bool,
    pub confirmations: u32,
    pub facilitated: bool,
    pub finalized: bool,
    pub errors: u32,
    pub shutdown_time: Option<DateTime<Utc>>,
    pub shutdown_cooldown: Option<u64>,
}

impl SettlementSession {
    pub fn new(previously_facilitated: bool) -> Self {
        Self {
            contract_enabled: true,
            facilitated: previously_facilitated,
            ..Default::default()
        }
    }

    /// Session resumed from the external flag and whatever was persisted
    pub fn resume(previously_facilitated: bool, persisted: &PersistedSession) -> Self {
        Self {
            finalized: persisted.finalized,
            ..Self::new(previously_facilitated || persisted.facilitated)
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmations >= REQUIRED_CONFIRMATIONS
    }

    pub fn phase(&self) -> SettlementPhase {
        if self.finalized {
            SettlementPhase::Terminated
        } else if self.contract_enabled || self.confirmations == 0 {
            SettlementPhase::Watching
        } else if !self.is_confirmed() {
            SettlementPhase::Confirming(self.confirmations)
        } else if !self.facilitated {
            SettlementPhase::Facilitating
        } else {
            SettlementPhase::CoolingDown
        }
    }

    /// Like `phase`, telling a finished cooldown apart from a running one
    pub fn phase_at(&self, now: DateTime<Utc>) -> SettlementPhase {
        match self.phase() {
            SettlementPhase::CoolingDown
                if self.cooldown_deadline().is_some_and(|deadline| now >= deadline) =>
            {
                SettlementPhase::Finalizing
            }
            phase => phase,
        }
    }

    /// `shutdown_time + shutdown_cooldown`, once both have been read
    pub fn cooldown_deadline(&self) -> Option<DateTime<Utc>> {
        let shutdown_time = self.shutdown_time?;
        let cooldown = i64::try_from(self.shutdown_cooldown?).ok()?;
        shutdown_time.checked_add_signed(chrono::Duration::seconds(cooldown))
    }

    pub fn persisted(&self, block: Option<u64>) -> PersistedSession {
        PersistedSession {
            facilitated: self.facilitated,
            facilitated_at_block: block,
            finalized: self.finalized,
            updated_at: Utc::now(),
        }
    }
}

/// What survives a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub facilitated: bool,
    pub facilitated_at_block: Option<u64>,
    pub finalized: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for PersistedSession {
    fn default() -> Self {
        Self {
            facilitated: false,
            facilitated_at_block: None,
            finalized: false,
            updated_at: Utc::now(),
        }
    }
}

/// JSON file holding the settlement progress flags
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Store that keeps nothing; restarts rely on the external flag alone
    #[cfg(test)]
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub async fn load(&self) -> KeeperResult<PersistedSession> {
        let Some(path) = &self.path else {
            return Ok(PersistedSession::default());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let persisted: PersistedSession = serde_json::from_str(&raw).map_err(|e| {
                    KeeperError::SessionStore(format!("Corrupt {}: {}", path.display(), e))
                })?;
                info!(
                    "💾 Resumed session from {} (facilitated: {}, finalized: {})",
                    path.display(),
                    persisted.facilitated,
                    persisted.finalized
                );
                Ok(persisted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write-then-rename so a crash never leaves a torn file
    pub async fn save(&self, persisted: &PersistedSession) -> KeeperResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let raw = serde_json::to_string_pretty(persisted)
            .map_err(|e| KeeperError::SessionStore(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!("💾 Session saved to {}", path.display());
        Ok(())
    }
}
