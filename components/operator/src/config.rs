//! Configuration of the consensus operator.
use anyhow::Context as _;
use sc_concurrency::time;

/// Minimal interval between two balance requests to the ledger node.
pub(crate) const REQUEST_BALANCES_TIMEOUT: time::Duration = time::Duration::seconds(1);

/// Configuration of the consensus operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long a peer waits for the current leader to start a round
    /// before moving on to the next leader.
    pub leader_rotation_timeout: time::Duration,
    /// Period of the tick driving the state machine.
    pub tick_interval: time::Duration,
    /// Maximal number of requests in a batch.
    pub max_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leader_rotation_timeout: time::Duration::seconds(5),
            tick_interval: time::Duration::milliseconds(100),
            max_batch_size: 100,
        }
    }
}

/// JSON representation of [`Config`]. Missing fields take the default values.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    leader_rotation_timeout_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
    max_batch_size: Option<usize>,
}

fn millis(ms: u64) -> anyhow::Result<time::Duration> {
    Ok(time::Duration::milliseconds(ms.try_into()?))
}

impl Config {
    /// Decodes and validates the config from JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = serde_json::from_str(json).context("serde_json::from_str()")?;
        let mut cfg = Self::default();
        if let Some(ms) = file.leader_rotation_timeout_ms {
            cfg.leader_rotation_timeout = millis(ms).context("leader_rotation_timeout_ms")?;
        }
        if let Some(ms) = file.tick_interval_ms {
            cfg.tick_interval = millis(ms).context("tick_interval_ms")?;
        }
        if let Some(size) = file.max_batch_size {
            cfg.max_batch_size = size;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that the config is usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.leader_rotation_timeout > time::Duration::ZERO,
            "leader_rotation_timeout has to be positive"
        );
        anyhow::ensure!(
            self.tick_interval > time::Duration::ZERO,
            "tick_interval has to be positive"
        );
        anyhow::ensure!(self.max_batch_size > 0, "max_batch_size has to be positive");
        Ok(())
    }
}
