// crates/tessera-daemon/src/config.rs
//
// Runtime configuration for the Tessera validator daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;

use tessera_core::error::TesseraError;
use tessera_core::params::{ConsensusParams, ParamSchedule};
use tessera_core::registry::Registry;
use tessera_core::types::{Participant, Role, SlotId, Uid};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// This validator's uid in the registry.
    #[serde(default)]
    pub uid: Uid,

    /// Directory for local data storage (RocksDB).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File holding the hex-encoded 32-byte hotkey secret.
    #[serde(default = "default_hotkey_path")]
    pub hotkey_path: String,

    /// Host address for the RPC server.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    /// Port for the RPC server.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Peer validator URLs for score gossip (e.g., ["http://10.0.0.2:50061"]).
    /// When empty, the endpoints of registered validators are used.
    #[serde(default)]
    pub peers: Vec<String>,

    /// This node's publicly reachable URL. Excluded from the peer set.
    #[serde(default)]
    pub self_url: Option<String>,

    /// Remote scoring service. When unset, answers are scored by shape only.
    #[serde(default)]
    pub evaluator_url: Option<String>,

    /// Remote ledger receiving slot commits. When unset, commits are logged.
    #[serde(default)]
    pub ledger_url: Option<String>,

    /// Wall-clock start of slot 0, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub genesis_unix_ms: i64,

    /// Timeout for outbound HTTP calls, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Genesis consensus constants.
    #[serde(default)]
    pub consensus: ConsensusParams,

    /// Later parameter versions (`[[consensus_versions]]`), each with a higher
    /// `version` and a later `effective_from_slot` than the one before.
    #[serde(default)]
    pub consensus_versions: Vec<ConsensusParams>,

    /// Registry bootstrap, used when the archive holds no registry yet.
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
}

/// One `[[participants]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantConfig {
    pub uid: Uid,
    pub role: Role,
    /// Hex-encoded ed25519 public key.
    pub hotkey: String,
    #[serde(default)]
    pub stake: u64,
    #[serde(default = "default_trust")]
    pub trust: f64,
    #[serde(default)]
    pub endpoint: String,
}

impl ParticipantConfig {
    pub fn to_participant(&self, slot: SlotId) -> Result<Participant, TesseraError> {
        let hotkey = decode_key(&self.hotkey).ok_or_else(|| {
            TesseraError::Config(format!("participant {}: invalid hotkey", self.uid))
        })?;
        Ok(
            Participant::new(self.uid, self.role, hotkey, self.stake, self.trust, slot)
                .with_endpoint(self.endpoint.clone()),
        )
    }
}

fn default_data_dir() -> String {
    "~/.tessera/data".to_string()
}

fn default_hotkey_path() -> String {
    "~/.tessera/hotkey".to_string()
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    50061
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_trust() -> f64 {
    0.5
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            uid: 0,
            data_dir: default_data_dir(),
            hotkey_path: default_hotkey_path(),
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            peers: Vec::new(),
            self_url: None,
            evaluator_url: None,
            ledger_url: None,
            genesis_unix_ms: 0,
            http_timeout_ms: default_http_timeout_ms(),
            consensus: ConsensusParams::default(),
            consensus_versions: Vec::new(),
            participants: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        config.consensus.validate()?;
        Ok(config)
    }

    /// Build a fresh registry from the `[[participants]]` entries, all
    /// registered at `slot`.
    pub fn bootstrap_registry(&self, slot: SlotId) -> Result<Registry, TesseraError> {
        let mut registry = Registry::new();
        for entry in &self.participants {
            registry.register(entry.to_participant(slot)?)?;
        }
        Ok(registry)
    }
}

impl DaemonConfig {
    /// Resolve the parameter schedule at startup.
    ///
    /// # Arguments
    /// * `saved` - Schedule found in the archive, if any. It always wins over
    ///   the config, so past slots keep the constants they ran under.
    /// * `current_slot` - Config versions newer than the saved schedule are
    ///   appended only if they take effect after this slot.
    pub fn param_schedule(
        &self,
        saved: Option<ParamSchedule>,
        current_slot: SlotId,
    ) -> Result<ParamSchedule, TesseraError> {
        let Some(mut schedule) = saved else {
            let versions = std::iter::once(self.consensus.clone())
                .chain(self.consensus_versions.iter().cloned())
                .collect();
            return ParamSchedule::from_versions(versions);
        };

        for params in &self.consensus_versions {
            if params.version <= schedule.latest().version {
                continue;
            }
            if let Err(e) = schedule.schedule(params.clone(), current_slot) {
                tracing::warn!("Ignoring consensus v{} from config: {}", params.version, e);
            }
        }
        Ok(schedule)
    }
}

/// Decode a hex-encoded 32-byte key.
pub fn decode_key(text: &str) -> Option<[u8; 32]> {
    hex::decode(text.trim())
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
}
