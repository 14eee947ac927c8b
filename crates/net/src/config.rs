//! Game configuration
//!
//! Loaded from an optional JSON file, then overridden from environment
//! variables:
//!
//! - `NET_TETRIS_HOST`: Bind / connect address (default: "127.0.0.1")
//! - `NET_TETRIS_PORT`: Port number (default: 11155)
//! - `NET_TETRIS_COLUMNS`, `NET_TETRIS_ROWS`: Board size (default: 10x24)
//! - `NET_TETRIS_MAX_LEVEL`: Level cap (default: 40)
//! - `NET_TETRIS_SEED`: Block generator seed

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use net_tetris_types::{
    DEFAULT_COLUMNS, DEFAULT_MAX_LEVEL, DEFAULT_ROWS, FIXED_STEP_MS, MAX_COLUMNS, MAX_FRAME_MS,
    MAX_ROWS, MIN_COLUMNS, SPAWN_BUFFER_ROWS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub columns: usize,
    pub rows: usize,
    pub max_level: u32,
    pub step_ms: u32,
    pub max_frame_ms: u32,
    pub seed: u32,
    pub host: String,
    pub port: u16,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            rows: DEFAULT_ROWS,
            max_level: DEFAULT_MAX_LEVEL,
            step_ms: FIXED_STEP_MS,
            max_frame_ms: MAX_FRAME_MS,
            seed: 1,
            host: "127.0.0.1".to_string(),
            port: 11155,
        }
    }
}

impl GameConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).context("invalid game config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden from the environment
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply `NET_TETRIS_*` overrides from `lookup`; unparsable values are ignored
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("NET_TETRIS_HOST")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            self.host = host;
        }
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        if let Some(port) = number("NET_TETRIS_PORT").and_then(|v| u16::try_from(v).ok()) {
            self.port = port;
        }
        if let Some(columns) = number("NET_TETRIS_COLUMNS") {
            self.columns = columns as usize;
        }
        if let Some(rows) = number("NET_TETRIS_ROWS") {
            self.rows = rows as usize;
        }
        if let Some(max_level) = number("NET_TETRIS_MAX_LEVEL").and_then(|v| u32::try_from(v).ok()) {
            self.max_level = max_level;
        }
        if let Some(seed) = number("NET_TETRIS_SEED") {
            self.seed = seed as u32;
        }
        self
    }

    /// Check the board fits the wire format and the spawn position
    pub fn validate(&self) -> Result<()> {
        if !(MIN_COLUMNS..=MAX_COLUMNS).contains(&self.columns) {
            return Err(anyhow!(
                "columns must be within {}..={}, got {}",
                MIN_COLUMNS,
                MAX_COLUMNS,
                self.columns
            ));
        }
        if !(SPAWN_BUFFER_ROWS..=MAX_ROWS).contains(&self.rows) {
            return Err(anyhow!(
                "rows must be within {}..={}, got {}",
                SPAWN_BUFFER_ROWS,
                MAX_ROWS,
                self.rows
            ));
        }
        if self.step_ms == 0 {
            return Err(anyhow!("step_ms must be positive"));
        }
        if self.max_level == 0 {
            return Err(anyhow!("max_level must be positive"));
        }
        Ok(())
    }

    /// Pull every out of range value back into the range `validate` accepts
    pub fn clamped(mut self) -> Self {
        let columns = self.columns.clamp(MIN_COLUMNS, MAX_COLUMNS);
        let rows = self.rows.clamp(SPAWN_BUFFER_ROWS, MAX_ROWS);
        if (columns, rows) != (self.columns, self.rows) {
            warn!(
                "board {}x{} is out of range, using {}x{}",
                self.columns, self.rows, columns, rows
            );
        }
        self.columns = columns;
        self.rows = rows;
        self.step_ms = self.step_ms.max(1);
        self.max_level = self.max_level.max(1);
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid socket address {}:{}", self.host, self.port))
    }
}
