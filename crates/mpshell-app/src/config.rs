use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::SharedBufferError;
use crate::renderer::shared;
use crate::renderer::types::{
    AspectConfig, AspectMode, DEFAULT_ASPECT_SCALE, DEFAULT_MAX_DIMENSION, RendererLimits,
};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:47600";

/// External player launched alongside the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Persisted shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_buffer_name")]
    pub shared_buffer_name: String,
    /// Directory for the shared segment; platform default when unset.
    #[serde(default)]
    pub shared_buffer_dir: Option<PathBuf>,
    /// Divisor applied to the wire aspect value.
    #[serde(default = "default_aspect_scale")]
    pub aspect_scale: u32,
    #[serde(default)]
    pub aspect_mode: AspectMode,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default)]
    pub float_on_top: bool,
    #[serde(default)]
    pub player: Option<PlayerConfig>,
}

fn default_version() -> u32 { 1 }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_buffer_name() -> String { "mpshell".to_string() }
fn default_aspect_scale() -> u32 { DEFAULT_ASPECT_SCALE }
fn default_max_dimension() -> u32 { DEFAULT_MAX_DIMENSION }

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: 1,
            listen_addr: default_listen_addr(),
            shared_buffer_name: default_buffer_name(),
            shared_buffer_dir: None,
            aspect_scale: DEFAULT_ASPECT_SCALE,
            aspect_mode: AspectMode::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            fullscreen: false,
            float_on_top: false,
            player: None,
        }
    }
}

impl ShellConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mpshell").join("settings.json"))
    }

    /// Load from the per-user settings file, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// A missing file yields defaults silently; an unreadable one with a warning.
    pub fn load_from(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Could not read {}: {e}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(config) => {
                log::info!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring malformed settings in {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to save settings: {e:#}");
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Command line values take precedence over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = &cli.listen {
            self.listen_addr.clone_from(addr);
        }
        if let Some(name) = &cli.buffer_name {
            self.shared_buffer_name.clone_from(name);
        }
        if let Some(dir) = &cli.buffer_dir {
            self.shared_buffer_dir = Some(dir.clone());
        }
        self.fullscreen |= cli.fullscreen;
        self.float_on_top |= cli.ontop;
        if let Some((program, args)) = cli.player.split_first() {
            self.player = Some(PlayerConfig {
                program: program.clone(),
                args: args.to_vec(),
            });
        }
    }

    pub fn limits(&self) -> RendererLimits {
        let scale = if self.aspect_scale == 0 {
            log::warn!("aspect_scale must be positive, using {DEFAULT_ASPECT_SCALE}");
            DEFAULT_ASPECT_SCALE
        } else {
            self.aspect_scale
        };
        RendererLimits {
            max_dimension: self.max_dimension.max(1),
            aspect: AspectConfig {
                scale,
                mode: self.aspect_mode,
            },
        }
    }

    pub fn segment_dir(&self) -> PathBuf {
        self.shared_buffer_dir
            .clone()
            .unwrap_or_else(shared::default_segment_dir)
    }

    pub fn segment_path(&self) -> Result<PathBuf, SharedBufferError> {
        shared::segment_path(&self.segment_dir(), &self.shared_buffer_name)
    }
}
