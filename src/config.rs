use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{PilotError, PilotResult};
use crate::executor::actions::DragTiming;
use crate::executor::input::KeyCode;
use crate::perception::types::CaptureRegion;
use crate::sequences::taming::TamingSchedule;
use crate::sequences::{GameProfile, KeyBindings};

const CONFIG_FILE: &str = "arkpilot.toml";
const CONFIG_ENV: &str = "ARKPILOT_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub capture: CaptureConfig,
    pub timing: TimingConfig,
    pub keys: KeysConfig,
    pub taming: TamingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX export of the trained UI detector.
    pub model_path: String,
    /// Optional text file with one class name per line; line index is the class id.
    pub class_names_file: Option<String>,
    pub confidence: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/ark_ui.onnx".into(),
            class_names_file: None,
            confidence: 0.4,
            iou_threshold: 0.45,
            input_size: 640,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index into `xcap::Monitor::all()`. `None` picks the primary monitor.
    pub monitor: Option<usize>,
    pub region: Option<RegionConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegionConfig {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cooldown_ms: u64,
    pub staleness_ms: u64,
    pub poll_interval_ms: u64,
    pub poller_join_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub wait_poll_ms: u64,
    pub settle_ms: u64,
    pub drag_press_ms: u64,
    pub drag_move_ms: u64,
    pub drag_release_ms: u64,
    pub drag_steps: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 500,
            staleness_ms: 1000,
            poll_interval_ms: 200,
            poller_join_timeout_ms: 2000,
            wait_timeout_ms: 3000,
            wait_poll_ms: 500,
            settle_ms: 500,
            drag_press_ms: 200,
            drag_move_ms: 300,
            drag_release_ms: 100,
            drag_steps: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub inventory: String,
    pub drop: String,
    pub escape: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            inventory: "i".into(),
            drop: "o".into(),
            escape: "esc".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TamingConfig {
    /// Creature name to preferred food suffixes, merged over the built-in table.
    pub foods: BTreeMap<String, Vec<String>>,
    /// Creature name to narcotics per hour, merged over the built-in table.
    pub narcotics_per_hour: BTreeMap<String, u32>,
    pub check_interval_ms: u64,
    pub narcotic_every_s: u64,
    pub food_every_s: u64,
}

impl Default for TamingConfig {
    fn default() -> Self {
        Self {
            foods: BTreeMap::new(),
            narcotics_per_hour: BTreeMap::new(),
            check_interval_ms: 5000,
            narcotic_every_s: 600,
            food_every_s: 300,
        }
    }
}

/// Plain values a session is constructed from.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub confidence: f32,
    pub cooldown: Duration,
    pub staleness: Duration,
    pub poll_interval: Duration,
    pub poller_join_timeout: Duration,
    pub wait_timeout: Duration,
    pub wait_poll: Duration,
    pub settle: Duration,
    pub drag: DragTiming,
    pub capture_region: Option<CaptureRegion>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        AppConfig::default().session_settings()
    }
}

impl AppConfig {
    pub fn session_settings(&self) -> SessionSettings {
        let t = &self.timing;
        SessionSettings {
            confidence: self.detector.confidence,
            cooldown: Duration::from_millis(t.cooldown_ms),
            staleness: Duration::from_millis(t.staleness_ms),
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            poller_join_timeout: Duration::from_millis(t.poller_join_timeout_ms),
            wait_timeout: Duration::from_millis(t.wait_timeout_ms),
            wait_poll: Duration::from_millis(t.wait_poll_ms),
            settle: Duration::from_millis(t.settle_ms),
            drag: DragTiming {
                press_delay: Duration::from_millis(t.drag_press_ms),
                move_duration: Duration::from_millis(t.drag_move_ms),
                release_delay: Duration::from_millis(t.drag_release_ms),
                steps: t.drag_steps.max(1),
            },
            capture_region: self.capture.region.map(|r| CaptureRegion {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
            }),
        }
    }

    pub fn game_profile(&self) -> PilotResult<GameProfile> {
        let keys = KeyBindings {
            inventory: parse_key("keys.inventory", &self.keys.inventory)?,
            drop: parse_key("keys.drop", &self.keys.drop)?,
            escape: parse_key("keys.escape", &self.keys.escape)?,
        };
        let mut profile = GameProfile {
            keys,
            ..GameProfile::default()
        };
        for (creature, foods) in &self.taming.foods {
            profile
                .taming_foods
                .insert(creature.to_ascii_lowercase(), foods.clone());
        }
        for (creature, rate) in &self.taming.narcotics_per_hour {
            profile
                .narcotics_per_hour
                .insert(creature.to_ascii_lowercase(), *rate);
        }
        Ok(profile)
    }

    pub fn taming_schedule(&self) -> TamingSchedule {
        let t = &self.taming;
        TamingSchedule {
            check_interval: Duration::from_millis(t.check_interval_ms),
            narcotic_every: Duration::from_secs(t.narcotic_every_s),
            food_every: Duration::from_secs(t.food_every_s),
        }
    }

    fn validate(&self) -> PilotResult<()> {
        let d = &self.detector;
        if !(0.0..=1.0).contains(&d.confidence) {
            return Err(PilotError::Config(format!(
                "detector.confidence must be within [0, 1], got {}",
                d.confidence
            )));
        }
        if !(0.0..=1.0).contains(&d.iou_threshold) {
            return Err(PilotError::Config(format!(
                "detector.iou_threshold must be within [0, 1], got {}",
                d.iou_threshold
            )));
        }
        if d.input_size == 0 || d.input_size % 32 != 0 {
            return Err(PilotError::Config(format!(
                "detector.input_size must be a positive multiple of 32, got {}",
                d.input_size
            )));
        }
        if self.taming.check_interval_ms == 0 {
            return Err(PilotError::Config("taming.check_interval_ms must be positive".into()));
        }
        if let Some(region) = &self.capture.region {
            if region.width == 0 || region.height == 0 {
                return Err(PilotError::Config("capture.region must be non-empty".into()));
            }
        }
        Ok(())
    }
}

fn parse_key(field: &str, name: &str) -> PilotResult<KeyCode> {
    name.parse::<KeyCode>()
        .map_err(|e| PilotError::Config(format!("{field}: {e}")))
}

fn resolve_config_path(explicit: Option<&Path>) -> PilotResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(PilotError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(env_path);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via {CONFIG_ENV}");
            return Ok(Some(candidate));
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV} points at a missing file");
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let candidate = std::env::current_dir()?.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("arkpilot").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

pub fn parse_config(content: &str) -> PilotResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load the config from `explicit`, or from the usual search locations.
/// No file anywhere yields the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> PilotResult<AppConfig> {
    let Some(path) = resolve_config_path(explicit)? else {
        tracing::info!("no {CONFIG_FILE} found; using built-in defaults");
        return Ok(AppConfig::default());
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        model = %config.detector.model_path,
        "config loaded"
    );
    Ok(config)
}
