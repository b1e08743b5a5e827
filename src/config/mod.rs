//! Mission parameters.
//!
//! Loaded once at startup from a TOML file and treated as constants afterwards.
//! Every field has a default, so an empty file (or no file) yields the
//! competition settings.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub mission: MissionParams,
    pub control: ControlParams,
    pub link: LinkParams,
    pub topics: TopicParams,
}

/// Parameters of the scripted mission.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionParams {
    /// Time spent driving forward through the gate (seconds).
    pub gate_time_s: f64,
    /// Final depth of the staged dive.
    pub gate_depth: f32,
    /// Pause before the first dive stage so the heading can settle (seconds).
    pub settle_delay_s: f64,
    /// A dive stage counts as reached once |depth error| is at or below this.
    pub dive_error_threshold: f32,
    pub max_speed: f32,
    /// Heading decay applied to a target vote while approaching it.
    pub target_heading_decay: f32,
    /// Apparent size at which a target counts as hit.
    pub target_hit_size: f32,
    /// Slice used when the mission blocks on a token.
    pub token_poll_ms: u64,
    /// Sweeps tried per target before giving up on it.
    pub search_attempts: u32,
    /// The sweep covers the search heading +/- this many degrees.
    pub search_span_deg: f32,
    pub search_step_deg: f32,
    /// Control cycles spent on each sweep step.
    pub search_dwell_cycles: u32,
    pub search_timeout_s: f64,
    /// Time allowed to face the search heading again after a failed sweep.
    pub realign_timeout_s: f64,
    /// Forward speed and duration of the creep between sweeps.
    pub creep_speed: f32,
    pub creep_time_s: f64,
    /// Time allowed from first sighting to hit.
    pub approach_timeout_s: f64,
    /// Ram speed after a hit; the vehicle backs off at twice this.
    pub ram_speed: f32,
    pub ram_time_s: f64,
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            gate_time_s: 40.0,
            gate_depth: 85.0,
            settle_delay_s: 5.0,
            dive_error_threshold: 4.0,
            max_speed: 75.0,
            target_heading_decay: 0.005,
            target_hit_size: 0.25,
            token_poll_ms: 100,
            search_attempts: 3,
            search_span_deg: 45.0,
            search_step_deg: 5.0,
            search_dwell_cycles: 4,
            search_timeout_s: 20.0,
            realign_timeout_s: 5.0,
            creep_speed: 20.0,
            creep_time_s: 5.0,
            approach_timeout_s: 60.0,
            ram_speed: 20.0,
            ram_time_s: 5.0,
        }
    }
}

impl MissionParams {
    pub fn gate_time(&self) -> Duration {
        Duration::from_secs_f64(self.gate_time_s)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.settle_delay_s)
    }

    pub fn token_poll(&self) -> Duration {
        Duration::from_millis(self.token_poll_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.search_timeout_s)
    }

    pub fn realign_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.realign_timeout_s)
    }

    pub fn creep_time(&self) -> Duration {
        Duration::from_secs_f64(self.creep_time_s)
    }

    pub fn approach_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.approach_timeout_s)
    }

    pub fn ram_time(&self) -> Duration {
        Duration::from_secs_f64(self.ram_time_s)
    }

    fn durations(&self) -> [(&'static str, f64); 7] {
        [
            ("gate_time_s", self.gate_time_s),
            ("settle_delay_s", self.settle_delay_s),
            ("search_timeout_s", self.search_timeout_s),
            ("realign_timeout_s", self.realign_timeout_s),
            ("creep_time_s", self.creep_time_s),
            ("approach_timeout_s", self.approach_timeout_s),
            ("ram_time_s", self.ram_time_s),
        ]
    }
}

/// Parameters of the fusion/control cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    pub period_ms: u64,
    pub decay_interval_ms: u64,
    pub heading_corr_scale: f32,
    pub depth_corr_scale: f32,
    pub speed_corr_scale: f32,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            period_ms: 50,
            decay_interval_ms: 1000,
            heading_corr_scale: 1.0,
            depth_corr_scale: 1.0,
            speed_corr_scale: 1.0,
        }
    }
}

impl ControlParams {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Sim,
    Serial,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    pub kind: LinkKind,
    pub port: String,
    pub baud: u32,
    pub reply_timeout_ms: u64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            kind: LinkKind::Sim,
            port: "/dev/ttyACM0".to_string(),
            baud: 9600,
            reply_timeout_ms: 100,
        }
    }
}

impl LinkParams {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicParams {
    pub capacity: usize,
}

impl Default for TopicParams {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl MissionConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MissionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mission;
        let c = &self.control;

        if c.period_ms == 0 {
            return Err(ConfigError::Validation("control.period_ms must be > 0".into()));
        }
        if c.decay_interval_ms == 0 {
            return Err(ConfigError::Validation("control.decay_interval_ms must be > 0".into()));
        }
        if !(m.max_speed > 0.0) || !m.max_speed.is_finite() {
            return Err(ConfigError::Validation("mission.max_speed must be finite and > 0".into()));
        }
        if !(0.0..=1.0).contains(&m.target_heading_decay) {
            return Err(ConfigError::Validation(
                "mission.target_heading_decay must be within [0, 1]".into(),
            ));
        }
        // Duration::from_secs_f64 panics on these
        for (name, seconds) in m.durations() {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigError::Validation(format!("mission.{} must be finite and >= 0", name)));
            }
        }
        if !m.gate_depth.is_finite() {
            return Err(ConfigError::Validation("mission.gate_depth must be finite".into()));
        }
        if !(m.dive_error_threshold >= 0.0) || !m.dive_error_threshold.is_finite() {
            return Err(ConfigError::Validation("mission.dive_error_threshold must be finite and >= 0".into()));
        }
        if !(m.search_step_deg > 0.0) || !(m.search_span_deg >= 0.0) || !m.search_span_deg.is_finite() {
            return Err(ConfigError::Validation(
                "mission.search_step_deg must be > 0 and search_span_deg finite and >= 0".into(),
            ));
        }
        if !m.creep_speed.is_finite() || !m.ram_speed.is_finite() {
            return Err(ConfigError::Validation("mission creep and ram speeds must be finite".into()));
        }
        if ![c.heading_corr_scale, c.depth_corr_scale, c.speed_corr_scale].iter().all(|s| s.is_finite()) {
            return Err(ConfigError::Validation("control correction scales must be finite".into()));
        }
        if m.token_poll_ms == 0 {
            return Err(ConfigError::Validation("mission.token_poll_ms must be > 0".into()));
        }
        if self.topics.capacity == 0 {
            return Err(ConfigError::Validation("topics.capacity must be > 0".into()));
        }
        Ok(())
    }
}
