//! Configuration types for the control loops.
//!
//! Loads tuning values from config.json at startup. Colour ranges are not
//! configurable; they live in `detection::palette`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::detection::BlobFilter;
use crate::input::keys::{SCAN_LEFT_ARROW, SCAN_LSHIFT, WASD_VK};

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<ControlConfig> = OnceLock::new();

const DEFAULT_GREEN_DELAY_MS: f32 = 20.0;

/// Ring tracker tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Linear downscale applied to each frame before detection
    pub scale: f32,
    pub min_area: f32,
    pub max_aspect_ratio: f32,
    pub min_fill_ratio: f32,
    pub min_radius: f32,
    pub edge_margin_x: f32,
    pub edge_margin_y: f32,
    /// Green blobs farther than this (screen pixels) from the lock are ignored
    pub track_radius: f32,
    /// Consecutive ticks without a white ring before the lock is dropped
    pub lost_frame_limit: u32,
    /// Confirmation delay at 1080 rows; scaled by monitor height
    pub green_delay_ms: f32,
    pub cooldown_ms: u64,
    pub drag_steps: u32,
    pub drag_ms: u64,
    pub tick_ms: u64,
    pub idle_ms: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            min_area: 40.0,
            max_aspect_ratio: 2.0,
            min_fill_ratio: 0.20,
            min_radius: 5.0,
            edge_margin_x: 0.20,
            edge_margin_y: 0.10,
            track_radius: 150.0,
            lost_frame_limit: 15,
            green_delay_ms: DEFAULT_GREEN_DELAY_MS,
            cooldown_ms: 400,
            drag_steps: 20,
            drag_ms: 50,
            tick_ms: 3,
            idle_ms: 50,
        }
    }
}

impl RingConfig {
    pub fn blob_filter(&self) -> BlobFilter {
        BlobFilter::new(self.min_area, self.max_aspect_ratio, self.min_fill_ratio, 0.0)
            .with_edge_margins(self.edge_margin_x, self.edge_margin_y)
            .with_min_radius(self.min_radius)
            .with_close_iterations(2)
    }

    /// Confirmation window for a monitor of `height` rows.
    ///
    /// Negative delays count as zero; unusable values fall back to the default.
    pub fn green_delay(&self, height: i32) -> Duration {
        let base_ms = if self.green_delay_ms.is_finite() {
            self.green_delay_ms.max(0.0)
        } else {
            DEFAULT_GREEN_DELAY_MS
        };
        let scaled = (base_ms / 1000.0) * height.max(0) as f32 / 1080.0;
        Duration::try_from_secs_f32(scaled)
            .unwrap_or_else(|_| Duration::from_secs_f32(DEFAULT_GREEN_DELAY_MS / 1000.0))
    }
}

/// Bar rider tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BarConfig {
    pub scale: f32,
    /// Left edge of the search column as a fraction of monitor width
    pub region_left: f32,
    /// Bottom of the search column as a fraction of monitor height
    pub region_bottom: f32,
    /// Fewer zone pixels than this means the zone is absent
    pub min_zone_pixels: usize,
    /// Where the click target sits inside the zone, from its top
    pub zone_anchor: f32,
    /// Fraction of sampled rows ignored at the top when locating the marker
    pub marker_top_margin: f32,
    /// Marker needs more than this many pixels
    pub min_marker_pixels: usize,
    pub min_deadband: i32,
    /// Continuous zone absence before switching to shaping
    pub zone_lost_ms: u64,
    pub shaping_interval_ms: u64,
    pub shaping_x: f32,
    pub shaping_y: f32,
    pub shaping_jitter: i32,
    pub tick_ms: u64,
    pub idle_ms: u64,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            region_left: 0.75,
            region_bottom: 0.85,
            min_zone_pixels: 20,
            zone_anchor: 0.625,
            marker_top_margin: 0.20,
            min_marker_pixels: 5,
            min_deadband: 5,
            zone_lost_ms: 1000,
            shaping_interval_ms: 150,
            shaping_x: 0.6,
            shaping_y: 0.5,
            shaping_jitter: 15,
            tick_ms: 5,
            idle_ms: 50,
        }
    }
}

/// Idle-motion sweep tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JiggleConfig {
    /// Duration of one sweep
    pub period_ms: u64,
    pub steps: u32,
    pub top: f32,
    pub bottom: f32,
    pub idle_ms: u64,
}

impl Default for JiggleConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            steps: 30,
            top: 0.20,
            bottom: 0.80,
            idle_ms: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoclickConfig {
    pub interval_ms: u64,
    pub idle_ms: u64,
}

impl Default for AutoclickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            idle_ms: 50,
        }
    }
}

/// Key held down by the hold-key loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldKeyConfig {
    pub scan_code: u16,
    pub extended: bool,
    /// Key-down repeat while held, like the keyboard's own autorepeat
    pub repeat_ms: u64,
    pub idle_ms: u64,
}

impl Default for HoldKeyConfig {
    fn default() -> Self {
        Self {
            scan_code: SCAN_LEFT_ARROW,
            extended: true,
            repeat_ms: 50,
            idle_ms: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintConfig {
    pub shift_scan: u16,
    /// Virtual-key codes that count as moving
    pub movement_keys: Vec<u16>,
    pub poll_ms: u64,
    pub idle_ms: u64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            shift_scan: SCAN_LSHIFT,
            movement_keys: WASD_VK.to_vec(),
            poll_ms: 20,
            idle_ms: 50,
        }
    }
}

/// Two-key attack cycle that runs alongside the autoclicker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    pub first_key: char,
    pub second_key: char,
    /// Gap between the first and the second tap
    pub second_after_ms: u64,
    /// Start-to-start time of one cycle
    pub cycle_ms: u64,
    pub poll_ms: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            first_key: '2',
            second_key: '1',
            second_after_ms: 1000,
            cycle_ms: 3000,
            poll_ms: 50,
        }
    }
}

/// "GO" watcher and phase sequencer tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GoConfig {
    /// Sampled square runs from this fraction to `1 - region_inset` on both axes
    pub region_inset: f32,
    /// Green pixel count that must be exceeded
    pub min_pixels: usize,
    pub cooldown_ms: u64,
    pub poll_ms: u64,
    pub cooldown_poll_ms: u64,
    pub idle_ms: u64,
    /// Where the sequencer's confirm request clicks
    pub confirm_x: f32,
    pub confirm_y: f32,
}

impl Default for GoConfig {
    fn default() -> Self {
        Self {
            region_inset: 0.30,
            min_pixels: 5000,
            cooldown_ms: 3000,
            poll_ms: 150,
            cooldown_poll_ms: 100,
            idle_ms: 200,
            confirm_x: 0.5,
            confirm_y: 0.86,
        }
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Executable name of the game; compared case-insensitively
    pub target_process: String,
    /// Monitor selected at startup (enumeration order)
    pub monitor_index: usize,
    /// Follow the game window when it moves to another monitor
    pub follow_target_monitor: bool,
    pub ring: RingConfig,
    pub bar: BarConfig,
    pub jiggle: JiggleConfig,
    pub autoclick: AutoclickConfig,
    pub hold_key: HoldKeyConfig,
    pub sprint: SprintConfig,
    pub attack: AttackConfig,
    pub go: GoConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_process: "RobloxPlayerBeta.exe".to_string(),
            monitor_index: 0,
            follow_target_monitor: true,
            ring: RingConfig::default(),
            bar: BarConfig::default(),
            jiggle: JiggleConfig::default(),
            autoclick: AutoclickConfig::default(),
            hold_key: HoldKeyConfig::default(),
            sprint: SprintConfig::default(),
            attack: AttackConfig::default(),
            go: GoConfig::default(),
        }
    }
}

/// Loads configuration from `path`, falling back to defaults.
fn load_config_from(path: &Path) -> ControlConfig {
    crate::log(&format!("Looking for config at: {}", path.display()));

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    ControlConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config_from(&crate::paths::get_config_path()));
}

/// Returns the global configuration, loading it on first use.
pub fn get_config() -> &'static ControlConfig {
    CONFIG.get_or_init(|| load_config_from(&crate::paths::get_config_path()))
}
