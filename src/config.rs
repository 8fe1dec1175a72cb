//! Configuration system for SmallWM
//!
//! Loads configuration from TOML file at `~/.config/smallwm/config.toml`.
//! Auto-generates default config file on first run if missing.
//!
//! The file is read into [`Config`], which mirrors its layout, and then
//! validated into the immutable [`WmConfig`] the window manager consults.

use anyhow::{Context, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::shared::{Direction, Size};
use crate::wm::client::Layer;
use crate::wm::keyboard::{modifiers, KeyAction, KeyBindings};

/// Configuration errors which prevent startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one desktop is required")]
    NoDesktops,

    #[error("icon size must be non-zero, got {0}x{1}")]
    EmptyIcon(u32, u32),

    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),

    #[error("invalid mouse button {0} (expected 1-5)")]
    InvalidButton(u8),

    #[error("move and resize must use different buttons (both are {0})")]
    ButtonConflict(u8),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classes whose windows are never focused automatically
    pub no_autofocus: Vec<String>,
    pub general: GeneralConfig,
    pub input: InputConfig,
    /// Action name to key name
    pub keyboard: BTreeMap<String, String>,
    pub class_actions: BTreeMap<String, ClassActionConfig>,
}

impl Config {
    /// Load configuration from `path` (or the default location), writing a
    /// default file if there is none
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("smallwm");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let mut default_config = Self::default();
        default_config.keyboard = KeyAction::defaults()
            .into_iter()
            .map(|(_, name, key)| (name, key))
            .collect();

        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// How hotkeys pick the client they act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyMode {
    /// The client under the pointer
    #[default]
    Mouse,
    /// The focused client
    Focus,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Command run by the launch button on the root window
    pub shell: String,
    /// Command run by the `run` hotkey
    pub launcher: String,
    pub desktops: u32,
    pub icon_width: u32,
    pub icon_height: u32,
    pub border_width: u32,
    /// Draw the application's icon pixmap inside icon windows
    pub show_icons: bool,
    pub hotkey_mode: HotkeyMode,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            shell: "xterm".to_string(),
            launcher: "dmenu_run".to_string(),
            desktops: 5,
            icon_width: 75,
            icon_height: 20,
            border_width: 2,
            show_icons: true,
            hotkey_mode: HotkeyMode::Mouse,
            log_level: "smallwm=info,warn".to_string(),
        }
    }
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Modifier held for every hotkey and move/resize/launch click
    pub action_modifier: String,
    /// Extra modifier for bindings written with a leading `!`
    pub secondary_modifier: String,
    pub move_button: u8,
    pub resize_button: u8,
    pub launch_button: u8,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            action_modifier: "super".to_string(),
            secondary_modifier: "shift".to_string(),
            move_button: 1,
            resize_button: 3,
            launch_button: 1,
        }
    }
}

/// Per-class rule as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassActionConfig {
    pub stick: bool,
    pub maximize: bool,
    pub layer: Option<u8>,
    pub snap: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
}

bitflags! {
    /// Boolean class rules
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActionFlags: u8 {
        const STICK    = 1 << 0;
        const MAXIMIZE = 1 << 1;
    }
}

/// A validated per-class rule set
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassActions {
    pub flags: ActionFlags,
    pub layer: Option<Layer>,
    pub snap: Option<Direction>,
    /// Position as fractions of the containing screen's size
    pub relative_x: Option<f32>,
    pub relative_y: Option<f32>,
}

impl ClassActions {
    /// Validate a raw rule, dropping the fields that make no sense
    fn from_config(class: &str, raw: &ClassActionConfig) -> Self {
        let mut actions = ClassActions::default();
        actions.flags.set(ActionFlags::STICK, raw.stick);
        actions.flags.set(ActionFlags::MAXIMIZE, raw.maximize);

        if let Some(value) = raw.layer {
            actions.layer = Layer::new(value);
            if actions.layer.is_none() {
                warn!("Class '{}': layer {} out of range, ignoring", class, value);
            }
        }

        if let Some(name) = &raw.snap {
            actions.snap = Direction::from_name(name);
            if actions.snap.is_none() {
                warn!("Class '{}': unknown snap direction '{}', ignoring", class, name);
            }
        }

        let fraction = |axis: &str, value: Option<f32>| {
            value.filter(|v| {
                let valid = (0.0..=1.0).contains(v);
                if !valid {
                    warn!("Class '{}': {} = {} is not within [0, 1], ignoring", class, axis, v);
                }
                valid
            })
        };
        actions.relative_x = fraction("x", raw.x);
        actions.relative_y = fraction("y", raw.y);

        actions
    }
}

/// Validated configuration consulted by the window manager
#[derive(Debug, Clone)]
pub struct WmConfig {
    pub shell: String,
    pub launcher: String,
    pub desktops: u32,
    pub icon_size: Size,
    pub border_width: u32,
    pub show_icons: bool,
    pub hotkey_mode: HotkeyMode,
    pub action_modifier: u16,
    pub secondary_modifier: u16,
    pub move_button: u8,
    pub resize_button: u8,
    pub launch_button: u8,
    pub key_bindings: KeyBindings,
    pub no_autofocus: HashSet<String>,
    pub class_actions: HashMap<String, ClassActions>,
}

impl TryFrom<&Config> for WmConfig {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let general = &config.general;
        let input = &config.input;

        if general.desktops == 0 {
            return Err(ConfigError::NoDesktops);
        }
        if general.icon_width == 0 || general.icon_height == 0 {
            return Err(ConfigError::EmptyIcon(general.icon_width, general.icon_height));
        }

        let modifier = |name: &str| {
            modifiers::from_name(name).ok_or_else(|| ConfigError::UnknownModifier(name.to_string()))
        };
        let action_modifier = modifier(&input.action_modifier)?;
        let secondary_modifier = modifier(&input.secondary_modifier)?;

        for button in [input.move_button, input.resize_button, input.launch_button] {
            if !(1..=5).contains(&button) {
                return Err(ConfigError::InvalidButton(button));
            }
        }
        if input.move_button == input.resize_button {
            return Err(ConfigError::ButtonConflict(input.move_button));
        }

        let overrides: HashMap<String, String> = config
            .keyboard
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let class_actions = config
            .class_actions
            .iter()
            .map(|(class, raw)| (class.clone(), ClassActions::from_config(class, raw)))
            .collect();

        Ok(Self {
            shell: general.shell.clone(),
            launcher: general.launcher.clone(),
            desktops: general.desktops,
            icon_size: Size::new(general.icon_width, general.icon_height),
            border_width: general.border_width,
            show_icons: general.show_icons,
            hotkey_mode: general.hotkey_mode,
            action_modifier,
            secondary_modifier,
            move_button: input.move_button,
            resize_button: input.resize_button,
            launch_button: input.launch_button,
            key_bindings: KeyBindings::new(&overrides),
            no_autofocus: config.no_autofocus.iter().cloned().collect(),
            class_actions,
        })
    }
}
