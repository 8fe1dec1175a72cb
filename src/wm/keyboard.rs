//! Keyboard Module
//!
//! Hotkey actions and their bindings. Bindings are keyed by keysym rather
//! than keycode; the display layer maps between the two. Every binding
//! implies the action modifier, and a binding may additionally require the
//! secondary modifier (written with a leading `!` in the config file).

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::shared::Direction;
use crate::wm::client::Layer;

/// X11 keysym value
pub type Keysym = u32;

/// Modifier bits as they appear in key and button event state
pub mod modifiers {
    pub const SHIFT: u16 = 1 << 0;
    pub const LOCK: u16 = 1 << 1;
    pub const CONTROL: u16 = 1 << 2;
    pub const MOD1: u16 = 1 << 3;
    pub const MOD2: u16 = 1 << 4;
    pub const MOD4: u16 = 1 << 6;

    /// Bits that never change the meaning of a binding (Caps Lock, Num Lock)
    pub const IGNORED: [u16; 4] = [0, LOCK, MOD2, LOCK | MOD2];

    /// Strip lock modifiers and pointer button bits from an event state
    pub fn clean(state: u16) -> u16 {
        state & 0xff & !(LOCK | MOD2)
    }

    /// Parse a modifier name from the config file
    pub fn from_name(name: &str) -> Option<u16> {
        match name.to_ascii_lowercase().as_str() {
            "shift" => Some(SHIFT),
            "control" | "ctrl" => Some(CONTROL),
            "alt" | "mod1" => Some(MOD1),
            "super" | "mod4" | "win" => Some(MOD4),
            _ => None,
        }
    }
}

/// Hotkey action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    ClientNextDesktop,
    ClientPrevDesktop,
    NextDesktop,
    PrevDesktop,
    ToggleStick,
    Iconify,
    Maximize,
    RequestClose,
    ForceClose,
    Snap(Direction),
    Screen(Direction),
    LayerAbove,
    LayerBelow,
    LayerTop,
    LayerBottom,
    SetLayer(Layer),
    CycleFocus,
    CycleFocusBack,
    Run,
    Exit,
}

const DIRECTIONS: [(Direction, &str, &str); 4] = [
    (Direction::Top, "top", "Up"),
    (Direction::Bottom, "bottom", "Down"),
    (Direction::Left, "left", "Left"),
    (Direction::Right, "right", "Right"),
];

impl KeyAction {
    /// Every action, paired with its config name and default key
    pub fn defaults() -> Vec<(KeyAction, String, String)> {
        let mut table: Vec<(KeyAction, String, String)> = [
            (KeyAction::ClientNextDesktop, "client-next-desktop", "bracketright"),
            (KeyAction::ClientPrevDesktop, "client-prev-desktop", "bracketleft"),
            (KeyAction::NextDesktop, "next-desktop", "period"),
            (KeyAction::PrevDesktop, "prev-desktop", "comma"),
            (KeyAction::ToggleStick, "toggle-stick", "backslash"),
            (KeyAction::Iconify, "iconify", "h"),
            (KeyAction::Maximize, "maximize", "m"),
            (KeyAction::RequestClose, "request-close", "c"),
            (KeyAction::ForceClose, "force-close", "x"),
            (KeyAction::LayerAbove, "layer-above", "Page_Up"),
            (KeyAction::LayerBelow, "layer-below", "Page_Down"),
            (KeyAction::LayerTop, "layer-top", "Home"),
            (KeyAction::LayerBottom, "layer-bottom", "End"),
            (KeyAction::CycleFocus, "cycle-focus", "Tab"),
            (KeyAction::CycleFocusBack, "cycle-focus-back", "!Tab"),
            (KeyAction::Run, "run", "r"),
            (KeyAction::Exit, "exit", "Escape"),
        ]
        .into_iter()
        .map(|(action, name, key)| (action, name.to_string(), key.to_string()))
        .collect();

        for (direction, name, key) in DIRECTIONS {
            table.push((KeyAction::Snap(direction), format!("snap-{name}"), key.to_string()));
            table.push((KeyAction::Screen(direction), format!("screen-{name}"), format!("!{key}")));
        }

        for value in Layer::MIN.value()..=Layer::MAX.value() {
            if let Some(layer) = Layer::new(value) {
                table.push((KeyAction::SetLayer(layer), format!("layer-{value}"), value.to_string()));
            }
        }

        table
    }

    /// Whether the action operates on a client window
    pub fn needs_target(self) -> bool {
        !matches!(
            self,
            KeyAction::NextDesktop
                | KeyAction::PrevDesktop
                | KeyAction::CycleFocus
                | KeyAction::CycleFocusBack
                | KeyAction::Run
                | KeyAction::Exit
        )
    }
}

/// A physical key combination (the action modifier is implied)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub keysym: Keysym,
    pub secondary: bool,
}

impl KeyBinding {
    /// Parse `"name"` or `"!name"`
    pub fn parse(spec: &str) -> Option<Self> {
        let (secondary, name) = match spec.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        keysym_from_name(name).map(|keysym| Self { keysym, secondary })
    }
}

/// Look up the keysym for an X keysym name
pub fn keysym_from_name(name: &str) -> Option<Keysym> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphanumeric() {
            // Latin-1 keysyms equal their code points
            return Some(c as Keysym);
        }
    }

    if let Some(n) = name.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=35).contains(&n) {
            return Some(0xffbe + n - 1);
        }
    }

    let keysym = match name {
        "space" => 0x0020,
        "comma" => 0x002c,
        "minus" => 0x002d,
        "period" => 0x002e,
        "slash" => 0x002f,
        "semicolon" => 0x003b,
        "equal" => 0x003d,
        "bracketleft" => 0x005b,
        "backslash" => 0x005c,
        "bracketright" => 0x005d,
        "grave" => 0x0060,
        "apostrophe" => 0x0027,
        "BackSpace" => 0xff08,
        "Tab" => 0xff09,
        "Return" => 0xff0d,
        "Escape" => 0xff1b,
        "Home" => 0xff50,
        "Left" => 0xff51,
        "Up" => 0xff52,
        "Right" => 0xff53,
        "Down" => 0xff54,
        "Page_Up" | "Prior" => 0xff55,
        "Page_Down" | "Next" => 0xff56,
        "End" => 0xff57,
        "Insert" => 0xff63,
        "Delete" => 0xffff,
        _ => return None,
    };
    Some(keysym)
}

/// Immutable table of hotkeys, consulted at dispatch time
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    by_binding: HashMap<KeyBinding, KeyAction>,
}

impl KeyBindings {
    /// Build the table from defaults, replacing keys named in `overrides`
    /// (action name to key spec). Unknown names and keys are skipped; when
    /// two actions share a key the later one loses its binding.
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        let defaults = KeyAction::defaults();

        for name in overrides.keys() {
            if !defaults.iter().any(|(_, n, _)| n == name) {
                warn!("Unknown keyboard action '{}' in config", name);
            }
        }

        let mut bindings = Self::default();
        for (action, name, default_key) in defaults {
            let spec = overrides.get(&name).unwrap_or(&default_key);
            let Some(binding) = KeyBinding::parse(spec) else {
                warn!("Unknown key '{}' for action '{}'", spec, name);
                continue;
            };

            if let Some(existing) = bindings.by_binding.get(&binding) {
                warn!(
                    "Key '{}' for '{}' is already bound to {:?}, dropping",
                    spec, name, existing
                );
                continue;
            }

            debug!("Binding {:?} to {:?}", binding, action);
            bindings.by_binding.insert(binding, action);
        }
        bindings
    }

    pub fn action(&self, binding: KeyBinding) -> Option<KeyAction> {
        self.by_binding.get(&binding).copied()
    }

    /// All bindings, for registering key grabs
    pub fn iter(&self) -> impl Iterator<Item = (&KeyBinding, &KeyAction)> {
        self.by_binding.iter()
    }
}
