//! Display Module
//!
//! The window system contract the window manager is written against, and
//! its X11 implementation on top of x11rb.
//!
//! Everything here is transport: the policy decisions live in the
//! dispatcher, reconcile and effects code, which only see [`WindowSystem`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::{CURRENT_TIME, NONE};

use crate::config::WmConfig;
use crate::shared::{Geometry, Point, Size};
use crate::wm::events::WmEvent;
use crate::wm::hints::{self, WmHints};
use crate::wm::icons::Icon;
use crate::wm::keyboard::{modifiers, Keysym};

/// The window attributes the window manager cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowAttributes {
    pub geometry: Geometry,
    /// The window asked not to be managed
    pub override_redirect: bool,
    pub viewable: bool,
}

/// Operations the window manager needs from the window system.
///
/// Queries take `&self`; commands take `&mut self`. Every call may fail
/// (the window may be gone by the time the request arrives), and callers
/// abandon the current operation when one does.
pub trait WindowSystem {
    fn attributes(&self, window: Window) -> Result<WindowAttributes>;
    fn wm_hints(&self, window: Window) -> Result<WmHints>;
    /// The window this one is transient for, if any
    fn transient_for(&self, window: Window) -> Result<Option<Window>>;
    /// The class part of WM_CLASS
    fn class_name(&self, window: Window) -> Result<Option<String>>;
    /// The name to show on the window's icon
    fn icon_name(&self, window: Window) -> Result<String>;
    /// Direct children of the root, bottom to top
    fn top_level_windows(&self) -> Result<Vec<Window>>;
    /// Rectangles of the active outputs
    fn screen_boxes(&self) -> Result<Vec<Geometry>>;

    /// Prepare a newly managed client: border and click-to-focus grab
    fn manage(&mut self, window: Window, border_width: u32) -> Result<()>;
    fn configure(&mut self, window: Window, geometry: Geometry) -> Result<()>;
    fn map(&mut self, window: Window) -> Result<()>;
    fn unmap(&mut self, window: Window) -> Result<()>;
    /// Restack `order` bottom to top
    fn restack(&mut self, order: &[Window]) -> Result<()>;
    fn set_focus(&mut self, window: Option<Window>) -> Result<()>;
    /// Ask a client to close itself (WM_DELETE_WINDOW)
    fn request_close(&mut self, window: Window) -> Result<()>;
    fn destroy(&mut self, window: Window) -> Result<()>;

    /// Create and map an icon window with its drawing context
    fn create_icon(&mut self, geometry: Geometry) -> Result<(Window, Gcontext)>;
    fn destroy_icon(&mut self, icon: &Icon) -> Result<()>;
    fn clear(&mut self, window: Window) -> Result<()>;
    /// Copy a pixmap to the top-left of an icon, returning its size
    fn copy_pixmap(&mut self, icon: &Icon, pixmap: Pixmap) -> Result<Size>;
    /// Draw text with its baseline at `origin`
    fn draw_text(&mut self, icon: &Icon, origin: Point, text: &str) -> Result<()>;

    /// Create, map and grab the pointer with a move/resize placeholder
    fn create_placeholder(&mut self, geometry: Geometry) -> Result<Window>;
    fn destroy_placeholder(&mut self, window: Window) -> Result<()>;

    /// Start `command` through `/bin/sh` without waiting for it
    fn spawn(&mut self, command: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Atoms interned at startup
#[derive(Debug, Clone, Copy)]
struct Atoms {
    wm_protocols: Atom,
    wm_delete_window: Atom,
}

impl Atoms {
    fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_delete_window: intern("WM_DELETE_WINDOW")?,
        })
    }
}

/// [`WindowSystem`] backed by an X server connection
pub struct X11Display {
    conn: Arc<RustConnection>,
    root: Window,
    screen_num: usize,
    atoms: Atoms,
    font: Font,
    /// keycode to keysym (first column of the keyboard mapping)
    keymap: HashMap<Keycode, Keysym>,
    /// Map/unmap notifications caused by our own requests, to be swallowed
    pending_maps: HashMap<Window, u32>,
    pending_unmaps: HashMap<Window, u32>,
}

impl X11Display {
    /// Take over the root window as its window manager.
    ///
    /// Fails if another client already redirects the root's substructure.
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self> {
        let root = conn.setup().roots[screen_num].root;
        info!("Initializing window manager on screen {}, root 0x{:x}", screen_num, root);

        let event_mask = EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY;
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(event_mask),
        )?
        .check()
        .context("Failed to select events on root window - is another WM running?")?;

        if let Err(e) = conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE) {
            warn!("RandR unavailable, screen changes will be missed: {}", e);
        }

        let atoms = Atoms::new(conn.as_ref())?;

        let font = conn.generate_id()?;
        conn.open_font(font, b"fixed")?;

        let mut display = Self {
            conn,
            root,
            screen_num,
            atoms,
            font,
            keymap: HashMap::new(),
            pending_maps: HashMap::new(),
            pending_unmaps: HashMap::new(),
        };
        display.refresh_keymap()?;
        display.conn.flush()?;

        info!("Successfully became window manager");
        Ok(display)
    }

    fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    fn refresh_keymap(&mut self) -> Result<()> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let mapping = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)?
            .reply()
            .context("Failed to read keyboard mapping")?;

        let per_keycode = usize::from(mapping.keysyms_per_keycode).max(1);
        self.keymap = mapping
            .keysyms
            .chunks(per_keycode)
            .zip(min..=max)
            .filter_map(|(syms, keycode)| syms.first().map(|&sym| (keycode, sym)))
            .filter(|&(_, sym)| sym != 0)
            .collect();

        debug!("Loaded keyboard mapping for {} keycodes", self.keymap.len());
        Ok(())
    }

    fn keycodes_for(&self, keysym: Keysym) -> Vec<Keycode> {
        self.keymap
            .iter()
            .filter(|&(_, &sym)| sym == keysym)
            .map(|(&code, _)| code)
            .collect()
    }

    /// Register the passive grabs for hotkeys and root-window buttons
    pub fn grab_bindings(&mut self, config: &WmConfig) -> Result<()> {
        self.conn.ungrab_key(Grab::ANY, self.root, ModMask::ANY)?;

        for (binding, action) in config.key_bindings.iter() {
            let mut mask = config.action_modifier;
            if binding.secondary {
                mask |= config.secondary_modifier;
            }

            let keycodes = self.keycodes_for(binding.keysym);
            if keycodes.is_empty() {
                debug!("No keycode for keysym 0x{:x} ({:?})", binding.keysym, action);
            }
            for keycode in keycodes {
                for ignored in modifiers::IGNORED {
                    self.conn.grab_key(
                        true,
                        self.root,
                        ModMask::from(mask | ignored),
                        keycode,
                        GrabMode::ASYNC,
                        GrabMode::ASYNC,
                    )?;
                }
            }
        }

        let mut buttons = vec![config.move_button, config.resize_button, config.launch_button];
        buttons.sort_unstable();
        buttons.dedup();
        for button in buttons {
            for ignored in modifiers::IGNORED {
                self.conn.grab_button(
                    false,
                    self.root,
                    EventMask::BUTTON_PRESS,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                    NONE,
                    NONE,
                    ButtonIndex::from(button),
                    ModMask::from(config.action_modifier | ignored),
                )?;
            }
        }

        self.conn.flush()?;
        Ok(())
    }

    fn consume_pending(pending: &mut HashMap<Window, u32>, window: Window) -> bool {
        match pending.get_mut(&window) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    pending.remove(&window);
                }
                true
            }
            None => false,
        }
    }

    /// Turn an X event into a dispatcher event.
    ///
    /// Requests that only need forwarding (map and configure requests) are
    /// answered here, and notifications caused by our own map/unmap calls
    /// are dropped.
    pub fn translate(&mut self, event: Event) -> Result<Option<WmEvent>> {
        let translated = match event {
            Event::RandrScreenChangeNotify(_) => Some(WmEvent::ScreenChange),

            Event::MappingNotify(e) => {
                if e.request == Mapping::KEYBOARD {
                    self.refresh_keymap()?;
                }
                None
            }

            Event::KeyPress(e) => {
                let keysym = self.keymap.get(&e.detail).copied().unwrap_or(0);
                Some(WmEvent::KeyPress {
                    keysym,
                    state: u16::from(e.state),
                    window: e.event,
                    subwindow: e.child,
                })
            }

            Event::ButtonPress(e) => {
                // Clicks caught by the click-to-focus grab are frozen until replayed
                self.conn.allow_events(Allow::REPLAY_POINTER, e.time)?;
                Some(WmEvent::ButtonPress {
                    button: e.detail,
                    state: u16::from(e.state),
                    window: e.event,
                    subwindow: e.child,
                    pointer: Point::new(e.root_x.into(), e.root_y.into()),
                })
            }

            Event::ButtonRelease(e) => Some(WmEvent::ButtonRelease { window: e.event }),

            Event::MotionNotify(e) => Some(WmEvent::Motion {
                window: e.event,
                pointer: Point::new(e.root_x.into(), e.root_y.into()),
            }),

            Event::MapRequest(e) => {
                self.conn.map_window(e.window)?;
                None
            }

            Event::ConfigureRequest(e) => {
                let aux = ConfigureWindowAux::from_configure_request(&e);
                self.conn.configure_window(e.window, &aux)?;
                None
            }

            Event::MapNotify(e) => {
                if Self::consume_pending(&mut self.pending_maps, e.window) {
                    None
                } else {
                    Some(WmEvent::Map { window: e.window })
                }
            }

            Event::UnmapNotify(e) => {
                if e.event != self.root
                    || Self::consume_pending(&mut self.pending_unmaps, e.window)
                {
                    None
                } else {
                    Some(WmEvent::Unmap { window: e.window })
                }
            }

            Event::Expose(e) if e.count == 0 => Some(WmEvent::Expose { window: e.window }),

            Event::DestroyNotify(e) => {
                self.pending_maps.remove(&e.window);
                self.pending_unmaps.remove(&e.window);
                Some(WmEvent::Destroy { window: e.window })
            }

            Event::Error(e) => {
                debug!("X11 error: {:?}", e);
                None
            }

            other => {
                trace!("Ignoring event {:?}", other);
                None
            }
        };
        Ok(translated)
    }

    fn read_string(&self, window: Window, property: AtomEnum) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 1024)?
            .reply()?;
        if reply.value.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()))
    }
}

impl WindowSystem for X11Display {
    fn attributes(&self, window: Window) -> Result<WindowAttributes> {
        let attrs = self
            .conn
            .get_window_attributes(window)?
            .reply()
            .with_context(|| format!("Failed to get attributes of window {}", window))?;
        let geom = self
            .conn
            .get_geometry(window)?
            .reply()
            .with_context(|| format!("Failed to get geometry of window {}", window))?;

        Ok(WindowAttributes {
            geometry: Geometry::new(
                geom.x.into(),
                geom.y.into(),
                geom.width.into(),
                geom.height.into(),
            ),
            override_redirect: attrs.override_redirect,
            viewable: attrs.map_state != MapState::UNMAPPED,
        })
    }

    fn wm_hints(&self, window: Window) -> Result<WmHints> {
        hints::read_wm_hints(self.conn.as_ref(), window)
    }

    fn transient_for(&self, window: Window) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(false, window, AtomEnum::WM_TRANSIENT_FOR, AtomEnum::WINDOW, 0, 1)?
            .reply()?;
        Ok(reply
            .value32()
            .and_then(|mut values| values.next())
            .filter(|&w| w != NONE))
    }

    fn class_name(&self, window: Window) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)?
            .reply()?;

        // WM_CLASS format: "res_name\0res_class\0"
        Ok(reply
            .value
            .split(|&b| b == 0)
            .nth(1)
            .filter(|class| !class.is_empty())
            .map(|class| String::from_utf8_lossy(class).into_owned()))
    }

    fn icon_name(&self, window: Window) -> Result<String> {
        if let Some(name) = self.read_string(window, AtomEnum::WM_ICON_NAME)? {
            return Ok(name);
        }
        Ok(self.read_string(window, AtomEnum::WM_NAME)?.unwrap_or_default())
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        Ok(self.conn.query_tree(self.root)?.reply()?.children)
    }

    fn screen_boxes(&self) -> Result<Vec<Geometry>> {
        let screen = self.screen();
        let whole = Geometry::new(
            0,
            0,
            screen.width_in_pixels.into(),
            screen.height_in_pixels.into(),
        );

        let resources = match self
            .conn
            .randr_get_screen_resources_current(self.root)
            .map_err(anyhow::Error::from)
            .and_then(|cookie| cookie.reply().map_err(anyhow::Error::from))
        {
            Ok(resources) => resources,
            Err(e) => {
                debug!("RandR screen resources unavailable ({}), using the root window", e);
                return Ok(vec![whole]);
            }
        };

        let mut boxes = Vec::new();
        for crtc in resources.crtcs {
            let info = self
                .conn
                .randr_get_crtc_info(crtc, resources.config_timestamp)?
                .reply()?;
            if info.width == 0 || info.height == 0 || info.outputs.is_empty() {
                continue;
            }
            boxes.push(Geometry::new(
                info.x.into(),
                info.y.into(),
                info.width.into(),
                info.height.into(),
            ));
        }

        if boxes.is_empty() {
            boxes.push(whole);
        }
        debug!("Screens: {:?}", boxes);
        Ok(boxes)
    }

    fn manage(&mut self, window: Window, border_width: u32) -> Result<()> {
        let black = self.screen().black_pixel;
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().border_width(border_width),
        )?;
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(black),
        )?;

        for ignored in modifiers::IGNORED {
            self.conn.grab_button(
                false,
                window,
                EventMask::BUTTON_PRESS,
                GrabMode::SYNC,
                GrabMode::ASYNC,
                NONE,
                NONE,
                ButtonIndex::ANY,
                ModMask::from(ignored),
            )?;
        }
        Ok(())
    }

    fn configure(&mut self, window: Window, geometry: Geometry) -> Result<()> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(geometry.x)
                .y(geometry.y)
                .width(geometry.width.max(1))
                .height(geometry.height.max(1)),
        )?;
        Ok(())
    }

    fn map(&mut self, window: Window) -> Result<()> {
        if !self.attributes(window)?.viewable {
            *self.pending_maps.entry(window).or_insert(0) += 1;
            self.conn.map_window(window)?;
        }
        Ok(())
    }

    fn unmap(&mut self, window: Window) -> Result<()> {
        if self.attributes(window)?.viewable {
            *self.pending_unmaps.entry(window).or_insert(0) += 1;
            self.conn.unmap_window(window)?;
        }
        Ok(())
    }

    fn restack(&mut self, order: &[Window]) -> Result<()> {
        for pair in order.windows(2) {
            self.conn.configure_window(
                pair[1],
                &ConfigureWindowAux::new()
                    .sibling(pair[0])
                    .stack_mode(StackMode::ABOVE),
            )?;
        }
        Ok(())
    }

    fn set_focus(&mut self, window: Option<Window>) -> Result<()> {
        let target = window.unwrap_or(self.root);
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, target, CURRENT_TIME)?;
        Ok(())
    }

    fn request_close(&mut self, window: Window) -> Result<()> {
        info!("Closing window {}", window);
        let event = ClientMessageEvent::new(
            32,
            window,
            self.atoms.wm_protocols,
            [self.atoms.wm_delete_window, 0, 0, 0, 0],
        );
        self.conn
            .send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    fn destroy(&mut self, window: Window) -> Result<()> {
        info!("Destroying window {}", window);
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn create_icon(&mut self, geometry: Geometry) -> Result<(Window, Gcontext)> {
        let (depth, white, black) = {
            let screen = self.screen();
            (screen.root_depth, screen.white_pixel, screen.black_pixel)
        };

        let window = self.conn.generate_id()?;
        self.conn.create_window(
            depth,
            window,
            self.root,
            geometry.x as i16,
            geometry.y as i16,
            geometry.width as u16,
            geometry.height as u16,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .override_redirect(1u32)
                .background_pixel(white)
                .border_pixel(black)
                .event_mask(EventMask::EXPOSURE | EventMask::BUTTON_PRESS),
        )?;

        let gc = self.conn.generate_id()?;
        self.conn.create_gc(
            gc,
            window,
            &CreateGCAux::new()
                .foreground(black)
                .background(white)
                .font(self.font),
        )?;

        self.conn.map_window(window)?;
        Ok((window, gc))
    }

    fn destroy_icon(&mut self, icon: &Icon) -> Result<()> {
        self.conn.free_gc(icon.gc)?;
        self.conn.destroy_window(icon.window)?;
        Ok(())
    }

    fn clear(&mut self, window: Window) -> Result<()> {
        self.conn.clear_area(false, window, 0, 0, 0, 0)?;
        Ok(())
    }

    fn copy_pixmap(&mut self, icon: &Icon, pixmap: Pixmap) -> Result<Size> {
        let geom = self
            .conn
            .get_geometry(pixmap)?
            .reply()
            .context("Failed to get icon pixmap geometry")?;

        if geom.depth == 1 {
            self.conn.copy_plane(
                pixmap, icon.window, icon.gc, 0, 0, 0, 0, geom.width, geom.height, 1,
            )?;
        } else {
            self.conn.copy_area(
                pixmap, icon.window, icon.gc, 0, 0, 0, 0, geom.width, geom.height,
            )?;
        }
        Ok(Size::new(geom.width.into(), geom.height.into()))
    }

    fn draw_text(&mut self, icon: &Icon, origin: Point, text: &str) -> Result<()> {
        // ImageText8 carries at most 255 bytes
        let bytes: Vec<u8> = text.bytes().take(255).collect();
        self.conn.image_text8(
            icon.window,
            icon.gc,
            origin.x as i16,
            origin.y as i16,
            &bytes,
        )?;
        Ok(())
    }

    fn create_placeholder(&mut self, geometry: Geometry) -> Result<Window> {
        let (depth, black) = {
            let screen = self.screen();
            (screen.root_depth, screen.black_pixel)
        };

        let window = self.conn.generate_id()?;
        self.conn.create_window(
            depth,
            window,
            self.root,
            geometry.x as i16,
            geometry.y as i16,
            geometry.width.max(1) as u16,
            geometry.height.max(1) as u16,
            1,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .override_redirect(1u32)
                .background_pixel(black)
                .event_mask(EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION),
        )?;
        self.conn.map_window(window)?;

        let grab = self
            .conn
            .grab_pointer(
                false,
                window,
                EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                NONE,
                CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            self.conn.destroy_window(window)?;
            bail!("Failed to grab the pointer for placeholder ({:?})", grab.status);
        }

        Ok(window)
    }

    fn destroy_placeholder(&mut self, window: Window) -> Result<()> {
        self.conn.ungrab_pointer(CURRENT_TIME)?;
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn spawn(&mut self, command: &str) -> Result<()> {
        info!("Launching {}", command);
        // The tokio runtime reaps the child once it exits
        tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("exec {}", command))
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch {}", command))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
