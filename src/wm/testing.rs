//! In-memory [`WindowSystem`] for tests.
//!
//! Windows are scripted up front; every command is recorded so tests can
//! assert on what the window manager asked the server to do.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use x11rb::protocol::xproto::{Gcontext, Pixmap, Window};

use crate::config::{Config, WmConfig};
use crate::shared::{Geometry, Point, Size};
use crate::wm::display::{WindowAttributes, WindowSystem};
use crate::wm::hints::WmHints;
use crate::wm::icons::Icon;
use crate::wm::WindowManager;

pub const ROOT: Window = 1;

/// A command the window manager sent to the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Manage(Window),
    Configure(Window, Geometry),
    Map(Window),
    Unmap(Window),
    Restack(Vec<Window>),
    Focus(Option<Window>),
    RequestClose(Window),
    Destroy(Window),
    CreateIcon(Window),
    DestroyIcon(Window),
    Clear(Window),
    CopyPixmap(Window, Pixmap),
    DrawText(Window, Point, String),
    CreatePlaceholder(Window),
    DestroyPlaceholder(Window),
    Spawn(String),
}

/// Scripted state of one window
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub attributes: WindowAttributes,
    pub hints: WmHints,
    pub class: Option<String>,
    pub transient_for: Option<Window>,
    pub name: String,
}

impl FakeWindow {
    /// A viewable, manageable window
    pub fn at(geometry: Geometry) -> Self {
        Self {
            attributes: WindowAttributes {
                geometry,
                override_redirect: false,
                viewable: true,
            },
            name: "window".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct FakeDisplay {
    windows: HashMap<Window, FakeWindow>,
    /// Top-level windows in creation order
    order: Vec<Window>,
    next_window: Window,
    pub screens: Vec<Geometry>,
    pub commands: Vec<Command>,
    pub pixmap_size: Size,
    pub fail_placeholder: bool,
}

impl FakeDisplay {
    pub fn new(screens: Vec<Geometry>) -> Self {
        Self {
            windows: HashMap::new(),
            order: Vec::new(),
            next_window: 0x1000,
            screens,
            commands: Vec::new(),
            pixmap_size: Size::new(0, 0),
            fail_placeholder: false,
        }
    }

    pub fn add_window(&mut self, window: Window, fake: FakeWindow) {
        self.windows.insert(window, fake);
        self.order.push(window);
    }

    pub fn geometry(&self, window: Window) -> Option<Geometry> {
        self.windows.get(&window).map(|w| w.attributes.geometry)
    }

    /// Move a window behind the window manager's back (as the pointer would)
    pub fn set_geometry(&mut self, window: Window, geometry: Geometry) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.attributes.geometry = geometry;
        }
    }

    fn window(&self, window: Window) -> Result<&FakeWindow> {
        self.windows
            .get(&window)
            .ok_or_else(|| anyhow!("BadWindow {}", window))
    }

    fn window_mut(&mut self, window: Window) -> Result<&mut FakeWindow> {
        self.windows
            .get_mut(&window)
            .ok_or_else(|| anyhow!("BadWindow {}", window))
    }

    fn create_overlay(&mut self, geometry: Geometry) -> Window {
        let window = self.next_window;
        self.next_window += 1;

        let mut fake = FakeWindow::at(geometry);
        fake.attributes.override_redirect = true;
        self.add_window(window, fake);
        window
    }
}

impl WindowSystem for FakeDisplay {
    fn attributes(&self, window: Window) -> Result<WindowAttributes> {
        Ok(self.window(window)?.attributes)
    }

    fn wm_hints(&self, window: Window) -> Result<WmHints> {
        Ok(self.window(window)?.hints)
    }

    fn transient_for(&self, window: Window) -> Result<Option<Window>> {
        Ok(self.window(window)?.transient_for)
    }

    fn class_name(&self, window: Window) -> Result<Option<String>> {
        Ok(self.window(window)?.class.clone())
    }

    fn icon_name(&self, window: Window) -> Result<String> {
        Ok(self.window(window)?.name.clone())
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        Ok(self.order.clone())
    }

    fn screen_boxes(&self) -> Result<Vec<Geometry>> {
        Ok(self.screens.clone())
    }

    fn manage(&mut self, window: Window, _border_width: u32) -> Result<()> {
        self.window(window)?;
        self.commands.push(Command::Manage(window));
        Ok(())
    }

    fn configure(&mut self, window: Window, geometry: Geometry) -> Result<()> {
        self.window_mut(window)?.attributes.geometry = geometry;
        self.commands.push(Command::Configure(window, geometry));
        Ok(())
    }

    fn map(&mut self, window: Window) -> Result<()> {
        self.window_mut(window)?.attributes.viewable = true;
        self.commands.push(Command::Map(window));
        Ok(())
    }

    fn unmap(&mut self, window: Window) -> Result<()> {
        self.window_mut(window)?.attributes.viewable = false;
        self.commands.push(Command::Unmap(window));
        Ok(())
    }

    fn restack(&mut self, order: &[Window]) -> Result<()> {
        self.commands.push(Command::Restack(order.to_vec()));
        Ok(())
    }

    fn set_focus(&mut self, window: Option<Window>) -> Result<()> {
        self.commands.push(Command::Focus(window));
        Ok(())
    }

    fn request_close(&mut self, window: Window) -> Result<()> {
        self.commands.push(Command::RequestClose(window));
        Ok(())
    }

    fn destroy(&mut self, window: Window) -> Result<()> {
        self.windows.remove(&window);
        self.order.retain(|&w| w != window);
        self.commands.push(Command::Destroy(window));
        Ok(())
    }

    fn create_icon(&mut self, geometry: Geometry) -> Result<(Window, Gcontext)> {
        let window = self.create_overlay(geometry);
        self.commands.push(Command::CreateIcon(window));
        Ok((window, window + 0x10000))
    }

    fn destroy_icon(&mut self, icon: &Icon) -> Result<()> {
        self.windows.remove(&icon.window);
        self.order.retain(|&w| w != icon.window);
        self.commands.push(Command::DestroyIcon(icon.window));
        Ok(())
    }

    fn clear(&mut self, window: Window) -> Result<()> {
        self.commands.push(Command::Clear(window));
        Ok(())
    }

    fn copy_pixmap(&mut self, icon: &Icon, pixmap: Pixmap) -> Result<Size> {
        self.commands.push(Command::CopyPixmap(icon.window, pixmap));
        Ok(self.pixmap_size)
    }

    fn draw_text(&mut self, icon: &Icon, origin: Point, text: &str) -> Result<()> {
        self.commands
            .push(Command::DrawText(icon.window, origin, text.to_string()));
        Ok(())
    }

    fn create_placeholder(&mut self, geometry: Geometry) -> Result<Window> {
        if self.fail_placeholder {
            bail!("pointer grab failed");
        }
        let window = self.create_overlay(geometry);
        self.commands.push(Command::CreatePlaceholder(window));
        Ok(window)
    }

    fn destroy_placeholder(&mut self, window: Window) -> Result<()> {
        self.windows.remove(&window);
        self.order.retain(|&w| w != window);
        self.commands.push(Command::DestroyPlaceholder(window));
        Ok(())
    }

    fn spawn(&mut self, command: &str) -> Result<()> {
        self.commands.push(Command::Spawn(command.to_string()));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A window manager over a single 1920x1080 screen with the default config
pub fn test_manager() -> WindowManager<FakeDisplay> {
    let config = WmConfig::try_from(&Config::default()).expect("default config is valid");
    let display = FakeDisplay::new(vec![Geometry::new(0, 0, 1920, 1080)]);
    WindowManager::new(display, config).expect("manager")
}
