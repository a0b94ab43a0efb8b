// SPDX-License-Identifier: GPL-3.0-only

//! Terminal magnifier
//!
//! Renders the camera feed with Unicode half-block characters, two pixels
//! per cell. The terminal owns the lifecycle scope: losing focus pauses the
//! camera and regaining it resumes, unless the view is frozen.

use crate::backends::camera::{CameraFrame, CameraPlatform, LifecycleScope};
use crate::constants::{timing, zoom};
use crate::errors::AppResult;
use crate::session::{CameraSession, SessionSettings, SessionState};
use crate::storage;

use crossterm::{
    event::{
        self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{error, info};

/// Front-end settings taken from the configuration
#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub zoom_step: f32,
    pub mirror: bool,
    pub snapshot_dir: PathBuf,
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ZoomIn,
    ZoomOut,
    ZoomReset,
    ToggleTorch,
    ToggleFreeze,
    Save,
    ClearError,
    ToggleHelp,
    Quit,
}

/// Map a key press to an action
pub fn action_for(key: &KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }
    match key.code {
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => Some(Action::ZoomIn),
        KeyCode::Char('-') | KeyCode::Down => Some(Action::ZoomOut),
        KeyCode::Char('0') => Some(Action::ZoomReset),
        KeyCode::Char('f') => Some(Action::ToggleTorch),
        KeyCode::Char(' ') => Some(Action::ToggleFreeze),
        KeyCode::Char('s') => Some(Action::Save),
        KeyCode::Char('c') => Some(Action::ClearError),
        KeyCode::Char('h') => Some(Action::ToggleHelp),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

/// Run the terminal magnifier until the user quits
///
/// Creates the session, binds the camera and releases everything on exit,
/// including when drawing fails.
pub fn run(
    runtime: &Runtime,
    platform: Arc<dyn CameraPlatform>,
    settings: SessionSettings,
    options: TerminalOptions,
) -> AppResult<()> {
    let scope = LifecycleScope::active("terminal");
    let session = Arc::new(CameraSession::with_settings(platform, scope.clone(), settings));

    if !runtime.block_on(session.initialize()) {
        info!("Camera not bound at startup, the status bar shows why");
    }

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = Magnifier::new(runtime, &session, &scope, options).run(&mut terminal);

    // Restore the terminal before anything else can print
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    runtime.block_on(session.release());
    scope.destroy();
    result
}

/// Interactive loop state
struct Magnifier<'a> {
    runtime: &'a Runtime,
    session: &'a CameraSession,
    scope: &'a LifecycleScope,
    options: TerminalOptions,
    frame: FrameWidget,
    show_help: bool,
    /// Last one-off message (saved path, nothing to freeze, ...)
    notice: Option<String>,
}

impl<'a> Magnifier<'a> {
    fn new(
        runtime: &'a Runtime,
        session: &'a CameraSession,
        scope: &'a LifecycleScope,
        options: TerminalOptions,
    ) -> Self {
        let frame = FrameWidget::new(options.mirror);
        Self {
            runtime,
            session,
            scope,
            options,
            frame,
            show_help: false,
            notice: None,
        }
    }

    fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> AppResult<()> {
        let states = self.session.subscribe();

        loop {
            let state = states.borrow().clone();

            // A frozen view keeps the still it captured
            if !state.frozen
                && let Some(frame) = self.session.capture_frame()
            {
                self.frame.frame = Some(frame);
            }

            let status = if self.show_help {
                help_line()
            } else {
                status_line(&state, self.notice.as_deref())
            };

            terminal.draw(|f| {
                let area = f.area();
                let camera_area = Rect {
                    height: area.height.saturating_sub(1),
                    ..area
                };
                let status_area = Rect {
                    y: area.y + area.height.saturating_sub(1),
                    height: 1.min(area.height),
                    ..area
                };
                f.render_widget(&self.frame, camera_area);
                f.render_widget(
                    StatusBar {
                        message: &status,
                        alert: state.error.is_some(),
                    },
                    status_area,
                );
            })?;

            if !event::poll(timing::TERMINAL_POLL_INTERVAL)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) => {
                    if let Some(action) = action_for(&key)
                        && !self.apply(action, &state)
                    {
                        break;
                    }
                }
                Event::FocusLost => self.on_focus_lost(&state),
                Event::FocusGained => self.on_focus_gained(&state),
                _ => {}
            }
        }

        Ok(())
    }

    /// Handle one action; false means quit
    fn apply(&mut self, action: Action, state: &SessionState) -> bool {
        if action != Action::ToggleHelp {
            self.show_help = false;
        }

        match action {
            Action::Quit => return false,
            Action::ZoomIn => {
                let level = state.zoom_level + self.options.zoom_step;
                self.runtime.block_on(self.session.set_zoom(level));
            }
            Action::ZoomOut => {
                let level = state.zoom_level - self.options.zoom_step;
                self.runtime.block_on(self.session.set_zoom(level));
            }
            Action::ZoomReset => {
                self.runtime.block_on(self.session.set_zoom(zoom::DEFAULT_ZOOM));
            }
            Action::ToggleTorch => {
                let enabled = self.runtime.block_on(self.session.toggle_flash());
                self.notice = Some(if enabled { "Torch on" } else { "Torch off" }.to_string());
            }
            Action::ToggleFreeze => self.toggle_freeze(state),
            Action::Save => self.save(),
            Action::ClearError => {
                self.session.clear_error();
                self.notice = None;
                // Never bound: treat it as a retry
                if !state.initialized && !state.loading {
                    info!("Retrying camera initialization");
                    self.runtime.block_on(self.session.initialize());
                }
            }
            Action::ToggleHelp => self.show_help = !self.show_help,
        }
        true
    }

    fn toggle_freeze(&mut self, state: &SessionState) {
        if state.frozen {
            self.session.set_frozen(false);
            self.notice = None;
            self.runtime.block_on(self.session.resume());
            return;
        }

        match self.session.capture_frame() {
            Some(still) => {
                self.frame.frame = Some(still);
                self.runtime.block_on(self.session.pause());
                self.session.set_frozen(true);
                self.notice = None;
            }
            None => self.notice = Some("No frame to freeze yet".to_string()),
        }
    }

    fn save(&mut self) {
        let Some(frame) = &self.frame.frame else {
            self.notice = Some("Nothing to save yet".to_string());
            return;
        };
        self.notice = Some(match storage::save_frame(frame, &self.options.snapshot_dir) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => {
                error!(error = %e, "Saving frame failed");
                e.to_string()
            }
        });
    }

    fn on_focus_lost(&mut self, state: &SessionState) {
        self.scope.deactivate();
        if state.bound {
            info!("Terminal lost focus, pausing camera");
            self.runtime.block_on(self.session.pause());
        }
    }

    fn on_focus_gained(&mut self, state: &SessionState) {
        self.scope.activate();
        if !state.frozen && !state.bound && state.initialized {
            info!("Terminal regained focus, resuming camera");
            self.runtime.block_on(self.session.resume());
        }
    }
}

/// One-line summary of the session
pub fn status_line(state: &SessionState, notice: Option<&str>) -> String {
    let mode = if state.loading {
        "STARTING"
    } else if state.frozen {
        "FROZEN"
    } else if state.bound {
        "LIVE"
    } else {
        "PAUSED"
    };
    let mut line = format!(
        "{} | Zoom {:.2}x | Torch {}",
        mode,
        state.zoom_level,
        if state.flash_enabled { "on" } else { "off" }
    );

    if let Some(error) = &state.error {
        line.push_str(" | ");
        line.push_str(error);
        line.push_str(" ('c' to clear)");
    } else if let Some(notice) = notice {
        line.push_str(" | ");
        line.push_str(notice);
    } else {
        line.push_str(" | 'h' help");
    }
    line
}

fn help_line() -> String {
    "+/-: Zoom | 0: Reset zoom | f: Torch | Space: Freeze | s: Save | c: Clear error/retry | q: Quit"
        .to_string()
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget {
    frame: Option<CameraFrame>,
    mirror: bool,
}

impl FrameWidget {
    fn new(mirror: bool) -> Self {
        Self {
            frame: None,
            mirror,
        }
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.as_ref().filter(|f| f.is_complete()) else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        let (cols, rows) = fit_to_area(frame.width, frame.height, area.width, area.height);
        if cols == 0 || rows == 0 {
            return;
        }
        let x_offset = area.x + (area.width - cols) / 2;
        let y_offset = area.y + (area.height - rows) / 2;

        let x_scale = frame.width as f64 / cols as f64;
        let y_scale = frame.height as f64 / (rows as f64 * 2.0);

        for ty in 0..rows {
            for tx in 0..cols {
                let mut src_x = (tx as f64 * x_scale) as u32;
                if self.mirror {
                    src_x = frame.width.saturating_sub(1).saturating_sub(src_x);
                }
                let top = frame.pixel_rgb(src_x, (ty as f64 * 2.0 * y_scale) as u32);
                let bottom = frame.pixel_rgb(src_x, ((ty as f64 * 2.0 + 1.0) * y_scale) as u32);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Rgb(top.0, top.1, top.2));
                    cell.set_bg(Color::Rgb(bottom.0, bottom.1, bottom.2));
                }
            }
        }
    }
}

/// Largest (columns, rows) showing the frame at its aspect ratio
///
/// Each cell is one pixel wide and two pixels tall.
fn fit_to_area(width: u32, height: u32, cols: u16, rows: u16) -> (u16, u16) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let aspect = width as f64 / height as f64;
    let avail_w = cols as f64;
    let avail_h = rows as f64 * 2.0;

    if avail_w / avail_h > aspect {
        let w = (avail_h * aspect) as u16;
        (w.min(cols), rows)
    } else {
        let h = (avail_w / aspect / 2.0) as u16;
        (cols, h.min(rows))
    }
}

struct StatusBar<'a> {
    message: &'a str,
    alert: bool,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }
        let bg = if self.alert { Color::Red } else { Color::DarkGray };
        let style = Style::default().fg(Color::White).bg(bg);

        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(bg);
            }
        }
        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(area.x, area.y, text, style);
    }
}
