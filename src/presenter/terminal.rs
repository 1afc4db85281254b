// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based depth viewer
//!
//! Renders every view to the terminal using Unicode half-block characters
//! for improved vertical resolution. One [`TerminalDisplay`] is shared by
//! all device loops; each loop presents through its own
//! [`TerminalPresenter`] and gets one row of panes, one pane per view.

use std::collections::BTreeMap;
use std::io::{self, Stdout, stdout};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::{RgbImage, imageops};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Widget},
};
use tracing::{debug, info, warn};

use super::{
    FramePresenter, OrbitView, PresentedFrame, StopReason, ViewKind, render_point_cloud,
    view_name,
};
use crate::constants::viewer::ROTATION_STEP_DEG;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::to_rgb_image;

/// Largest pane image kept per view, terminal cells are far coarser
const PANE_MAX_WIDTH: u32 = 320;
const PANE_MAX_HEIGHT: u32 = 240;

struct DisplayState {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    panes: BTreeMap<(u32, ViewKind), RgbImage>,
    orbit: OrbitView,
    stop: Option<StopReason>,
    status: String,
}

/// Shared terminal, owned by the application for the whole run
pub struct TerminalDisplay {
    state: Mutex<DisplayState>,
    /// Serializes keyboard polling between device loops
    input: Mutex<()>,
    wait_key: Duration,
}

impl TerminalDisplay {
    /// Switch the terminal into raw mode and the alternate screen
    pub fn open(wait_key: Duration) -> io::Result<Arc<Self>> {
        enable_raw_mode()?;
        let terminal = leave_raw_mode_on_error(Self::enter_screen())?;
        info!("Terminal display opened");

        Ok(Arc::new(Self {
            state: Mutex::new(DisplayState {
                terminal,
                panes: BTreeMap::new(),
                orbit: OrbitView::default(),
                stop: None,
                status: build_status_message(&OrbitView::default()),
            }),
            input: Mutex::new(()),
            wait_key,
        }))
    }

    fn enter_screen() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        Terminal::new(CrosstermBackend::new(stdout))
    }

    /// Presenter for one device loop
    pub fn presenter(self: &Arc<Self>, device_index: u32, point_cloud: bool) -> TerminalPresenter {
        TerminalPresenter {
            display: Arc::clone(self),
            device_index,
            point_cloud,
        }
    }

    /// Restore the terminal; presenters report `Closed` afterwards
    pub fn restore(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stop.get_or_insert(StopReason::Closed);
        disable_raw_mode()?;
        execute!(state.terminal.backend_mut(), LeaveAlternateScreen)?;
        state.terminal.show_cursor()?;
        debug!("Terminal restored");
        Ok(())
    }

    fn present(&self, frame: &PresentedFrame<'_>) -> PipelineResult<()> {
        // Convert and render outside the lock, the other devices keep
        // drawing meanwhile
        let orbit = frame.point_cloud.map(|_| self.orbit());
        let updates = pane_updates(frame, orbit.as_ref());

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (kind, image) in updates {
            match image {
                Some(image) => {
                    state.panes.insert((frame.device_index, kind), image);
                }
                None => warn!(view = %view_name(kind, frame.device_index), "Unable to convert view"),
            }
        }

        let DisplayState {
            terminal,
            panes,
            status,
            ..
        } = &mut *state;
        terminal
            .draw(|f| {
                let area = f.area();
                let [views_area, status_area] =
                    Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(area);
                render_panes(panes, views_area, f.buffer_mut());
                f.render_widget(StatusBar { message: status }, status_area);
            })
            .map_err(|e| PipelineError::Presentation(e.to_string()))?;
        Ok(())
    }

    /// Current orbit, copied under a short lock
    fn orbit(&self) -> OrbitView {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).orbit
    }

    fn poll_stop(&self) -> Option<StopReason> {
        if let Some(reason) = self.state.lock().unwrap_or_else(PoisonError::into_inner).stop {
            return Some(reason);
        }

        let _input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let key = match event::poll(self.wait_key) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => Some(key),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Failed to read terminal event");
                    None
                }
            },
            Ok(false) => None,
            Err(e) => {
                warn!(error = %e, "Terminal input unavailable");
                return Some(StopReason::Closed);
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = key {
            match key.code {
                // Ctrl+C to quit, raw mode swallows the signal
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    state.stop = Some(StopReason::UserQuit);
                }
                KeyCode::Char('q') => state.stop = Some(StopReason::UserQuit),
                KeyCode::Left => state.orbit.rotate(-ROTATION_STEP_DEG, 0.0),
                KeyCode::Right => state.orbit.rotate(ROTATION_STEP_DEG, 0.0),
                KeyCode::Up => state.orbit.rotate(0.0, ROTATION_STEP_DEG),
                KeyCode::Down => state.orbit.rotate(0.0, -ROTATION_STEP_DEG),
                KeyCode::Char('r') => state.orbit.reset(),
                _ => {}
            }
            state.status = build_status_message(&state.orbit);
        }
        state.stop
    }
}

/// Presenter handle bound to one device
pub struct TerminalPresenter {
    display: Arc<TerminalDisplay>,
    device_index: u32,
    point_cloud: bool,
}

impl TerminalPresenter {
    pub fn device_index(&self) -> u32 {
        self.device_index
    }
}

impl FramePresenter for TerminalPresenter {
    fn present(&mut self, frame: &PresentedFrame<'_>) -> PipelineResult<()> {
        self.display.present(frame)
    }

    fn poll_stop(&mut self) -> Option<StopReason> {
        self.display.poll_stop()
    }

    fn supports_point_cloud(&self) -> bool {
        self.point_cloud
    }
}

fn pane_image(converted: Result<RgbImage, crate::errors::ImageError>) -> Option<RgbImage> {
    let image = converted.ok()?;
    if image.width() > PANE_MAX_WIDTH || image.height() > PANE_MAX_HEIGHT {
        Some(imageops::thumbnail(&image, PANE_MAX_WIDTH, PANE_MAX_HEIGHT))
    } else {
        Some(image)
    }
}

fn build_status_message(orbit: &OrbitView) -> String {
    format!(
        "arrows rotate cloud (yaw {:.0}°, pitch {:.0}°) | 'r' reset | 'q' quit",
        orbit.yaw_deg, orbit.pitch_deg
    )
}

/// One row per device, one column per view kind
fn render_panes(panes: &BTreeMap<(u32, ViewKind), RgbImage>, area: Rect, buf: &mut Buffer) {
    let mut devices: Vec<u32> = panes.keys().map(|(device, _)| *device).collect();
    devices.dedup();

    if devices.is_empty() {
        FrameWidget { frame: None }.render(area, buf);
        return;
    }

    let kinds = [ViewKind::Color, ViewKind::TransformedDepth, ViewKind::PointCloud];
    let rows = Layout::vertical(vec![Constraint::Fill(1); devices.len()]).split(area);
    for (device, row) in devices.iter().zip(rows.iter()) {
        let columns = Layout::horizontal(vec![Constraint::Fill(1); kinds.len()]).split(*row);
        for (kind, cell) in kinds.iter().zip(columns.iter()) {
            let block = Block::default()
                .borders(Borders::ALL)
                .title(view_name(*kind, *device));
            let inner = block.inner(*cell);
            block.render(*cell, buf);
            FrameWidget {
                frame: panes.get(&(*device, *kind)),
            }
            .render(inner, buf);
        }
    }
}

/// Pane images for every view the frame carries
///
/// The point cloud is only rendered when an orbit is supplied.
fn pane_updates(
    frame: &PresentedFrame<'_>,
    orbit: Option<&OrbitView>,
) -> Vec<(ViewKind, Option<RgbImage>)> {
    let mut updates = Vec::with_capacity(3);
    if let Some(color) = frame.color {
        updates.push((ViewKind::Color, pane_image(to_rgb_image(color))));
    }
    if let Some(depth) = frame.depth_display {
        updates.push((ViewKind::TransformedDepth, pane_image(to_rgb_image(depth))));
    }
    if let Some(((cloud, color), orbit)) = frame.point_cloud.zip(orbit) {
        updates.push((
            ViewKind::PointCloud,
            Some(render_point_cloud(
                cloud,
                color,
                orbit,
                PANE_MAX_WIDTH,
                PANE_MAX_HEIGHT,
            )),
        ));
    }
    updates
}

/// Pass `result` through, switching raw mode back off if it failed
fn leave_raw_mode_on_error<T>(result: io::Result<T>) -> io::Result<T> {
    result.inspect_err(|_| {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to disable raw mode");
        }
    })
}

/// Widget that renders an image using half-block characters
struct FrameWidget<'a> {
    frame: Option<&'a RgbImage>,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.filter(|f| f.width() > 0 && f.height() > 0) else {
            // No frame yet - show placeholder
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Calculate display dimensions maintaining aspect ratio
        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64; // *2 because half-blocks

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        // Scale factors
        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height * 2) as f64;

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(frame, src_x, src_y_top);
                let bottom_color = sample_pixel(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

fn sample_pixel(frame: &RgbImage, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    let [r, g, b] = frame.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        // Render text
        let text: String = self.message.chars().take(area.width as usize).collect();

        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}
