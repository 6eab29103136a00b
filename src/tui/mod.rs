//! Terminal dashboard.
//!
//! A pure consumer of scheduler state: every iteration ticks the
//! scheduler, takes a snapshot under a short read lock, renders it, and
//! translates input into the same control commands the remote API uses.
//! No lock is held across terminal I/O.

mod render;

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};

use crate::error::{EdaqError, Result};
use crate::scheduler::{Command, Scheduler};
use crate::snapshot::Snapshot;
use crate::theme::Theme;

const MIN_WIDTH: u16 = 40;
const MIN_HEIGHT: u16 = 8;
/// Upper bound of one loop iteration spent waiting for input.
const INPUT_BUDGET: Duration = Duration::from_millis(100);
const DOUBLE_CLICK: Duration = Duration::from_millis(400);
const SCROLL_STEP: i64 = 3;

/// Run the dashboard until all jobs are terminal or the user quits.
///
/// Returns `true` when the loop ended with every job in a terminal
/// state, `false` when the user force-quit; the caller maps this to an
/// exit code.
pub async fn run(scheduler: Scheduler) -> Result<bool> {
    let (width, height) = crossterm::terminal::size()?;
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return Err(EdaqError::Terminal(format!(
            "window is too small: {width}x{height}, need at least {MIN_WIDTH}x{MIN_HEIGHT}"
        )));
    }

    let mut terminal = setup_terminal()?;
    let result = Dashboard::new(scheduler).run_loop(&mut terminal).await;
    restore_terminal(terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Everything one frame needs, captured under a single short read lock
/// per field group.
pub(crate) struct View {
    pub snapshot: Snapshot,
    pub log_lines: Vec<String>,
    pub log_offset: usize,
    pub theme: Theme,
    pub logs_height: u16,
    pub finished: bool,
}

impl View {
    pub fn selected(&self) -> usize {
        self.snapshot.handler.selected_job_index
    }

    pub fn job_count(&self) -> usize {
        self.snapshot.handler.job_count
    }
}

/// Screen regions of the current frame, kept for mouse hit-testing.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Panes {
    pub progress: Rect,
    pub separator: Rect,
    pub logs: Rect,
    pub visible_jobs: usize,
}

pub(crate) struct Dashboard {
    scheduler: Scheduler,
    auto_exit: bool,
    /// First job row shown in the progress pane.
    pub(crate) job_index_start: usize,
    pub(crate) show_help: bool,
    pub(crate) ask_exit: bool,
    pub(crate) exiting: bool,
    panes: Panes,
    dragging_separator: bool,
    last_click: Option<(Instant, u16)>,
}

impl Dashboard {
    fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            auto_exit: false,
            job_index_start: 0,
            show_help: false,
            ask_exit: false,
            exiting: false,
            panes: Panes::default(),
            dragging_separator: false,
            last_click: None,
        }
    }

    async fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> Result<bool> {
        self.auto_exit = self.scheduler.auto_exit().await;
        self.scheduler.launch_initial().await;

        loop {
            self.scheduler.tick().await;

            if self.scheduler.stop_requested().await {
                self.scheduler.terminate_all().await;
                return Ok(self.scheduler.finished().await);
            }

            let view = self.build_view().await;

            if self.auto_exit && view.finished && !self.ask_exit {
                return Ok(true);
            }

            // Out-of-bounds draws are skipped, never fatal.
            let _ = terminal.draw(|frame| {
                let panes = render::render(frame, &view, self);
                self.panes = panes;
            });

            if let Some(result) = self.handle_input(&view).await? {
                if !result {
                    self.exiting = true;
                    let _ = terminal.draw(|frame| {
                        render::render(frame, &view, self);
                    });
                    self.scheduler.terminate_all().await;
                }
                return Ok(result);
            }
        }
    }

    async fn build_view(&self) -> View {
        let snapshot = self.scheduler.snapshot(None, None, None).await;
        let (log_offset, log_lines) = self.scheduler.selected_log_view().await;
        let finished = snapshot.handler.retired == snapshot.handler.job_count;
        View {
            log_lines,
            log_offset,
            theme: self.scheduler.theme().await,
            logs_height: self.scheduler.logs_height().await,
            finished,
            snapshot,
        }
    }

    /// Wait up to the input budget, translating events into commands.
    /// `Some(result)` ends the run loop.
    async fn handle_input(&mut self, view: &View) -> Result<Option<bool>> {
        let deadline = Instant::now() + INPUT_BUDGET;
        loop {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() || !event::poll(remaining)? {
                return Ok(None);
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(result) = self.on_key(key, view).await {
                        return Ok(Some(result));
                    }
                }
                Event::Mouse(mouse) => self.on_mouse(mouse, view).await,
                _ => {}
            }
        }
    }

    async fn on_key(&mut self, key: KeyEvent, view: &View) -> Option<bool> {
        if self.ask_exit {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => return Some(false),
                KeyCode::Char('n') | KeyCode::Char('N') => self.ask_exit = false,
                _ => {}
            }
            return None;
        }

        let selected = view.selected();
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                if view.finished {
                    return Some(true);
                }
                self.ask_exit = true;
            }
            KeyCode::PageUp | KeyCode::Char('p') | KeyCode::Char('P') => {
                self.select(selected.saturating_sub(1), view).await;
            }
            KeyCode::PageDown | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.select(selected + 1, view).await;
            }
            KeyCode::Up => {
                self.send(Command::LogsScroll {
                    job: selected,
                    delta: -SCROLL_STEP,
                })
                .await;
            }
            KeyCode::Down => {
                self.send(Command::LogsScroll {
                    job: selected,
                    delta: SCROLL_STEP,
                })
                .await;
            }
            KeyCode::Home => self.send(Command::LogsHome { job: selected }).await,
            KeyCode::End => self.send(Command::LogsEnd { job: selected }).await,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.send(Command::SetLogsHeight {
                    height: view.logs_height.saturating_sub(1).max(1),
                })
                .await;
            }
            KeyCode::Char('-') | KeyCode::Char('_') => {
                self.send(Command::SetLogsHeight {
                    height: view.logs_height + 1,
                })
                .await;
            }
            KeyCode::Char(' ') => {
                // Toggle: pause a running job, resume a paused one.
                let status = view.snapshot.jobs.get(selected).map(|j| j.status);
                match status {
                    Some(crate::job::JobState::Paused) => {
                        self.send(Command::Start { job: selected }).await
                    }
                    _ => self.send(Command::Pause { job: selected }).await,
                }
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.send(Command::Start { job: selected }).await;
            }
            KeyCode::Char('k') | KeyCode::Char('K') => {
                self.send(Command::Kill { job: selected }).await;
            }
            KeyCode::Char('o') | KeyCode::Char('O') => {
                self.send(Command::OpenPath { job: selected }).await;
            }
            KeyCode::Char('t') | KeyCode::Char('T') => self.send(Command::ThemeNext).await,
            KeyCode::Char('h') | KeyCode::Char('H') => self.show_help = !self.show_help,
            _ => {}
        }
        None
    }

    async fn on_mouse(&mut self, mouse: MouseEvent, view: &View) {
        let panes = self.panes;
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if row_in(panes.separator, mouse.row) {
                    self.dragging_separator = true;
                } else if let Some(job) = self.job_at_row(mouse.row, view) {
                    let now = Instant::now();
                    let double = self
                        .last_click
                        .map(|(at, row)| row == mouse.row && now.duration_since(at) < DOUBLE_CLICK)
                        .unwrap_or(false);
                    self.last_click = Some((now, mouse.row));
                    if double {
                        self.send(Command::OpenPath { job }).await;
                    } else {
                        self.select(job, view).await;
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) if self.dragging_separator => {
                let bottom = panes.logs.y + panes.logs.height;
                if mouse.row + 1 < bottom && mouse.row >= panes.progress.y {
                    self.send(Command::SetLogsHeight {
                        height: (bottom - mouse.row - 1).max(1),
                    })
                    .await;
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.dragging_separator = false,
            MouseEventKind::ScrollUp => {
                if row_in(panes.logs, mouse.row) {
                    self.send(Command::LogsScroll {
                        job: view.selected(),
                        delta: -SCROLL_STEP,
                    })
                    .await;
                } else if row_in(panes.progress, mouse.row) {
                    self.select(view.selected().saturating_sub(1), view).await;
                }
            }
            MouseEventKind::ScrollDown => {
                if row_in(panes.logs, mouse.row) {
                    self.send(Command::LogsScroll {
                        job: view.selected(),
                        delta: SCROLL_STEP,
                    })
                    .await;
                } else if row_in(panes.progress, mouse.row) {
                    self.select(view.selected() + 1, view).await;
                }
            }
            _ => {}
        }
    }

    fn job_at_row(&self, row: u16, view: &View) -> Option<usize> {
        let panes = self.panes;
        if !row_in(panes.progress, row) {
            return None;
        }
        let offset = (row - panes.progress.y) as usize;
        if offset >= panes.visible_jobs {
            return None;
        }
        let job = self.job_index_start + offset;
        (job < view.job_count()).then_some(job)
    }

    async fn select(&mut self, job: usize, view: &View) {
        if job < view.job_count() {
            self.send(Command::Select { job }).await;
        }
    }

    async fn send(&self, command: Command) {
        self.scheduler.send(command).await;
    }
}

fn row_in(rect: Rect, row: u16) -> bool {
    rect.height > 0 && row >= rect.y && row < rect.y + rect.height
}
