//! Frame rendering: a pure function from a state snapshot to terminal
//! widgets. Geometry is recomputed every frame, so resizes need no
//! special handling beyond clamping.

use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::job::JobState;
use crate::snapshot::JobSnapshot;

use super::{Dashboard, Panes, View};

/// Column budget around the bar: marker, brackets, percent, status tag.
const ROW_OVERHEAD: u16 = 25;

pub(crate) fn render(frame: &mut Frame, view: &View, ui: &mut Dashboard) -> Panes {
    let area = frame.area();
    if area.height < 6 || area.width < 10 {
        return Panes::default();
    }

    let job_count = view.job_count();
    let available = area.height.saturating_sub(4);
    let logs_wanted = view.logs_height.clamp(1, available.saturating_sub(1));
    let progress_height = (available - logs_wanted).min(job_count.max(1) as u16).max(1);
    let visible_jobs = progress_height as usize;

    // Keep the selection inside the visible window.
    let selected = view.selected();
    if selected < ui.job_index_start {
        ui.job_index_start = selected;
    } else if selected >= ui.job_index_start + visible_jobs {
        ui.job_index_start = selected + 1 - visible_jobs;
    }
    ui.job_index_start = ui.job_index_start.min(job_count.saturating_sub(visible_jobs));
    let job_index_end = (ui.job_index_start + visible_jobs).min(job_count);

    let [header, sep_top, progress, sep_mid, logs, help] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(progress_height),
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header, view);
    render_separator(frame, sep_top, ui.job_index_start);
    render_progress(frame, progress, view, ui.job_index_start, job_index_end);
    render_separator(frame, sep_mid, job_count - job_index_end);
    render_logs(frame, logs, view);
    render_help(frame, help, ui);

    if ui.show_help {
        render_help_overlay(frame, area);
    }

    Panes {
        progress,
        separator: sep_mid,
        logs,
        visible_jobs,
    }
}

fn reversed() -> Style {
    Style::default().add_modifier(Modifier::REVERSED)
}

fn render_header(frame: &mut Frame, area: Rect, view: &View) {
    let h = &view.snapshot.handler;
    let jobs_word = if h.job_count == 1 { "job" } else { "jobs" };
    let counts = if h.retired == h.job_count {
        format!("{}/{} {} done! ", h.retired, h.job_count, jobs_word)
    } else {
        format!(
            "{}/{} {} done - {} running ",
            h.retired, h.job_count, jobs_word, h.running
        )
    };

    frame.render_widget(Paragraph::new("").style(reversed()), area);
    frame.render_widget(
        Paragraph::new(format!(" v{}", h.version))
            .style(reversed())
            .alignment(Alignment::Left),
        area,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(
            " edaq ",
            reversed().add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center),
        area,
    );
    frame.render_widget(
        Paragraph::new(counts)
            .style(reversed())
            .alignment(Alignment::Right),
        area,
    );
}

fn render_separator(frame: &mut Frame, area: Rect, hidden: usize) {
    let width = area.width as usize;
    let text = if hidden == 0 {
        "-".repeat(width)
    } else {
        let message = format!(" {hidden} more ");
        let padding = 4.min(width);
        let tail = width.saturating_sub(message.len() + padding);
        format!("{}{}{}", "-".repeat(padding), message, "-".repeat(tail))
    };
    frame.render_widget(Paragraph::new(text), area);
}

fn render_progress(frame: &mut Frame, area: Rect, view: &View, start: usize, end: usize) {
    let title_width = view
        .snapshot
        .jobs
        .iter()
        .map(|job| job.display_name.len())
        .max()
        .unwrap_or(0)
        .min(area.width.saturating_sub(ROW_OVERHEAD + 4) as usize);

    let (filled, empty) = view.theme.glyphs();
    let selected = view.selected();

    let lines: Vec<Line> = view.snapshot.jobs[start..end]
        .iter()
        .map(|job| {
            progress_row(
                job,
                job.id == selected,
                title_width,
                area.width,
                filled,
                empty,
            )
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), area);
}

fn progress_row(
    job: &JobSnapshot,
    selected: bool,
    title_width: usize,
    width: u16,
    filled: char,
    empty: char,
) -> Line<'static> {
    let marker = if selected { "[*]" } else { "[ ]" };
    let mut title = job.display_name.clone();
    if title.len() > title_width {
        title.truncate(title_width.saturating_sub(3));
        title.push_str("...");
    }

    let bar_width = (width.saturating_sub(ROW_OVERHEAD) as usize)
        .saturating_sub(title_width)
        .max(4);
    let bar_len = ((bar_width as f64 * job.progress / 100.0) as usize).min(bar_width);
    let bar: String = std::iter::repeat(filled)
        .take(bar_len)
        .chain(std::iter::repeat(empty).take(bar_width - bar_len))
        .collect();

    Line::from(vec![
        Span::raw(format!("{marker} {title:<title_width$} [")),
        Span::raw(bar),
        Span::raw(format!("] {:>3.0}% ", job.progress)),
        Span::styled(format!("({})", job.status), status_style(job.status)),
    ])
}

fn status_style(state: JobState) -> Style {
    let color = match state {
        JobState::Failed | JobState::Killed => Color::Red,
        JobState::Running => Color::Yellow,
        JobState::Success => Color::Green,
        JobState::Queued => Color::Blue,
        JobState::Starting => Color::Cyan,
        JobState::Paused => Color::Magenta,
        JobState::Canceled => Color::DarkGray,
    };
    Style::default().fg(color)
}

fn render_logs(frame: &mut Frame, area: Rect, view: &View) {
    let lines: Vec<Line> = view
        .log_lines
        .iter()
        .map(|line| Line::raw(line.clone()))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

const HELP_ITEMS: &[(&str, &str)] = &[
    ("q", "Quit"),
    ("PageUp/PageDown", "Switch Job"),
    ("Up/Down", "Scroll Log"),
    ("Home/End", "Scroll to Top/Bottom"),
    ("+/-", "Adjust Progress Window"),
    ("h", "Help"),
];

fn render_help(frame: &mut Frame, area: Rect, ui: &Dashboard) {
    if ui.exiting {
        frame.render_widget(Paragraph::new(" Exiting... ").style(reversed()), area);
        return;
    }
    if ui.ask_exit {
        let line = Line::from(vec![
            Span::raw(" Kill all jobs and exit: Yes ("),
            Span::styled("y", reversed().add_modifier(Modifier::BOLD)),
            Span::raw(") / No ("),
            Span::styled("n", reversed().add_modifier(Modifier::BOLD)),
            Span::raw(")? "),
        ]);
        frame.render_widget(Paragraph::new(line).style(reversed()), area);
        return;
    }

    let mut spans = vec![Span::raw(" ")];
    for (i, (key, description)) in HELP_ITEMS.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" | "));
        }
        spans.push(Span::styled(*key, reversed().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(format!(": {description}")));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).style(reversed()), area);
}

const OVERLAY_BINDINGS: &[(&str, &str)] = &[
    ("q", "quit (confirmation while jobs run)"),
    ("PageUp / p", "previous job"),
    ("PageDown / n", "next job"),
    ("Up / Down", "scroll log"),
    ("Home / End", "log top / bottom"),
    ("+ / -", "resize panes"),
    ("space", "pause / resume selected job"),
    ("s", "start or resume selected job"),
    ("k", "kill or cancel selected job"),
    ("o", "open job directory"),
    ("t", "cycle progress bar theme"),
    ("h", "toggle this help"),
];

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let height = (OVERLAY_BINDINGS.len() as u16 + 2).min(area.height);
    let width = 48.min(area.width);
    let overlay = Rect {
        x: (area.width - width) / 2,
        y: (area.height - height) / 2,
        width,
        height,
    };

    let lines: Vec<Line> = OVERLAY_BINDINGS
        .iter()
        .map(|(key, description)| {
            Line::from(vec![
                Span::styled(format!(" {key:<14}"), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(*description),
            ])
        })
        .collect();

    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Help ")),
        overlay,
    );
}
