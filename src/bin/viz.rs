/// tpusim live visualizer: attach to any running simulation at any time.
///
/// Run in a separate terminal:
///   cargo run --bin viz [SNAPSHOT_PATH]
///
/// Polls the snapshot (default /tmp/tpusim_live.json) every 200ms and
/// renders a live TUI dashboard:
///
///     ┌ header: size / accounting / status ───────────────────────┐
///     │ Systolic array grid          │ Sequential reference grid  │
///     │ cycle gauge + counters       │ step gauge + counters      │
///     │ read comparison bar                                       │
///     │ q/esc: quit  …footer…                                     │
///
/// Press q or Esc to quit. The simulation keeps running unaffected.
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::{io, time::Duration};
use tpusim::config::DEFAULT_METRICS_PATH;
use tpusim::metrics::{read_metrics, LiveMetrics};
use tpusim::systolic::CellStatus;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &path);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let metrics = read_metrics(path);
        terminal.draw(|f| render(f, metrics.as_ref(), path))?;

        // Non-blocking: poll for 200ms, then redraw regardless
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Top-level layout
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, metrics: Option<&LiveMetrics>, path: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(8),    // grids
            Constraint::Length(6), // progress + counters
            Constraint::Length(3), // read comparison
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, rows[0], metrics);

    let Some(m) = metrics else {
        render_waiting(f, rows[1]);
        render_footer(f, rows[4], path);
        return;
    };

    let grids = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);
    render_systolic(f, grids[0], m);
    render_reference(f, grids[1], m);

    let counters = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);
    render_progress(
        f,
        counters[0],
        " Systolic array ",
        "cycle",
        m.cycle,
        m.total_cycles,
        m.systolic_macs,
        m.systolic_reads,
        Color::Cyan,
    );
    render_progress(
        f,
        counters[1],
        " Sequential loop ",
        "step",
        m.reference_step,
        m.total_steps,
        m.reference_macs,
        m.reference_reads,
        Color::Red,
    );

    render_reads(f, rows[3], m);
    render_footer(f, rows[4], path);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default()
        .title(Span::styled(
            " ▦ tpusim live monitor ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let (size, accounting, status) = metrics
        .map(|m| (format!("{0}x{0}", m.size), m.accounting.as_str(), m.status.as_str()))
        .unwrap_or(("—".to_string(), "—", "idle"));

    let status_color = match status {
        "running" => Color::Green,
        "complete" => Color::Cyan,
        _ => Color::DarkGray,
    };

    let spans = vec![
        Span::styled("  matmul: ", Style::default().fg(Color::DarkGray)),
        Span::styled(size, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled("   reads: ", Style::default().fg(Color::DarkGray)),
        Span::styled(accounting, Style::default().fg(Color::Cyan)),
        Span::styled("   status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            status.to_uppercase(),
            Style::default().fg(status_color).add_modifier(Modifier::BOLD),
        ),
    ];

    f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

fn render_waiting(f: &mut Frame, area: Rect) {
    let msg = Paragraph::new(vec![
        Line::raw(""),
        Line::from(Span::styled(
            "  No simulation running.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "  Start `tpusim --live` to see live data.",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(msg, area);
}

// ---------------------------------------------------------------------------
// Grids
// ---------------------------------------------------------------------------

/// Width of one rendered grid cell, including the trailing space.
fn cell_width(m: &LiveMetrics) -> usize {
    let widest = m
        .reference_result
        .iter()
        .flatten()
        .chain(m.cells.iter().flatten().map(|c| &c.partial))
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(1);
    widest.max(5) + 1
}

fn render_systolic(f: &mut Frame, area: Rect, m: &LiveMetrics) {
    let title = format!(" Systolic wavefront (cycle {}/{}) ", m.cycle, m.total_cycles);
    let block = Block::default().title(title).borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let w = cell_width(m);
    let legend = Line::from(vec![
        Span::styled("a×b", Style::default().fg(Color::Yellow)),
        Span::raw(" active   "),
        Span::styled("Σ", Style::default().fg(Color::Green)),
        Span::raw(" done   "),
        Span::styled("·", Style::default().fg(Color::DarkGray)),
        Span::raw(" waiting"),
    ]);
    let mut lines: Vec<Line> = vec![legend, Line::raw("")];

    for (i, row) in m.cells.iter().enumerate() {
        let mut spans: Vec<Span> = Vec::with_capacity(row.len() + 1);
        // Activation entering column 0 of this row on the current cycle
        let entering = m
            .cycle
            .checked_sub(i)
            .and_then(|k| m.activations.get(i).and_then(|r| r.get(k)))
            .map(|v| format!("{:>3} →", v))
            .unwrap_or_else(|| "     ".to_string());
        spans.push(Span::styled(
            format!("{} ", entering),
            Style::default().fg(Color::Blue),
        ));

        for cell in row {
            let (text, style) = match (cell.status, cell.operands) {
                (CellStatus::Active, Some(ops)) => (
                    format!("{}×{}", ops.activation, ops.weight),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                (CellStatus::Done, _) => (
                    cell.partial.to_string(),
                    Style::default().fg(Color::Green),
                ),
                _ => ("·".to_string(), Style::default().fg(Color::DarkGray)),
            };
            spans.push(Span::styled(format!("{:>w$}", text), style));
        }
        lines.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn render_reference(f: &mut Frame, area: Rect, m: &LiveMetrics) {
    let title = match m.reference_cursor {
        Some(c) => format!(" Sequential C[{}][{}], k={} ", c.i, c.j, c.k),
        None => " Sequential loop (done) ".to_string(),
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let w = cell_width(m);
    let fetch = match m.reference_cursor {
        Some(c) => format!("fetch A[{}][{}], B[{}][{}]", c.i, c.k, c.k, c.j),
        None => "same result, far more reads".to_string(),
    };
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(fetch, Style::default().fg(Color::Red))),
        Line::raw(""),
    ];

    for (i, row) in m.reference_result.iter().enumerate() {
        let spans: Vec<Span> = row
            .iter()
            .enumerate()
            .map(|(j, v)| {
                let current = m.reference_cursor.is_some_and(|c| c.i == i && c.j == j);
                let complete = m
                    .reference_complete
                    .get(i)
                    .and_then(|r| r.get(j))
                    .copied()
                    .unwrap_or(false);
                let (text, style) = if current {
                    (
                        format!("Σ{}", v),
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )
                } else if complete {
                    (v.to_string(), Style::default().fg(Color::Green))
                } else {
                    ("·".to_string(), Style::default().fg(Color::DarkGray))
                };
                Span::styled(format!("{:>w$}", text), style)
            })
            .collect();
        lines.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn render_progress(
    f: &mut Frame,
    area: Rect,
    title: &str,
    unit: &str,
    done: usize,
    total: usize,
    macs: u64,
    reads: u64,
    color: Color,
) {
    let block = Block::default().title(title.to_string()).borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    let pct = if total > 0 {
        ((done as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as u16
    } else {
        0
    };
    let gauge = Gauge::default()
        .block(Block::default().title(format!("{}s", unit)))
        .gauge_style(Style::default().fg(color))
        .percent(pct)
        .label(format!("{} / {}", done, total));
    f.render_widget(gauge, rows[0]);

    let text = Line::from(vec![
        Span::styled("MACs: ", Style::default().fg(Color::DarkGray)),
        Span::raw(macs.to_string()),
        Span::styled("   reads: ", Style::default().fg(Color::DarkGray)),
        Span::raw(reads.to_string()),
    ]);
    f.render_widget(Paragraph::new(text), rows[1]);
}

fn render_reads(f: &mut Frame, area: Rect, m: &LiveMetrics) {
    let block = Block::default().title(" Memory reads ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let ratio = if m.systolic_reads > 0 {
        format!("{:.1}x", m.reference_reads as f64 / m.systolic_reads as f64)
    } else {
        "—".to_string()
    };
    let text = Line::from(vec![
        Span::styled("  systolic ", Style::default().fg(Color::DarkGray)),
        Span::styled(m.systolic_reads.to_string(), Style::default().fg(Color::Cyan)),
        Span::styled("   sequential ", Style::default().fg(Color::DarkGray)),
        Span::styled(m.reference_reads.to_string(), Style::default().fg(Color::Red)),
        Span::styled("   sequential / systolic ", Style::default().fg(Color::DarkGray)),
        Span::styled(ratio, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
    ]);
    f.render_widget(Paragraph::new(text), inner);
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

fn render_footer(f: &mut Frame, area: Rect, path: &str) {
    let text = Paragraph::new(Span::styled(
        format!("  q / esc: quit    auto-refreshes every 200ms    reads {}", path),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(text, area);
}
