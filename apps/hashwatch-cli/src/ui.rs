use std::{
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hashwatch_ops::PrefsStore;
use hashwatch_types::{
    events::{EventPayload, SystemEvent},
    freshness::{Freshness, FreshnessPolicy},
    metrics::{FarmSummary, LogEvent, LogSeverity, MinerStatusRow, PoolRow},
    prefs::{Theme, UiPrefs},
    series::{BtcTicker, FarmSeries, PricePoint, SeriesPoint},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row,
        Sparkline, Table,
    },
    Terminal,
};
use tokio::sync::watch;

const MAX_LOG_ROWS: usize = 200;

pub enum UiMessage {
    Event(SystemEvent),
    Shutdown,
}

pub struct UiContext {
    pub prefs_tx: watch::Sender<UiPrefs>,
    pub store: PrefsStore,
    pub prefs: UiPrefs,
    pub focused_ip: Option<String>,
    pub poll_interval_secs: u64,
}

/// Everything the renderer knows; replaced wholesale by incoming events.
struct DashboardState {
    prefs: UiPrefs,
    focused_ip: Option<String>,
    policy: FreshnessPolicy,
    summary: Option<FarmSummary>,
    series: FarmSeries,
    sample_count: usize,
    miners: Vec<MinerStatusRow>,
    pools: Vec<PoolRow>,
    log: Vec<LogEvent>,
    ticker: Option<BtcTicker>,
    price_history: Vec<PricePoint>,
    last_status: String,
}

impl DashboardState {
    fn new(ctx: &UiContext) -> Self {
        Self {
            prefs: ctx.prefs,
            focused_ip: ctx.focused_ip.clone(),
            policy: FreshnessPolicy::new(ctx.poll_interval_secs),
            summary: None,
            series: FarmSeries::default(),
            sample_count: 0,
            miners: Vec::new(),
            pools: Vec::new(),
            log: Vec::new(),
            ticker: None,
            price_history: Vec::new(),
            last_status: String::from("waiting for first poll"),
        }
    }

    fn apply_event(&mut self, event: SystemEvent) {
        self.last_status = summarize_status(&event);
        match event.payload {
            EventPayload::Summary(update) => {
                self.summary = update.summary;
            }
            EventPayload::Series(update) => {
                self.series = update.series;
                self.sample_count = update.sample_count;
            }
            EventPayload::Miners(update) => self.miners = update.rows,
            EventPayload::Pools(update) => self.pools = update.pools,
            EventPayload::Log(update) => {
                self.log = update.entries;
                self.log.truncate(MAX_LOG_ROWS);
            }
            EventPayload::Price(update) => {
                self.ticker = update.ticker;
                self.price_history = update.history;
            }
            EventPayload::Lifecycle(_) | EventPayload::Ops(_) | EventPayload::Unknown(_) => {}
        }
    }
}

pub fn run(receiver: Receiver<UiMessage>, context: UiContext) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &context);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    context: &UiContext,
) -> Result<()> {
    let mut state = DashboardState::new(context);
    let mut should_close = false;

    loop {
        let mut feed_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => state.apply_event(event),
                Ok(UiMessage::Shutdown) => should_close = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    feed_closed = true;
                    should_close = true;
                    break;
                }
            }
        }

        terminal.draw(|f| draw_dashboard(f, &state))?;

        if should_close && feed_closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('a') => {
                        state.prefs.active_only = !state.prefs.active_only;
                        push_prefs(&state.prefs, context);
                    }
                    KeyCode::Char('[') => {
                        state.prefs.narrow_fresh_window();
                        push_prefs(&state.prefs, context);
                    }
                    KeyCode::Char(']') => {
                        state.prefs.widen_fresh_window();
                        push_prefs(&state.prefs, context);
                    }
                    KeyCode::Char('h') => {
                        state.prefs.cycle_chart_hours();
                        push_prefs(&state.prefs, context);
                    }
                    KeyCode::Char('t') => {
                        state.prefs.theme = state.prefs.theme.toggled();
                        push_prefs(&state.prefs, context);
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// Persist the toggles and wake the poller; both best-effort, a failed
/// write only costs the saved setting.
fn push_prefs(prefs: &UiPrefs, context: &UiContext) {
    let _ = context.store.save(prefs);
    let _ = context.prefs_tx.send(*prefs);
}

fn draw_dashboard(f: &mut ratatui::Frame, state: &DashboardState) {
    let base = base_style(state.prefs.theme);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(12),
            Constraint::Min(8),
        ])
        .split(f.size());

    draw_header(f, chunks[0], state, base);
    draw_cards(f, chunks[1], state, base);
    draw_charts(f, chunks[2], state, base);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(chunks[3]);
    if state.focused_ip.is_some() {
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(bottom[0]);
        draw_miners(f, left[0], state, base);
        draw_pools(f, left[1], state, base);
    } else {
        draw_miners(f, bottom[0], state, base);
    }
    draw_log(f, bottom[1], state, base);
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let mode = match &state.focused_ip {
        Some(ip) => format!("Miner {ip}"),
        None => "Farm".to_string(),
    };
    let filters = if state.focused_ip.is_some() {
        format!("window {}h", state.prefs.chart_hours)
    } else {
        format!(
            "{} | last {}m | charts {}h",
            if state.prefs.active_only {
                "active-only"
            } else {
                "all miners"
            },
            state.prefs.fresh_within_mins,
            state.prefs.chart_hours
        )
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            mode,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(filters, base),
        Span::raw("  "),
        Span::styled(server_stamp(state), Style::default().fg(Color::DarkGray)),
        Span::raw("  "),
        Span::styled(state.last_status.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw("  "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::styled(" quit  ", base),
        Span::styled("a", Style::default().fg(Color::Yellow)),
        Span::styled(" filter  ", base),
        Span::styled("[ ]", Style::default().fg(Color::Yellow)),
        Span::styled(" freshness  ", base),
        Span::styled("h", Style::default().fg(Color::Yellow)),
        Span::styled(" window  ", base),
        Span::styled("t", Style::default().fg(Color::Yellow)),
        Span::styled(" theme", base),
    ]))
    .block(Block::default().borders(Borders::ALL).title("hashwatch"));
    f.render_widget(header, area);
}

fn draw_cards(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let summary = state.summary.as_ref();
    let card = |title: &'static str, value: String| {
        Paragraph::new(Span::styled(value, base))
            .block(Block::default().borders(Borders::ALL).title(title))
    };
    let fmt1 = |v: f64| format!("{v:.1}");

    let mut cells = vec![
        (
            "Power",
            summary.map_or(placeholder(), |s| format!("{} W", fmt1(s.total_power))),
        ),
        (
            "Hashrate",
            summary.map_or(placeholder(), |s| format!("{:.3} TH/s", s.total_hashrate)),
        ),
        (
            "Uptime",
            summary.map_or(placeholder(), |s| human_duration(s.total_uptime)),
        ),
        (
            "Avg temp",
            summary.map_or(placeholder(), |s| format!("{} C", fmt1(s.avg_temp))),
        ),
        (
            "Avg fan",
            summary.map_or(placeholder(), |s| format!("{:.0} RPM", s.avg_fan_speed)),
        ),
        (
            "Workers",
            summary.map_or(placeholder(), |s| s.total_workers.to_string()),
        ),
    ];
    if let Some(ticker) = &state.ticker {
        cells.push(("BTC", format_ticker(ticker)));
    }

    let constraints: Vec<Constraint> = cells
        .iter()
        .map(|_| Constraint::Ratio(1, cells.len() as u32))
        .collect();
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);
    for ((title, value), slot) in cells.into_iter().zip(areas.iter()) {
        f.render_widget(card(title, value), *slot);
    }
}

fn draw_charts(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let points = &state.series.points;
    let hash: Vec<(f64, f64)> = chart_data(points, |p| p.hashrate_ths);
    let power: Vec<(f64, f64)> = chart_data(points, |p| p.power_w);
    let temp: Vec<(f64, f64)> = chart_data(points, |p| p.avg_temp_c);
    let fan: Vec<(f64, f64)> = chart_data(points, |p| p.avg_fan_rpm);

    let with_price = !state.price_history.is_empty();
    let constraints: Vec<Constraint> = if with_price {
        vec![
            Constraint::Percentage(22),
            Constraint::Percentage(22),
            Constraint::Percentage(22),
            Constraint::Percentage(22),
            Constraint::Percentage(12),
        ]
    } else {
        vec![Constraint::Percentage(25); 4]
    };
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    f.render_widget(line_chart("Hashrate TH/s", &hash, Color::Cyan, base), areas[0]);
    f.render_widget(line_chart("Power W", &power, Color::Yellow, base), areas[1]);
    f.render_widget(line_chart("Temp C", &temp, Color::Red, base), areas[2]);
    f.render_widget(line_chart("Fan RPM", &fan, Color::Blue, base), areas[3]);

    if with_price {
        let prices: Vec<u64> = sparkline_data(&state.price_history);
        let spark = Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title("BTC 24h"))
            .style(Style::default().fg(Color::Magenta))
            .data(&prices);
        f.render_widget(spark, areas[4]);
    }
}

fn line_chart<'a>(
    title: &'a str,
    data: &'a [(f64, f64)],
    color: Color,
    base: Style,
) -> Chart<'a> {
    let x = x_bounds(data);
    let y = y_bounds(data);
    let datasets = vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)];
    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .style(base)
                .bounds(x)
                .labels(vec![
                    Span::raw(format_axis_time(x[0])),
                    Span::raw(format_axis_time(x[1])),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(base)
                .bounds(y)
                .labels(vec![
                    Span::raw(format!("{:.0}", y[0])),
                    Span::raw(format!("{:.0}", y[1])),
                ]),
        )
}

fn draw_miners(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let block = Block::default().borders(Borders::ALL).title("Miners");
    if state.miners.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No miners found in the selected window.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec![
        "Status", "Model", "IP", "Last seen", "W", "TH/s", "Temp", "Fan",
    ])
    .style(base.add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = state
        .miners
        .iter()
        .map(|miner| miner_row(miner, &state.policy, base))
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(15),
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(block);
    f.render_widget(table, area);
}

fn miner_row<'a>(miner: &'a MinerStatusRow, policy: &FreshnessPolicy, base: Style) -> Row<'a> {
    let freshness = policy.classify(miner.age_sec);
    let status = miner
        .status
        .clone()
        .unwrap_or_else(|| freshness.label().to_string());
    let fmt_opt = |v: Option<f64>| v.map_or(placeholder(), |v| format!("{v:.0}"));
    Row::new(vec![
        Cell::from(Span::styled(status, freshness_style(freshness))),
        Cell::from(miner.model.clone().unwrap_or_else(placeholder)),
        Cell::from(miner.ip.clone()),
        Cell::from(
            miner
                .last_seen
                .as_deref()
                .map_or(placeholder(), format_clock),
        ),
        Cell::from(fmt_opt(miner.est_power_w)),
        Cell::from(format!("{:.3}", miner.hashrate_ths)),
        Cell::from(format!("{:.1}", miner.avg_temp_c)),
        Cell::from(format!("{:.0}", miner.avg_fan_rpm)),
    ])
    .style(base)
}

fn draw_pools(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let block = Block::default().borders(Borders::ALL).title("Pools");
    if state.pools.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No pools configured.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec!["#", "URL", "User", "Status", "Acc", "Rej", "Rej %"])
        .style(base.add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = state
        .pools
        .iter()
        .map(|pool| {
            let active = pool.stratum_active == Some(true);
            let status = pool.status.clone().unwrap_or_else(placeholder);
            Row::new(vec![
                Cell::from(pool.id.map_or(placeholder(), |id| id.to_string())),
                Cell::from(pool.url.clone().unwrap_or_else(placeholder)),
                Cell::from(pool.user.clone().unwrap_or_else(placeholder)),
                Cell::from(Span::styled(
                    status,
                    if active {
                        Style::default().fg(Color::Green)
                    } else {
                        base
                    },
                )),
                Cell::from(pool.accepted.to_string()),
                Cell::from(pool.rejected.to_string()),
                Cell::from(format!("{:.2}%", pool.reject_percent)),
            ])
            .style(base)
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(7),
        ],
    )
    .header(header)
    .block(block);
    f.render_widget(table, area);
}

fn draw_log(f: &mut ratatui::Frame, area: Rect, state: &DashboardState, base: Style) {
    let items: Vec<ListItem> = state
        .log
        .iter()
        .rev()
        .map(|entry| {
            let style = match entry.severity() {
                LogSeverity::Error => Style::default().fg(Color::Red),
                LogSeverity::Warn => Style::default().fg(Color::Yellow),
                LogSeverity::Info => base,
            };
            let ip = entry
                .miner_ip
                .as_deref()
                .map(|ip| format!(" {ip}"))
                .unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", format_clock(&entry.timestamp)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{:<5}", entry.level), style),
                Span::styled(format!("{ip} {}: {}", entry.source, entry.message), base),
            ]))
        })
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Events"));
    f.render_widget(list, area);
}

fn summarize_status(event: &SystemEvent) -> String {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!("lifecycle: {:?}", lifecycle.phase),
        EventPayload::Summary(update) => match &update.summary {
            Some(_) => "summary updated".to_string(),
            None => "summary unavailable".to_string(),
        },
        EventPayload::Series(update) => format!(
            "charts: {} points from {} samples",
            update.series.points.len(),
            update.sample_count
        ),
        EventPayload::Miners(update) => format!("miners: {} rows", update.rows.len()),
        EventPayload::Pools(update) => format!("pools: {}", update.pools.len()),
        EventPayload::Log(update) => format!("events: {}", update.entries.len()),
        EventPayload::Price(update) => match &update.ticker {
            Some(ticker) => format!("BTC ${:.0}", ticker.price_usd),
            None => "price unavailable".to_string(),
        },
        EventPayload::Ops(ops) => ops.message.clone(),
        EventPayload::Unknown(_) => "unknown event".to_string(),
    }
}

fn server_stamp(state: &DashboardState) -> String {
    state
        .summary
        .as_ref()
        .and_then(|s| s.last_updated.as_deref())
        .map(|ts| format!("updated {}", format_clock(ts)))
        .unwrap_or_else(|| format!("updated {}", placeholder()))
}

fn base_style(theme: Theme) -> Style {
    match theme {
        Theme::Dark => Style::default().fg(Color::White),
        Theme::Light => Style::default().fg(Color::Black),
    }
}

fn freshness_style(freshness: Freshness) -> Style {
    match freshness {
        Freshness::Active => Style::default().fg(Color::Green),
        Freshness::Lagging => Style::default().fg(Color::Yellow),
        Freshness::Stale => Style::default().fg(Color::Red),
        Freshness::Unknown => Style::default().fg(Color::DarkGray),
    }
}

fn placeholder() -> String {
    "--".to_string()
}

fn format_ticker(ticker: &BtcTicker) -> String {
    match ticker.change_24h_pct {
        Some(change) => format!("${:.0} ({change:+.1}%)", ticker.price_usd),
        None => format!("${:.0}", ticker.price_usd),
    }
}

fn chart_data<F>(points: &[SeriesPoint], value: F) -> Vec<(f64, f64)>
where
    F: Fn(&SeriesPoint) -> f64,
{
    points
        .iter()
        .map(|p| (p.bucket.timestamp() as f64, value(p)))
        .collect()
}

fn sparkline_data(history: &[PricePoint]) -> Vec<u64> {
    // Rebase on the window minimum so small moves stay visible.
    let min = history
        .iter()
        .map(|p| p.price_usd)
        .fold(f64::INFINITY, f64::min);
    history
        .iter()
        .map(|p| (p.price_usd - min).max(0.0).round() as u64)
        .collect()
}

fn x_bounds(data: &[(f64, f64)]) -> [f64; 2] {
    match (data.first(), data.last()) {
        (Some(first), Some(last)) if last.0 > first.0 => [first.0, last.0],
        (Some(first), Some(_)) => [first.0 - 60.0, first.0 + 60.0],
        _ => [0.0, 1.0],
    }
}

fn y_bounds(data: &[(f64, f64)]) -> [f64; 2] {
    // The y axis always starts at zero.
    let max = data.iter().map(|p| p.1).fold(0.0_f64, f64::max);
    if max > 0.0 {
        [0.0, max * 1.1]
    } else {
        [0.0, 1.0]
    }
}

fn format_axis_time(epoch_secs: f64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_secs as i64, 0)
        .map(|at| at.format("%H:%M").to_string())
        .unwrap_or_default()
}

fn format_clock(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc).format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn human_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_duration_picks_largest_units() {
        assert_eq!(human_duration(42), "42s");
        assert_eq!(human_duration(95), "1m 35s");
        assert_eq!(human_duration(3_700), "1h 1m");
        assert_eq!(human_duration(90_061), "1d 1h 1m");
    }

    #[test]
    fn chart_bounds_handle_degenerate_series() {
        assert_eq!(x_bounds(&[]), [0.0, 1.0]);
        assert_eq!(y_bounds(&[]), [0.0, 1.0]);
        let single = [(1_000.0, 5.0)];
        assert_eq!(x_bounds(&single), [940.0, 1_060.0]);
        let flat_zero = [(0.0, 0.0), (60.0, 0.0)];
        assert_eq!(y_bounds(&flat_zero), [0.0, 1.0]);
    }

    #[test]
    fn format_clock_falls_back_to_raw_value() {
        assert_eq!(format_clock("2024-05-01T12:34:56Z"), "12:34:56");
        assert_eq!(format_clock("yesterday"), "yesterday");
    }

    #[test]
    fn sparkline_rebases_on_window_minimum() {
        let history = vec![
            PricePoint {
                at: Utc::now(),
                price_usd: 61_000.0,
            },
            PricePoint {
                at: Utc::now(),
                price_usd: 61_250.0,
            },
        ];
        assert_eq!(sparkline_data(&history), vec![0, 250]);
    }
}
