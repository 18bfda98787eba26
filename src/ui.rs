use std::{io, time::{Duration, Instant}};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, Borders, Cell, Paragraph, Row, Table,
    },
    Terminal,
};
use telemetry_lab::{
    constants::TICK_RATE_MS,
    FrameTracker, ManualPowerState, PowerState, TelemetryService,
};

use telemetry_lab::util::{format_ms, format_percent};
use tracing::error;

use crate::app::App;

pub fn run(service: &TelemetryService, power: Option<ManualPowerState>) -> io::Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(power);
    let res = run_app_loop(&mut terminal, app, service, next_terminal_event);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!(%err, "dashboard loop failed");
    }
    res
}

// Waits up to `timeout` for the next terminal event.
fn next_terminal_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

fn run_app_loop<B, E>(
    terminal: &mut Terminal<B>,
    mut app: App,
    service: &TelemetryService,
    mut next_event: E,
) -> io::Result<()>
where
    B: ratatui::backend::Backend,
    E: FnMut(Duration) -> io::Result<Option<Event>>,
{
    let tick_rate = Duration::from_millis(TICK_RATE_MS);
    let summaries = service.subscribe();
    // Fed by our own draw times; independent of the compute loop's timings.
    let tracker = FrameTracker::new();

    loop {
        let frame_start = Instant::now();
        let running = service.is_running();
        let load = service.load().get();
        let power_save = app.power.as_ref().map(|p| p.is_power_save());
        let jank_ms = tracker.config().jank_threshold_ms;

        terminal.draw(|f| {
            // ============= whole screen layout ============
            let main_chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(0)
                .constraints([
                    Constraint::Length(14), // Upside Timing Box
                    Constraint::Min(8),     // Middle Table
                    Constraint::Length(1),  // Bottom Status Bar
                ].as_ref())
                .split(f.size());

            // ============= Top Timing Box ============
            let state_label = if running { "running" } else { "stopped" };
            let timing_block = Block::default()
                .borders(Borders::ALL)
                .title(format!(" Telemetry Lab [{}] ", state_label))
                .border_type(ratatui::widgets::BorderType::Rounded)
                .border_style(Style::default().fg(if running { Color::Cyan } else { Color::DarkGray }));
            f.render_widget(timing_block.clone(), main_chunks[0]);

            let inner_area = timing_block.inner(main_chunks[0]);
            let graph_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
                .split(inner_area);

            // ======== Left Graph (tick latency) ========
            let max_frame = app.frame_history.iter().cloned().fold(1.0, f64::max);
            let x_limit = app.frame_history.len() as f64;

            let latency_canvas = Canvas::default()
                .block(Block::default().title(" Tick latency ").title_style(Style::default().fg(Color::Green)))
                .marker(Marker::Braille)
                .x_bounds([0.0, x_limit])
                .y_bounds([0.0, max_frame])
                .paint(|ctx| {
                    for (i, &val) in app.frame_history.iter().enumerate() {
                        let color = if val > jank_ms { Color::Red } else { Color::Green };
                        ctx.draw(&CanvasLine {
                            x1: i as f64,
                            y1: 0.0,
                            x2: i as f64,
                            y2: val,
                            color,
                        });
                    }
                });
            f.render_widget(latency_canvas, graph_chunks[0]);

            // textual stats on the right
            let text_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
                .split(graph_chunks[1]);

            let label = Style::default().fg(Color::DarkGray);
            let value = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

            let compute_text = vec![
                Line::from(vec![Span::styled("Compute", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))]),
                Line::from(vec![Span::styled("  Last: ", label), Span::styled(format_ms(app.latest.last_frame_ms), value)]),
                Line::from(vec![Span::styled("  Std:  ", label), Span::raw(format!("{:.4}", app.latest.moving_std_ms))]),
                Line::from(vec![Span::styled("  Peak: ", label), Span::raw(format_ms(app.peak_frame_record.0))]),
                Line::from(vec![Span::styled("  Ticks:", label), Span::raw(format!(" {}", app.ticks_seen))]),
            ];
            f.render_widget(Paragraph::new(compute_text), text_chunks[0]);

            let jank_color = if app.frame_stats.jank_count > 0 { Color::Red } else { Color::Green };
            let frame_text = vec![
                Line::from(vec![Span::styled("Frames (30s)", Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD))]),
                Line::from(vec![Span::styled("  Avg:  ", label), Span::styled(format_ms(app.frame_stats.avg_ms), value)]),
                Line::from(vec![Span::styled("  Std:  ", label), Span::raw(format_ms(app.frame_stats.std_ms))]),
                Line::from(vec![
                    Span::styled("  Jank: ", label),
                    Span::styled(
                        format!("{} ({})", app.latest.jank_count_last_30s, format_percent(app.latest.jank_percent_last_30s)),
                        Style::default().fg(jank_color),
                    ),
                ]),
            ];
            f.render_widget(Paragraph::new(frame_text), text_chunks[1]);

            // ============= Middle Recent Ticks Table ============
            let header_cells = ["Time", "Tick Latency", "Spatial Std", "Jank"]
                .iter()
                .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
            let header = Row::new(header_cells)
                .style(Style::default().bg(Color::Rgb(40, 40, 40)))
                .height(1)
                .bottom_margin(0);

            let rows = app.recent.iter().map(|(at, frame_ms, std)| {
                let slow = *frame_ms > jank_ms;
                let color = if slow { Color::Red } else if *frame_ms > jank_ms / 2.0 { Color::LightYellow } else { Color::Green };

                Row::new(vec![
                    Cell::from(at.format("%H:%M:%S%.3f").to_string()).style(Style::default().fg(Color::DarkGray)),
                    Cell::from(format_ms(*frame_ms)).style(Style::default().fg(color)),
                    Cell::from(format!("{:.4}", std)),
                    Cell::from(if slow { "slow" } else { "" }),
                ]).height(1)
            });

            let table = Table::new(
                rows,
                [
                    Constraint::Percentage(25),
                    Constraint::Percentage(25),
                    Constraint::Percentage(25),
                    Constraint::Percentage(25),
                ]
            )
            .header(header)
            .block(Block::default().title(" Recent Ticks ").borders(Borders::ALL).border_type(ratatui::widgets::BorderType::Rounded));
            f.render_widget(table, main_chunks[1]);

            // ============ Bottom Status Bar ============
            let power_label = match power_save {
                Some(true) => "on",
                Some(false) => "off",
                None => "auto",
            };
            let status_content = Line::from(vec![
                Span::styled(format!(" LOAD {} ", load), Style::default().bg(Color::White).fg(Color::Black).add_modifier(Modifier::BOLD)),
                Span::raw(" | "),
                Span::styled("POWER-SAVE: ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::raw(power_label),
                Span::raw(" | "),
                Span::styled("PEAK: ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::raw(format!("{} ", format_ms(app.peak_frame_record.0))),
                Span::styled(format!("(@{})", app.peak_frame_record.1.format("%H:%M:%S")), Style::default().fg(Color::DarkGray)),
                Span::raw(" | "),
                Span::styled(app.status.clone(), Style::default().fg(Color::Cyan)),
                Span::raw(" | s start/stop  +/- load  p power  r reset  q quit"),
            ]);

            let status_bar = Paragraph::new(status_content)
                .style(Style::default().bg(Color::Rgb(20, 20, 20)));
            f.render_widget(status_bar, main_chunks[2]);
        })?;
        tracker.record_duration(frame_start.elapsed());

        // Handle input
        let timeout = tick_rate.checked_sub(app.last_tick.elapsed()).unwrap_or_else(|| Duration::from_secs(0));
        if let Some(Event::Key(key)) = next_event(timeout)? {
            if key.kind == KeyEventKind::Press {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('c') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('s') => app.toggle_running(service),
                    KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => app.adjust_load(service, 1),
                    KeyCode::Char('-') | KeyCode::Down => app.adjust_load(service, -1),
                    KeyCode::Char('p') => app.toggle_power_save(),
                    KeyCode::Char('r') => app.reset_window(&tracker),
                    _ => {}
                }
            }
        }
        if app.last_tick.elapsed() >= tick_rate {
            app.on_tick(&summaries, &tracker);
            app.last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use telemetry_lab::SchedulerConfig;

    fn service() -> TelemetryService {
        let config = SchedulerConfig {
            grid_size: 16,
            ..SchedulerConfig::default()
        };
        TelemetryService::new(config, ManualPowerState::new(false)).unwrap()
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn event_source_error_ends_the_loop() {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        let service = service();

        let res = run_app_loop(&mut terminal, App::new(None), &service, |_| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal closed"))
        });

        let err = res.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn keys_drive_the_service_until_quit() {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        let service = service();
        let mut events = vec![
            key(KeyCode::Char('q')),
            key(KeyCode::Up),
            key(KeyCode::Char('+')),
        ];

        run_app_loop(&mut terminal, App::new(None), &service, |_| Ok(events.pop())).unwrap();

        assert_eq!(service.load().get(), 4);
        assert!(events.is_empty());
    }
}
