use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Row, Table};

use crate::registry::Registry;
use crate::server::ServerStats;

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRow {
    pub entity_id: u32,
    pub position: [f32; 3],
    pub speed: f32,
    pub spawn_point: Option<usize>,
}

pub fn player_rows(registry: &Registry) -> Vec<PlayerRow> {
    registry
        .ships()
        .map(|ship| {
            let p = ship.transform.position();
            PlayerRow {
                entity_id: ship.id,
                position: [p.x, p.y, p.z],
                speed: ship.motion.linear_velocity.length(),
                spawn_point: registry.spawn_point_index(ship.id),
            }
        })
        .collect()
}

#[derive(Default)]
pub struct ConsoleState {
    log: VecDeque<(Color, String)>,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_info(&mut self, line: impl Into<String>) {
        self.push(Color::White, line.into());
    }

    pub fn log_warn(&mut self, line: impl Into<String>) {
        self.push(Color::Yellow, line.into());
    }

    fn push(&mut self, color: Color, line: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back((color, line));
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}

pub fn render(
    frame: &mut Frame,
    console: &ConsoleState,
    stats: &ServerStats,
    players: &[PlayerRow],
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(8),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_players(frame, chunks[3], players);
    render_log(frame, chunks[4], console);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(
        " Spacegame Server - Uptime: {} ",
        format_duration(stats.uptime_secs)
    );
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Ships: {}  |  Lasers: {}  |  q/ESC to quit",
        stats.tick, stats.player_count, stats.laser_count
    );
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let max = stats.max_clients.max(1);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Capacity "))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio((stats.player_count as f64 / max as f64).min(1.0))
        .label(format!("{}/{} ships", stats.player_count, max));

    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let net = &stats.network_stats;
    let lines = vec![
        Line::from(vec![
            Span::styled("Packets: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} sent / {} recv", net.packets_sent, net.packets_received)),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            )),
            Span::styled("  Rejected: ", Style::default().fg(Color::Gray)),
            Span::raw(net.peers_rejected.to_string()),
        ]),
    ];

    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_players(frame: &mut Frame, area: Rect, players: &[PlayerRow]) {
    let header = Row::new(vec!["Ship", "Position", "Speed", "Spawn"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = players.iter().map(|p| {
        Row::new(vec![
            p.entity_id.to_string(),
            format!(
                "{:>8.1} {:>8.1} {:>8.1}",
                p.position[0], p.position[1], p.position[2]
            ),
            format!("{:.1}", p.speed),
            p.spawn_point.map_or_else(|| "-".to_string(), |i| i.to_string()),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(28),
            Constraint::Length(8),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().title(" Ships ").borders(Borders::ALL));

    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, console: &ConsoleState) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = console
        .log
        .iter()
        .skip(console.log.len().saturating_sub(visible))
        .map(|(color, text)| Line::styled(text.clone(), Style::default().fg(*color)))
        .collect();

    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let mut console = ConsoleState::new();
        for i in 0..MAX_LOG_LINES + 10 {
            console.log_info(format!("line {}", i));
        }
        assert_eq!(console.log_len(), MAX_LOG_LINES);
        assert_eq!(console.log.front().map(|(_, l)| l.as_str()), Some("line 10"));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KB");
    }

    #[test]
    fn test_player_rows_from_registry() {
        let mut registry = Registry::new(4, 10.0);
        registry.insert_ship(crate::registry::ShipState::new(3));
        registry.claim_spawn_point(3);

        let rows = player_rows(&registry);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, 3);
        assert_eq!(rows[0].spawn_point, Some(0));
        assert_eq!(rows[0].speed, 0.0);
    }
}
