use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table};

use spacegame::{ConnectionState, Keys, NetworkStats};

use crate::net::ClientWorld;

#[derive(Debug, Clone, PartialEq)]
pub struct ShipRow {
    pub entity_id: u32,
    pub is_local: bool,
    pub position: [f32; 3],
    pub speed: f32,
    pub hits: u32,
    pub deaths: u32,
}

pub fn ship_rows(world: &ClientWorld) -> Vec<ShipRow> {
    world
        .ships()
        .map(|ship| {
            let p = ship.transform.position();
            let tally = world.tally(ship.id);
            ShipRow {
                entity_id: ship.id,
                is_local: world.local_id() == Some(ship.id),
                position: [p.x, p.y, p.z],
                speed: ship.speed(),
                hits: tally.hits,
                deaths: tally.deaths,
            }
        })
        .collect()
}

pub fn key_labels(keys: Keys) -> String {
    const LABELS: [(Keys, &str); 9] = [
        (Keys::FORWARD, "W"),
        (Keys::BOOST, "Boost"),
        (Keys::ROLL_LEFT, "A"),
        (Keys::ROLL_RIGHT, "D"),
        (Keys::PITCH_UP, "Up"),
        (Keys::PITCH_DOWN, "Down"),
        (Keys::YAW_LEFT, "Left"),
        (Keys::YAW_RIGHT, "Right"),
        (Keys::FIRE, "Fire"),
    ];

    let held: Vec<&str> = LABELS
        .iter()
        .filter(|(key, _)| keys.contains(*key))
        .map(|(_, label)| *label)
        .collect();
    if held.is_empty() {
        "-".to_string()
    } else {
        held.join(" ")
    }
}

pub struct ClientScreen<'a> {
    pub status: ConnectionState,
    pub world: &'a ClientWorld,
    pub stats: &'a NetworkStats,
    pub keys: Keys,
    /// Text being typed, when chat entry is open.
    pub chat_input: Option<&'a str>,
}

pub fn render(frame: &mut Frame, screen: &ClientScreen) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(10),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], screen);
    render_ships(frame, chunks[1], screen.world);
    render_chat(frame, chunks[2], screen.world);
    render_prompt(frame, chunks[3], screen.chat_input);
}

fn render_header(frame: &mut Frame, area: Rect, screen: &ClientScreen) {
    let status_color = match screen.status {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Disconnecting => Color::Yellow,
        ConnectionState::Disconnected => Color::Red,
    };
    let ship = screen
        .world
        .local_id()
        .map_or_else(|| "-".to_string(), |id| id.to_string());

    let lines = vec![
        Line::from(vec![
            Span::styled(
                screen.status.as_str(),
                Style::default()
                    .fg(status_color)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  |  Ship: {}  |  Lasers: {}  |  Keys: {}",
                ship,
                screen.world.lasers().count(),
                key_labels(screen.keys)
            )),
        ]),
        Line::from(Span::styled(
            format!(
                "Packets {} sent / {} recv  |  Enter chat  Esc quit",
                screen.stats.packets_sent, screen.stats.packets_received
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .title(" Spacegame ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_ships(frame: &mut Frame, area: Rect, world: &ClientWorld) {
    let header = Row::new(vec!["Ship", "Position", "Speed", "Hits", "Deaths"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = ship_rows(world).into_iter().map(|ship| {
        let style = if ship.is_local {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Row::new(vec![
            ship.entity_id.to_string(),
            format!(
                "{:>8.1} {:>8.1} {:>8.1}",
                ship.position[0], ship.position[1], ship.position[2]
            ),
            format!("{:.1}", ship.speed),
            ship.hits.to_string(),
            ship.deaths.to_string(),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(28),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().title(" Ships ").borders(Borders::ALL));

    frame.render_widget(table, area);
}

fn render_chat(frame: &mut Frame, area: Rect, world: &ClientWorld) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = world.chat().map(|line| Line::raw(line.text.clone())).collect();
    let skip = lines.len().saturating_sub(visible);

    let block = Block::default()
        .title(" Chat ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(
        Paragraph::new(lines.into_iter().skip(skip).collect::<Vec<_>>()).block(block),
        area,
    );
}

fn render_prompt(frame: &mut Frame, area: Rect, chat_input: Option<&str>) {
    let (text, style) = match chat_input {
        Some(input) => (format!("> {}_", input), Style::default().fg(Color::White)),
        None => (
            "W thrust (Shift boost)  A/D roll  arrows pitch/yaw  Space fire".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let block = Block::default().borders(Borders::ALL);
    frame.render_widget(Paragraph::new(text).style(style).block(block), area);
}
