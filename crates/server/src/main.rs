use std::io;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use spacegame_server::tui::{self, ConsoleState};
use spacegame_server::{GameServer, ServerConfig, ServerEvent};

#[derive(Parser)]
#[command(name = "spacegame-server")]
#[command(about = "Spacegame dedicated server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = spacegame::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = spacegame::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 10, help = "Ticks between broadcasts")]
    broadcast_interval: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value_t = spacegame_server::config::DEFAULT_ASTEROID_SEED)]
    seed: u64,

    #[arg(long, help = "Start without asteroids")]
    empty: bool,

    #[arg(long, help = "Keep a leaving player's spawn point occupied")]
    keep_spawn_points: bool,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        broadcast_interval_ticks: args.broadcast_interval,
        max_clients: args.max_clients,
        free_spawn_point_on_disconnect: !args.keep_spawn_points,
        asteroid_seed: (!args.empty).then_some(args.seed),
        ..Default::default()
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut server = GameServer::bind(&args.bind, args.port, config)?;

    if args.headless {
        if let Some(addr) = server.local_addr() {
            log::info!("Server started on {}", addr);
        }
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let tick_duration = server.simulation().config().tick_duration();
    let mut console = ConsoleState::new();

    if let Some(addr) = server.local_addr() {
        console.log_info(format!("Server started on {}", addr));
    }

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::PlayerHit { .. } | ServerEvent::PlayerCrashed { .. } => {
                    console.log_warn(event.describe())
                }
                _ => console.log_info(event.describe()),
            }
        }

        let budget = tick_duration.saturating_sub(started.elapsed());
        if event::poll(budget.max(Duration::from_millis(1)))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    running.store(false, Ordering::SeqCst);
                }
            }
        }

        let stats = server.stats();
        let players = tui::player_rows(server.simulation().registry());
        terminal.draw(|frame| {
            tui::render(frame, &console, &stats, &players);
        })?;
    }

    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
