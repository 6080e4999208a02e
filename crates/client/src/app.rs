use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use spacegame::Keys;
use spacegame_server::{ServerConfig, ServerHandle};

use crate::input::InputSampler;
use crate::net::{ClientConfig, GameClient};
use crate::tui::{self, ClientScreen};

/// Longest frame step fed to the simulation.
const MAX_FRAME_DT: f32 = 0.04;

#[derive(Debug, Clone)]
pub enum Mode {
    /// Start a server thread and join it over loopback.
    Host { port: u16, server: ServerConfig },
    Join { address: String, port: u16 },
}

pub struct App {
    client: GameClient,
    server: Option<ServerHandle>,
    sampler: InputSampler,
    keys: Keys,
    chat_input: Option<String>,
    frame_duration: Duration,
    should_quit: bool,
}

impl App {
    pub fn start(mode: Mode, config: ClientConfig) -> anyhow::Result<Self> {
        let frame_duration = Duration::from_secs_f32(config.frame_duration_secs());

        let (server, address, port) = match mode {
            Mode::Host { port, server } => {
                let handle = ServerHandle::spawn("0.0.0.0", port, server)?;
                let port = handle.port().unwrap_or(port);
                log::info!("Hosting on port {}", port);
                (Some(handle), "127.0.0.1".to_string(), port)
            }
            Mode::Join { address, port } => (None, address, port),
        };

        let mut client = GameClient::connect(&address, port, config)?;
        let id = client.wait_for_join()?;
        log::info!("Joined {}:{} as ship {}", address, port, id);

        Ok(Self {
            client,
            server,
            sampler: InputSampler::default(),
            keys: Keys::empty(),
            chat_input: None,
            frame_duration,
            should_quit: false,
        })
    }

    pub fn client(&self) -> &GameClient {
        &self.client
    }

    pub fn is_hosting(&self) -> bool {
        self.server.is_some()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        if let Some(input) = self.chat_input.as_mut() {
            if key.kind == KeyEventKind::Release {
                return;
            }
            match key.code {
                KeyCode::Enter => {
                    let text = input.trim().to_string();
                    self.chat_input = None;
                    if !text.is_empty() {
                        self.client.send_text(text);
                    }
                }
                KeyCode::Esc => self.chat_input = None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc if key.kind == KeyEventKind::Press => self.should_quit = true,
            KeyCode::Enter if key.kind == KeyEventKind::Press => {
                self.sampler.clear();
                self.chat_input = Some(String::new());
            }
            _ => {
                self.sampler.handle(&key, now);
            }
        }
    }

    /// Network poll, input sample, then local simulation.
    pub fn step(&mut self, dt: f32, now: Instant) {
        self.client.poll(0);

        self.keys = self.sampler.sample(now);
        self.client.set_keys(self.keys);
        self.client.update(dt.min(MAX_FRAME_DT));
    }

    fn screen(&self) -> ClientScreen<'_> {
        ClientScreen {
            status: self.client.status(),
            world: self.client.world(),
            stats: self.client.stats(),
            keys: self.keys,
            chat_input: self.chat_input.as_deref(),
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.frame_loop(&mut terminal);

        if enhanced {
            execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
        }
        terminal::disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

        self.shutdown();
        result
    }

    fn frame_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        let mut dt = self.frame_duration.as_secs_f32();

        while !self.should_quit {
            let started = Instant::now();

            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key, Instant::now());
                }
            }

            self.step(dt, Instant::now());
            terminal.draw(|frame| tui::render(frame, &self.screen()))?;

            let elapsed = started.elapsed();
            if elapsed < self.frame_duration {
                std::thread::sleep(self.frame_duration - elapsed);
            }
            dt = started.elapsed().as_secs_f32();
        }

        Ok(())
    }

    /// Leaves the server first, then stops the hosted server if any.
    pub fn shutdown(&mut self) {
        self.client.disconnect();
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
    }
}
