use clap::{Parser, Subcommand};

use spacegame_client::{App, ClientConfig, Mode};
use spacegame_server::ServerConfig;

#[derive(Parser)]
#[command(name = "spacegame")]
#[command(about = "Spacegame client (logs go to stderr; redirect with 2>file)")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = 60)]
    frame_rate: u32,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run a server in this process and join it
    Host {
        #[arg(short, long, default_value_t = spacegame::DEFAULT_PORT)]
        port: u16,

        #[arg(long, help = "Start without asteroids")]
        empty: bool,
    },
    /// Join a server at ip:port
    Join {
        #[arg(help = "Server address (e.g., 127.0.0.1:6969)")]
        server: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ClientConfig {
        frame_rate: args.frame_rate,
        connect_timeout_ms: args.connect_timeout_ms,
        ..Default::default()
    };

    let mode = match args.command {
        Command::Host { port, empty } => {
            let mut server = ServerConfig::default();
            if empty {
                server.asteroid_seed = None;
            }
            Mode::Host { port, server }
        }
        Command::Join { server } => {
            let (address, port) = parse_server(&server)?;
            Mode::Join { address, port }
        }
    };

    let mut app = App::start(mode, config)?;
    app.run()?;
    Ok(())
}

fn parse_server(server: &str) -> anyhow::Result<(String, u16)> {
    match server.rsplit_once(':') {
        Some((address, port)) => Ok((address.to_string(), port.parse()?)),
        None => Ok((server.to_string(), spacegame::DEFAULT_PORT)),
    }
}
