use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use spacegame::{CollisionWorld, NetworkStats, PhysicsWorld, ServerHost, SystemClock};

use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::simulation::ServerSimulation;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("could not create server host on {addr}:{port}")]
    Bind { addr: String, port: u16 },
    #[error("failed to spawn server thread: {0}")]
    Thread(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub player_count: usize,
    pub laser_count: usize,
    pub max_clients: usize,
    pub uptime_secs: u64,
    pub network_stats: NetworkStats,
}

pub struct GameServer<W: CollisionWorld = PhysicsWorld> {
    host: ServerHost,
    simulation: ServerSimulation<W>,
    tick_duration: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
}

impl GameServer<PhysicsWorld> {
    /// Listens on `addr:port` with rapier collisions and the wall clock.
    pub fn bind(addr: &str, port: u16, config: ServerConfig) -> Result<Self, ServerError> {
        let mut host = ServerHost::new(config.peer_capacity());
        if !host.create_on((addr, port)) {
            return Err(ServerError::Bind {
                addr: addr.to_string(),
                port,
            });
        }

        let simulation =
            ServerSimulation::new(config, PhysicsWorld::new(), Box::new(SystemClock));
        Ok(Self::with_parts(host, simulation))
    }
}

impl<W: CollisionWorld> GameServer<W> {
    pub fn with_parts(host: ServerHost, simulation: ServerSimulation<W>) -> Self {
        Self {
            tick_duration: simulation.config().tick_duration(),
            host,
            simulation,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.host.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn simulation(&self) -> &ServerSimulation<W> {
        &self.simulation
    }

    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        self.simulation.drain_notices()
    }

    /// Poll the transport without blocking, then advance the simulation one tick.
    pub fn tick_once(&mut self) {
        self.host.poll(0, &mut self.simulation);
        self.simulation.step(&mut self.host);
    }

    /// Fixed-rate loop. An overrunning tick is followed immediately by the next one.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick_once();

            let elapsed = started.elapsed();
            if elapsed < self.tick_duration {
                std::thread::sleep(self.tick_duration - elapsed);
            } else {
                log::trace!(
                    "Tick {} overran by {:?}",
                    self.simulation.tick(),
                    elapsed - self.tick_duration
                );
            }
        }
        self.shutdown_connections();
    }

    pub fn shutdown_connections(&mut self) {
        self.host.disconnect();
    }

    pub fn stats(&self) -> ServerStats {
        let registry = self.simulation.registry();
        ServerStats {
            tick: self.simulation.tick(),
            player_count: registry.ship_count(),
            laser_count: registry.laser_count(),
            max_clients: self.simulation.config().peer_capacity(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            network_stats: self.host.stats().clone(),
        }
    }
}

/// A server loop running on its own thread.
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn spawn(addr: &str, port: u16, config: ServerConfig) -> Result<Self, ServerError> {
        let server = GameServer::bind(addr, port, config)?;
        Self::spawn_server(server)
    }

    pub fn spawn_server<W>(mut server: GameServer<W>) -> Result<Self, ServerError>
    where
        W: CollisionWorld + Send + 'static,
    {
        let running = server.running();
        let local_addr = server.local_addr();

        let thread = std::thread::Builder::new()
            .name("spacegame-server".to_string())
            .spawn(move || {
                log::info!("Server loop started");
                server.run();
                log::info!("Server loop stopped");
            })?;

        Ok(Self {
            running,
            local_addr,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signals the loop to stop and waits for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Server thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
