//! Server orchestration: shared state, startup, and the two-phase shutdown
//! drain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::auth::daemon::AuthDaemon;
use crate::auth::AuthMessage;
use crate::config::Config;
use crate::game::age::AgeInfo;
use crate::game::{HostMessage, HostRegistry};
use crate::net::channel::{msg_channel, MsgChannel};
use crate::net::{ClientRegistry, ShutdownSignal};
use crate::sdl::DescriptorDb;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state every service task can reach.
pub struct ShardServer {
    pub config: Arc<Config>,
    pub auth_channel: MsgChannel<AuthMessage>,
    pub sdl_db: Arc<DescriptorDb>,
    pub ages: Arc<HashMap<String, AgeInfo>>,
    pub hosts: HostRegistry,
    pub shutdown: ShutdownSignal,
    pub auth_clients: Arc<ClientRegistry>,
    pub file_clients: Arc<ClientRegistry>,
    pub gate_clients: Arc<ClientRegistry>,
    pub game_clients: Arc<ClientRegistry>,
}

impl ShardServer {
    /// Load on-disk state, connect the auth daemon, and bind the listen
    /// sockets. Failures here are unrecoverable.
    pub async fn start(config: Config) -> anyhow::Result<Arc<Self>> {
        let config = Arc::new(config);

        let mut sdl_db = DescriptorDb::new();
        crate::sdl::load_descriptors(&mut sdl_db, std::path::Path::new(&config.sdl_path))?;
        let sdl_db = Arc::new(sdl_db);

        let ages = Arc::new(crate::game::age::load_ages(std::path::Path::new(
            &config.age_path,
        ))?);

        let (auth_channel, auth_pump) = msg_channel();
        let daemon = AuthDaemon::connect(config.clone(), sdl_db.clone()).await?;
        tokio::spawn(daemon.run(auth_pump));

        let server = Arc::new(Self {
            config: config.clone(),
            auth_channel,
            sdl_db,
            ages,
            hosts: HostRegistry::default(),
            shutdown: ShutdownSignal::new(),
            auth_clients: Arc::new(ClientRegistry::default()),
            file_clients: Arc::new(ClientRegistry::default()),
            gate_clients: Arc::new(ClientRegistry::default()),
            game_clients: Arc::new(ClientRegistry::default()),
        });

        let lobby = TcpListener::bind(config.lobby_bind()).await?;
        tokio::spawn(crate::net::lobby::run(lobby, server.clone()));

        let status = TcpListener::bind(config.status_bind()).await?;
        tokio::spawn(crate::net::status::run(status, config.clone()));

        Ok(server)
    }

    /// Two-phase drain: tell the daemons to stop, close down clients via the
    /// shutdown signal, then wait (bounded) for the registries to empty.
    pub async fn stop(&self) {
        tracing::info!("Shutting down");

        {
            let hosts = self.hosts.lock().await;
            for handle in hosts.values() {
                handle.channel.post(HostMessage::Shutdown);
            }
        }
        self.shutdown.trigger();

        for (name, registry) in [
            ("auth", &self.auth_clients),
            ("file", &self.file_clients),
            ("gate", &self.gate_clients),
            ("game", &self.game_clients),
        ] {
            if !registry.drain(DRAIN_TIMEOUT).await {
                tracing::error!(
                    service = name,
                    live = registry.live_clients(),
                    "Clients still alive after the drain timeout"
                );
            }
        }

        self.auth_channel.post(AuthMessage::Shutdown);
    }
}
