pub mod audit;
pub mod session;

pub use audit::AuditLog;
pub use session::{Command, CommandError, CommandHandler, Reply};

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Pause after a failed accept, e.g. when the process is out of file descriptors.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts connections and serves each one on its own task.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
}

impl Server {
    pub async fn bind(addr: &str, handler: CommandHandler) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind listener on {addr}"))?;
        Ok(Server { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves. Sessions already running are left to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "Listening for commands");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                            continue;
                        }
                    };
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        let peer = peer.to_string();
                        if let Err(e) = handler.run(stream, &peer).await {
                            error!(%peer, error = ?e, "Session ended with error");
                        }
                    });
                }
            }
        }
    }
}
