use std::net::SocketAddr;

use grid_sync::server::{self, AppState};
use grid_sync::ServerConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server bound to an ephemeral port on loopback.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let state = AppState::new(&ServerConfig::default());
        let handle = tokio::spawn({
            let state = state.clone();
            async move {
                let _ = server::serve(listener, state).await;
            }
        });
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    #[allow(dead_code)]
    pub fn root_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
