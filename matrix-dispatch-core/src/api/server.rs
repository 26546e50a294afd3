//! HTTP服务器实现

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use super::handlers::AppState;
use super::routes::create_routes;
use crate::config::WorkerSettings;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 参考计算worker
pub struct WorkerServer {
    settings: WorkerSettings,
    state: AppState,
}

impl WorkerServer {
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            state: AppState::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// 绑定监听地址
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.settings.host, self.settings.port)
            .parse()
            .map_err(|e| format!("Invalid address: {}", e))?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// 启动服务器，直到 `shutdown` 完成
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        serve(listener, self.state, shutdown).await
    }
}

/// 在已绑定的监听器上提供服务
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("Starting worker on {}", addr);

    axum::serve(listener, create_routes(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Worker on {} stopped", addr);
    Ok(())
}
