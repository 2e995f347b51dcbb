//! 存活探针：任意路径返回 200 `Alive`，不反映内部状态。

use crate::LivenessError;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub fn router() -> Router {
    Router::new().fallback(alive)
}

async fn alive() -> &'static str {
    "Alive"
}

/// 绑定地址并持续提供存活探针。
pub async fn serve(addr: String) -> Result<(), LivenessError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| LivenessError::Bind(addr.clone(), err.to_string()))?;
    info!(target: "aq.liveness", addr = %addr, "liveness_http_listening");
    axum::serve(listener, router())
        .await
        .map_err(|err| LivenessError::Serve(err.to_string()))
}
