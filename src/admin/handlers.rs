use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::controller::{ControllerState, ReconcileStatus};

#[derive(Serialize)]
pub struct Health {
    pub version: &'static str,
    pub state: ControllerState,
}

pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<Health>) {
    let current = state.status.load().state;
    let code = match current {
        ControllerState::Watching | ControllerState::Resyncing => StatusCode::OK,
        ControllerState::Connecting | ControllerState::Syncing => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        code,
        Json(Health {
            version: env!("CARGO_PKG_VERSION"),
            state: current,
        }),
    )
}

pub async fn get_status(State(state): State<AdminState>) -> Json<ReconcileStatus> {
    Json(ReconcileStatus::clone(&state.status.load()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ReconcileOutcome, StatusBoard};
    use crate::lifecycle::Shutdown;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn start(status: Arc<StatusBoard>) -> (String, Shutdown) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = Shutdown::new();
        tokio::spawn(crate::admin::serve(listener, status, shutdown.subscribe()));
        (base, shutdown)
    }

    #[tokio::test]
    async fn test_health_follows_state() {
        let status = Arc::new(StatusBoard::new());
        let (base, shutdown) = start(status.clone()).await;

        let res = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(res.status().as_u16(), 503);

        status.set_state(ControllerState::Watching);
        let res = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["state"], "watching");

        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_status_json() {
        let status = Arc::new(StatusBoard::new());
        status.record(&Ok(ReconcileOutcome::Applied {
            hash: "0123abcd".to_string(),
            notified: true,
        }));
        let (base, shutdown) = start(status).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["applied"], 1);
        assert_eq!(body["last_applied_hash"], "0123abcd");

        shutdown.trigger();
    }
}
