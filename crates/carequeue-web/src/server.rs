//! Web服务器

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use carequeue_engine::QueueEngine;
use std::future::Future;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::handlers::{
    admit_patient, advance_patient, book_appointment, cancel_appointment, department_in_progress,
    department_queue, get_patient, health, list_departments, list_patients, register_patient,
    stats, update_department_load, AppState,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, engine: QueueEngine) -> Self {
        let app = create_router(AppState::new(engine));
        Self { addr, app }
    }

    /// 运行直到 `shutdown` 完成
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Web server failed: {}", e))?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 构建完整路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/departments", get(list_departments))
        .route("/departments/:id/queue", get(department_queue))
        .route("/departments/:id/in-progress", get(department_in_progress))
        .route("/departments/:id/load", put(update_department_load))
        .route("/patients", post(register_patient).get(list_patients))
        .route("/patients/admit", post(admit_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/advance", post(advance_patient))
        .route("/appointments", post(book_appointment))
        .route("/appointments/:patient_id", axum::routing::delete(cancel_appointment))
        .route("/stats", get(stats))
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    info!("API {} {} -> {}", method, uri, response.status());
    response
}
