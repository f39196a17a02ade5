use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use log::{error, info};
use tokio::sync::Mutex;

use crate::dashboard::{Filters, TableCache, render};

#[derive(Clone)]
pub struct DashboardState {
    pub path: PathBuf,
    pub title: String,
    pub cache: Arc<Mutex<TableCache>>,
}

impl DashboardState {
    pub fn new(path: PathBuf, title: impl Into<String>) -> Self {
        Self {
            path,
            title: title.into(),
            cache: Arc::new(Mutex::new(TableCache::new())),
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new().route("/", get(index)).with_state(state)
}

async fn index(State(state): State<DashboardState>, RawQuery(query): RawQuery) -> Response {
    let data = {
        let mut cache = state.cache.lock().await;
        cache.get(&state.path)
    };
    match data {
        Ok(data) => {
            let filters = Filters::from_query(query.as_deref().unwrap_or_default());
            let view = data.view(&filters);
            Html(render::render_page(&state.title, &view)).into_response()
        }
        Err(err) => {
            error!("Dashboard data unavailable: {err:#}");
            let body = format!(
                "<!DOCTYPE html><html><body><h1>{}</h1><p>{}</p></body></html>",
                render::escape_html(&state.title),
                render::escape_html(&format!("{err:#}"))
            );
            (StatusCode::SERVICE_UNAVAILABLE, Html(body)).into_response()
        }
    }
}

/// Serves the dashboard until Ctrl-C on a single-threaded runtime.
pub fn serve(state: DashboardState, bind: SocketAddr) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Building the dashboard runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("Binding dashboard to {bind}"))?;
        info!("Dashboard listening on http://{bind}");
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("Dashboard server error")?;
        info!("Dashboard stopped");
        Ok(())
    })
}
