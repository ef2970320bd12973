mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod test_support;

use crate::config::Config;
use crate::routes::configure_routes;
use crate::state::AppState;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use log::info;
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::io::Write;
use std::time::Duration;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)) // 转换为 io::Result
        })
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // 数据库连接池，启动时不强制连通，由 /health 反映数据库状态
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect_lazy(&config.database.url)
        .context("Invalid DATABASE_URL")?;

    let bind_address = config.bind_address();
    let workers = config.server.workers;
    info!(
        "wxpay-relay {} starting on {}, env: {}, web: {}",
        env!("CARGO_PKG_VERSION"),
        bind_address,
        config.web.app_env,
        config.web.url
    );

    let app_state = web::Data::new(AppState::new(db_pool, config)?);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("HTTP server error")?;

    info!("wxpay-relay stopped");
    Ok(())
}
