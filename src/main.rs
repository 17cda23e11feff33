use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use venue_booking::{config::Config, db, notify::LogNotifier, routes, state::AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Loaded before the logger so RUST_LOG can come from `.env`.
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();
    if let Err(err) = dotenv {
        log::debug!("No .env file loaded: {err}");
    }

    let config = Config::load();
    db::ensure_sqlite_dir(&config.database_url)?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::seed_admin(&pool, &config.admin).await?;

    let state = AppState::new(pool, Arc::new(LogNotifier), config.event_buffer);

    let address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting venue bookings API on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
