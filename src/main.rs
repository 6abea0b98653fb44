use actix_web::{middleware::Logger, web, App, HttpServer};
use futures::executor::block_on;
use tracing::info;
use tracing_subscriber::EnvFilter;

use buurt_board::config::Config;
use buurt_board::message_database::MessageStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::from_env()?;
    let store: web::Data<dyn MessageStore> = web::Data::from(config.open_store()?);
    info!(store = ?config.store, "Message store ready");

    let app_store = store.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_store.clone())
            .configure(buurt_board::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .disable_signals()
    .run();

    let handle = server.handle();
    ctrlc::set_handler(move || {
        info!("Stopping server, finishing in-flight requests");
        block_on(handle.stop(true));
    })?;

    info!("Listening on http://{}:{}", config.host, config.port);
    server.await?;

    // last handle on the store; dropping it closes the connection pool
    drop(store);
    info!("Store closed. Bye!");
    Ok(())
}
