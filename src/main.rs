// src/main.rs
use actix_web::{middleware::Logger, web, App, HttpServer}; // Server, app builder and request logging
use log::info; // Logging facade
use n_pendulum_chain::config::ServerConfig; // Bind address from the environment
use n_pendulum_chain::ui::{configure, ChainRegistry}; // Routes and the shared chain registry

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let server = ServerConfig::from_env();
    let registry = web::Data::new(ChainRegistry::new()); // One registry shared by every worker

    info!("listening on http://{}", server.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(registry.clone())
            .configure(configure)
    })
    .bind(&server.bind)?
    .run()
    .await
}
