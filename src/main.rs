use tracing::{error, info};

use skillbus::broker::Broker;
use skillbus::config::{load_config, local_service_config};
use skillbus::persistence::LocalStorage;
use skillbus::utils::logging;

#[tokio::main]
async fn main() {
    // Load configuration with robust error handling
    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return;
        }
    };

    logging::init(config.log.max_level());

    let storage = match LocalStorage::open(&config.storage.path) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to open local storage: {}", e);
            return;
        }
    };

    let broker = Broker::new();
    let document = local_service_config(
        &config.service.socket_path,
        config.service.lmb_socket_path.as_deref(),
    );
    if !broker.configure(&document, storage) {
        error!("Broker configuration failed.");
        return;
    }
    if !broker.start() {
        error!("Broker failed to start.");
        return;
    }
    info!(socket = %config.service.socket_path, "Local skill service listening");

    // Run until a shutdown signal arrives
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received. Exiting gracefully.");
    }
    broker.stop();
}
