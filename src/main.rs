use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use repico::{AppConfig, AppState, JsonProfileStore, PinController};

#[cfg(not(feature = "sysfs-gpio"))]
use repico::MockGateway;
#[cfg(feature = "sysfs-gpio")]
use repico::SysfsGateway;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REPICO_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load_from_file(&config_path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    info!("configuration loaded from {config_path}");

    let gateway = {
        #[cfg(feature = "sysfs-gpio")]
        {
            info!("using sysfs gpio at {}", config.gpio.root.display());
            Arc::new(SysfsGateway::new(
                config.gpio.paths(),
                config.gpio.settle_policy(),
            ))
        }
        #[cfg(not(feature = "sysfs-gpio"))]
        {
            warn!("sysfs-gpio feature disabled, using in-memory gpio");
            Arc::new(MockGateway::default())
        }
    };

    let controller = Arc::new(PinController::new(gateway));
    let mut app_state = AppState::new(controller.clone()).with_timeout(config.request_timeout());

    if let Some(profiles_cfg) = &config.profiles {
        let store = Arc::new(JsonProfileStore::new(&profiles_cfg.path));
        if let Some(name) = &profiles_cfg.startup {
            match store.load(name).and_then(|p| p.apply(controller.as_ref())) {
                Ok(n) => info!("startup profile '{name}' applied ({n} pin(s))"),
                Err(e) => warn!("startup profile '{name}' not applied: {e}"),
            }
        }
        app_state = app_state.with_profiles(store);
    }

    let scope_path = config.http.path.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(app_state.api_scope(&scope_path))
    });

    let bind_addrs: String;
    let http_cfg = config.http.clone();
    let server = match (&http_cfg.unix_socket, &http_cfg.host) {
        (Some(socket_path), Some(host)) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = format!("{} and {}", socket_path, host);

            server.bind_uds(socket_path)?.bind_auto_h2c(host)?
        }
        (Some(socket_path), None) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = socket_path.clone();

            server.bind_uds(socket_path)?
        }
        (None, Some(host)) => {
            bind_addrs = host.clone();

            server.bind_auto_h2c(host)?
        }
        (None, None) => {
            error!("no listener configured");
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "either 'unix_socket' or 'host' must be specified",
            ));
        }
    };

    info!("Starting server on {}...", bind_addrs);

    let result = server.run().await;
    info!("server stopped");
    result
}
