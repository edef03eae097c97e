pub mod backend;
pub mod config;
pub mod error;
pub mod gpio;
pub mod profiles;
pub mod registry;
pub mod routes;

pub use backend::{MockGateway, SettlePolicy, SysfsGateway, SysfsPaths};
pub use config::{AppConfig, GpioConfig, HttpConfig, ProfilesConfig};
pub use error::{AppError, GatewayError, GpioError};
pub use gpio::{Direction, GpioGateway, PinController, PinStatus};
pub use profiles::{JsonProfileStore, PinProfile, Profile};
pub use registry::{PinRegistry, RegistryError};
pub use routes::AppState;
