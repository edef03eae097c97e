pub mod mock;
pub mod sysfs;

pub use mock::{GatewayCall, GatewayOp, MockGateway};
pub use sysfs::{DEFAULT_SYSFS_ROOT, SettlePolicy, SysfsGateway, SysfsPaths};
