pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod translate;

pub use backend::{Backend, BedrockClient};
pub use catalog::StaticCatalog;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use logging::SharedLogger;
pub use pricing::CostCalculator;
pub use server::{build_router, AppState};
