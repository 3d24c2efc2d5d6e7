// =============================================================================
// FitPulse Social Fitness Backend - Library Crate
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend for social
//          fitness challenges
// License: Apache 2.0 / MIT
//
// Description:
//   Real-time core for the FitPulse platform: room and one-to-one chat
//   gateways, Redis-backed cross-instance fan-out, presence tracking,
//   cached history pagination and challenge admission. Account management,
//   certification review, rankings and payments live in sibling services.
//
// =============================================================================

pub mod api;
pub mod config;
pub mod database;
pub mod service;
pub mod utils;

pub use config::Config;
pub use service::Services;
pub use utils::error::{Error, Result};

use std::sync::OnceLock;

static SERVICES: OnceLock<Services> = OnceLock::new();

/// Process-wide service registry. Panics when called before `init_services`;
/// the binary initializes it before the first route is served.
pub fn services() -> &'static Services {
    SERVICES.get().expect("services() called before initialization")
}

/// Install the registry. Callable once per process.
pub fn init_services(services: Services) -> Result<()> {
    SERVICES
        .set(services)
        .map_err(|_| Error::Internal("services were already initialized".to_owned()))
}
