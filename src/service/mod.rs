// =============================================================================
// FitPulse Social Fitness Backend - Service Registry
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Central container for the messaging core. Each service owns one
//   concern; the gateways and REST handlers reach them through the
//   process-wide `services()` accessor.
//
// =============================================================================

use std::sync::Arc;
use tracing::info;

use crate::{Config, Result};

pub mod auth;
pub mod bus;
pub mod cache;
pub mod direct;
pub mod globals;
pub mod messages;
pub mod participation;
pub mod presence;
pub mod pusher;
pub mod users;

#[derive(Debug)]
pub struct Services {
    pub globals: globals::Service,
    pub auth: auth::Service,
    pub users: users::Service,
    pub presence: presence::Service,
    pub bus: Arc<bus::Service>,
    pub cache: Arc<cache::Service>,
    pub messages: messages::Service,
    pub direct: direct::Service,
    pub participation: participation::Service,
    pub pusher: pusher::Service,
}

impl Services {
    /// Wire every service against one storage backend. The bus and cache
    /// share the Redis endpoint but hold independent connections; either
    /// can degrade without affecting the other.
    pub async fn build<D>(db: &'static D, config: Config) -> Result<Self>
    where
        D: messages::Data + direct::Data + participation::Data + users::Data + 'static,
    {
        let bus = Arc::new(bus::Service::new(config.redis_url.as_deref()).await);
        let cache = Arc::new(cache::Service::new(config.redis_url.as_deref(), &config).await);
        info!(
            clustered = bus.is_available(),
            "💬 messaging core services initializing"
        );

        let services = Self {
            auth: auth::Service::jwt(&config.jwt_secret),
            users: users::Service { db },
            presence: presence::Service::new(),
            messages: messages::Service {
                db,
                cache: Arc::clone(&cache),
                default_page_limit: config.default_page_limit,
                max_page_limit: config.max_page_limit,
            },
            direct: direct::Service::new(db),
            participation: participation::Service {
                db,
                cache: Arc::clone(&cache),
                bus: Arc::clone(&bus),
            },
            pusher: pusher::Service::log_only(),
            bus,
            cache,
            globals: globals::Service::new(config),
        };
        Ok(services)
    }
}
