// =============================================================================
// FitPulse Social Fitness Backend - Global State
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use crate::Config;

/// Server-wide configuration and lifecycle flags.
#[derive(Debug)]
pub struct Service {
    config: Config,
    shutdown: AtomicBool,
}

impl Service {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
