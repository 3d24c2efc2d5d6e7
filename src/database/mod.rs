// =============================================================================
// FitPulse Social Fitness Backend - Database Layer
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

pub mod postgres;

pub use postgres::PostgresDb;
