//! Domain services used by the HTTP and websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business rules and talk to the `Store` trait, so route
//! handlers stay focused on protocol translation and auth plumbing. The two
//! stateful view machines (`wizard`, `verification`) hold an `Arc<dyn Store>`
//! and are parked in `AppState` between requests.

pub mod auth;
pub mod blacklist;
pub mod dashboard;
pub mod dispute;
pub mod guard;
pub mod live;
pub mod moderation;
pub mod session;
pub mod verification;
pub mod wizard;
