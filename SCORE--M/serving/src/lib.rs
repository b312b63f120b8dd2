#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! HTTP front end that scores student records against the trained artifacts.

/// Server configuration.
#[path = "../config.rs"]
pub mod config;

/// Form decoding.
#[path = "../form.rs"]
pub mod form;

/// HTML rendering.
#[path = "../pages.rs"]
pub mod pages;

/// Router and handlers.
#[path = "../app.rs"]
pub mod app;

pub use app::{router, AppState};
pub use config::ServingConfig;
pub use form::{FormError, PredictForm};
