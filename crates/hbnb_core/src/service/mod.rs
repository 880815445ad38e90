//! Core use-case services.
//!
//! # Responsibility
//! - Turn store operations into the results the console prints.
//! - Keep the CLI decoupled from store and snapshot details.

pub mod console_service;
