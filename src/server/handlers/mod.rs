//! HTTP handlers for the server.

pub mod health;
pub mod print;
pub mod printers;
