//! Request handlers

pub mod health;
pub mod signals;
pub mod tasks;
