//! Session lifecycle management

pub mod manager;

pub use manager::{Session, SessionManager, SessionState};
