//! # Services
//!
//! Operations shared by the route handlers. Each takes the [`AppState`]
//! and already-extracted input, decides under the relevant store's write
//! lock, writes through to Postgres when a pool is present, and queues any
//! secondary effects.
//!
//! [`AppState`]: crate::state::AppState

pub mod abstracts;
pub mod documents;
pub mod downloads;
pub mod invitations;
pub mod otp;
pub mod papers;
pub mod payments;
pub mod queries;
pub mod users;
