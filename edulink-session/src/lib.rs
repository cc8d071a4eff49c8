//! EduLink Session - authentication lifecycle for EduLink clients
//!
//! This crate owns the question "who is signed in right now":
//!
//! - [`SessionController`]: single writer of the [`Session`], restores it from
//!   a [`KeyValueStore`] at startup and applies sign-in/sign-out transitions,
//!   notifying every subscriber once per transition
//! - [`router`]: picks the screen graph (unauthenticated, parent, teacher)
//!   for a session snapshot
//! - [`store`]: in-memory and JSON-file key-value stores
//! - [`api`] and [`flow`]: the HTTP credential exchange that produces the
//!   `(token, role, user id)` tuple handed to the controller
//!
//! ## Persistence contract
//!
//! The three session keys are written and removed independently. Persistence
//! is best-effort: a failed write is logged and the in-memory transition still
//! happens, so the only consequence is that the session does not survive a
//! restart.

pub mod api;
pub mod controller;
pub mod flow;
pub mod router;
pub mod store;

pub use api::HttpSessionApi;
pub use controller::{SessionController, Subscription};
pub use flow::sign_in_with_credentials;
pub use router::{route, select, RouteSelection, ScreenGraph, Transition};
pub use store::{FileStore, MemoryStore};

pub use edulink_core::{
    Credentials, EdulinkError, EdulinkResult, KeyValueStore, Role, Session, SessionApi,
    SessionState, UserProfile,
};
