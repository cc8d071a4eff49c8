//! Role-Based View Router
//!
//! Pure mapping from a [`Session`] snapshot to the top-level screen graph
//! that should be mounted.

use edulink_core::{Role, Session};
use serde::Serialize;
use std::fmt;

/// Top-level set of screens mounted for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenGraph {
    /// Login and other public screens
    Unauthenticated,
    Parent,
    Teacher,
}

impl ScreenGraph {
    pub fn is_privileged(&self) -> bool {
        !matches!(self, ScreenGraph::Unauthenticated)
    }
}

impl fmt::Display for ScreenGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenGraph::Unauthenticated => f.write_str("unauthenticated"),
            ScreenGraph::Parent => f.write_str("parent"),
            ScreenGraph::Teacher => f.write_str("teacher"),
        }
    }
}

/// Animation used when swapping screen graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Push,
    /// The user just signed out
    Pop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteSelection {
    pub graph: ScreenGraph,
    pub transition: Transition,
}

/// Pick the screen graph for `session`
///
/// A token whose role is missing or not recognized gets the unauthenticated
/// graph: no privileged screen is ever shown without a known role.
pub fn route(session: &Session) -> ScreenGraph {
    if session.token().is_none() {
        return ScreenGraph::Unauthenticated;
    }

    match session.role() {
        Some(Role::Teacher) => ScreenGraph::Teacher,
        Some(Role::Parent) => ScreenGraph::Parent,
        Some(Role::Unrecognized(_)) | None => ScreenGraph::Unauthenticated,
    }
}

/// [`route`] plus the transition animation
pub fn select(session: &Session) -> RouteSelection {
    RouteSelection {
        graph: route(session),
        transition: if session.is_signing_out() {
            Transition::Pop
        } else {
            Transition::Push
        },
    }
}
