//! Dashboard resolver for Cityboard.
//!
//! Resolves a `(city, index, limit)` query into an ordered list of components
//! through the dashboard index endpoint, then fetches every component's chart
//! data in parallel. Each fetch owns its own `FetchState`; a newer query
//! invalidates everything the previous one produced.

pub mod decode;
pub mod error;
pub mod resolver;

pub use decode::{component_url, index_url, resolve_components};
pub use error::DashboardError;
pub use resolver::{
    ComponentSlot, ComponentState, DashboardResolver, DashboardRun, DashboardSnapshot, IndexState,
    RunOutcome,
};
