//! Client messaging coordinators for the scene host.
//!
//! - [`loading`]: open requests, loading-state queries, settle notification
//! - [`selection`]: selection sync, hierarchy queries, pickability, camera reset
//! - [`status`]: asset status to selection-group assignment
//! - [`controller`]: routes inbound messages and scene events to all three

#![deny(unsafe_code)]

pub mod context;
pub mod controller;
pub mod coordinator;
pub mod hierarchy;
pub mod loading;
pub mod locator;
pub mod selection;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use context::CoordinatorContext;
pub use controller::MessagingController;
pub use coordinator::Coordinator;
pub use loading::{LoadPhase, LoadingCoordinator};
pub use selection::SelectionCoordinator;
pub use status::{AssetStatus, StatusCoordinator};
