//! Cirrus provider contract
//!
//! This crate defines what a cloud provider has to implement so that a
//! declarative, diff-based engine can manage its resources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                declarative engine                │
//! │        (parse → diff → create/update/delete)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │ type tags, JSON configuration
//! ┌─────────────────▼───────────────────────────────┐
//! │                  cirrus-cloud                    │
//! │  ┌────────────┐ ┌──────────┐ ┌───────────────┐  │
//! │  │ Resource / │ │  Diff /  │ │   Registry    │  │
//! │  │   Finder   │ │  Schema  │ │ (type → impl) │  │
//! │  └────────────┘ └──────────┘ └───────────────┘  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │ cirrus-azure  │
//!           └───────────────┘
//! ```

pub mod action;
pub mod diff;
pub mod error;
pub mod registry;
pub mod resource;
pub mod schema;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary, plan_change};
pub use diff::{Diff, SubResource, SubResourceChanges, diff_subresources};
pub use error::{CloudError, Result};
pub use registry::{DynFinder, DynResource, ResourceRegistry, parse_config};
pub use resource::{Finder, Resource};
pub use schema::{Field, FieldKind};
