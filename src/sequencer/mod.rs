//! # Topological Sequencer
//!
//! Safe execution orders over the dependency graph: generic Kahn ordering
//! with cycle grouping, the coarse layered mode, and the chain mode for
//! view-style families.

pub mod chain;
pub mod layers;
pub mod topo;

pub use chain::{order_chain, order_view_chain};
pub use layers::{assign_layers, plan_layers, Layer, LayerPlan, PlannedLayer};
pub use topo::{order, SequenceResult};
