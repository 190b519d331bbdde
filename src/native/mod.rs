//! Native Runtime Module
//!
//! The parts of the native module system the layer tree talks to:
//! - `NativeModule` contract and the flattened parameter traversal
//! - State dict save/load over that traversal

pub mod module;
pub mod state_dict;

pub use module::{named_parameters, qualify, ForeignModule, NativeModule};
pub use state_dict::{LoadReport, StateDict, StateEntry, StateFile};
