#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
pub mod catalog;
mod config;
mod engine;
mod error;
mod executor;
pub mod export;
mod graph;
pub mod metrics;
mod types;
pub mod utils;

pub use crate::blueprint::{Blueprint, TaskBinder, TaskDef};
pub use crate::catalog::{BuiltWorkload, Catalog, Workload};
pub use crate::config::{FailurePolicy, RunConfig};
pub use crate::engine::{Arg, Dependencies, Handle, TaskNode};
pub use crate::error::*;
pub use crate::executor::{Diagnostics, NodeResult, RunOutput, TaskExecution, run};
pub use crate::graph::{ExportNode, GraphExport, TaskGraph};
pub use crate::metrics::{MetricsReport, NamedReport, Target};
pub use crate::types::{Args, GraphId, NodeRef, Value, value};
