//! Named, parameterized graph recipes.
//!
//! Every recipe builds its graph exclusively through a [`Blueprint`] and
//! returns the handle of its result. A [`Workload`] names one recipe together
//! with its parameters, using names like `tree-8` or
//! `pandas-groupby-1-1T-1H`, and a [`Catalog`] is an ordered list of them.

mod array;
mod bag;
pub mod data;
mod freq;
mod groupby;
mod join;
mod merge;
mod tree;

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::error::CatalogError;
use crate::graph::TaskGraph;
use crate::metrics::NamedReport;
use crate::types::NodeRef;

pub use array::{Block, CHUNK, array};
pub use bag::bag;
pub use freq::{Frequency, Unit};
pub use groupby::groupby;
pub use join::join;
pub use merge::{merge, merge_slow};
pub use tree::tree;

const DAY: u64 = 86_400_000;

/// Splits `days` worth of time into `[start, end)` millisecond ranges of
/// `partition_freq` each; the last one may be shorter.
pub(crate) fn partition_bounds(
    workload: &'static str,
    days: u32,
    freq: Frequency,
    partition_freq: Frequency,
) -> Result<Vec<(u64, u64)>, CatalogError> {
    let invalid = |reason: String| CatalogError::Parameter { workload, reason };

    if days == 0 {
        return Err(invalid("the series must span at least one day".into()));
    }
    if freq.as_millis() == 0 {
        return Err(invalid(format!("frequency {freq} is empty")));
    }
    if partition_freq.as_millis() < freq.as_millis() {
        return Err(invalid(format!(
            "partition frequency {partition_freq} is shorter than frequency {freq}"
        )));
    }

    let end = u64::from(days) * DAY;
    let step = partition_freq.as_millis();

    Ok((0..end)
        .step_by(step as usize)
        .map(|start| (start, (start + step).min(end)))
        .collect())
}

/// One recipe with concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Workload {
    /// `pandas-groupby-{days}-{freq}-{partition_freq}`
    PandasGroupby {
        days: u32,
        freq: Frequency,
        partition_freq: Frequency,
    },
    /// `pandas-join-{days}-{freq}-{partition_freq}`
    PandasJoin {
        days: u32,
        freq: Frequency,
        partition_freq: Frequency,
    },
    /// `bag-{count}`
    Bag { count: usize },
    /// `merge-{count}`
    Merge { count: usize },
    /// `merge-slow-{count}-{delay}`
    MergeSlow { count: usize, delay: Frequency },
    /// `numpy-{size}`, or `numpy-{size}-{chunk}` for a chunk other than
    /// [`CHUNK`].
    Numpy { size: usize, chunk: usize },
    /// `tree-{exp}`
    Tree { exp: u32 },
}

impl Workload {
    /// Adds the recipe to `bp` and returns its terminal nodes.
    pub fn build(&self, bp: &mut Blueprint) -> Result<Vec<NodeRef>, CatalogError> {
        let terminal = match *self {
            Workload::PandasGroupby {
                days,
                freq,
                partition_freq,
            } => groupby(bp, days, freq, partition_freq)?.node(),
            Workload::PandasJoin {
                days,
                freq,
                partition_freq,
            } => join(bp, days, freq, partition_freq)?.node(),
            Workload::Bag { count } => bag(bp, count)?.node(),
            Workload::Merge { count } => merge(bp, count)?.node(),
            Workload::MergeSlow { count, delay } => merge_slow(bp, count, delay.duration())?.node(),
            Workload::Numpy { size, chunk } => array(bp, size, chunk)?.node(),
            Workload::Tree { exp } => tree(bp, exp)?.node(),
        };

        Ok(vec![terminal])
    }

    /// Builds the recipe into a fresh graph.
    pub fn graph(&self) -> Result<BuiltWorkload, CatalogError> {
        let mut bp = Blueprint::new();
        let terminals = self.build(&mut bp)?;

        Ok(BuiltWorkload {
            name: self.to_string(),
            graph: bp.finish(),
            terminals,
        })
    }
}

impl Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workload::PandasGroupby {
                days,
                freq,
                partition_freq,
            } => write!(f, "pandas-groupby-{days}-{freq}-{partition_freq}"),
            Workload::PandasJoin {
                days,
                freq,
                partition_freq,
            } => write!(f, "pandas-join-{days}-{freq}-{partition_freq}"),
            Workload::Bag { count } => write!(f, "bag-{count}"),
            Workload::Merge { count } => write!(f, "merge-{count}"),
            Workload::MergeSlow { count, delay } => write!(f, "merge-slow-{count}-{delay}"),
            Workload::Numpy { size, chunk } if *chunk == CHUNK => write!(f, "numpy-{size}"),
            Workload::Numpy { size, chunk } => write!(f, "numpy-{size}-{chunk}"),
            Workload::Tree { exp } => write!(f, "tree-{exp}"),
        }
    }
}

impl FromStr for Workload {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || CatalogError::UnknownWorkload(s.to_string());

        fn number<T: FromStr>(part: &str, s: &str) -> Result<T, CatalogError> {
            part.parse()
                .map_err(|_| CatalogError::UnknownWorkload(s.to_string()))
        }

        let parts: Vec<&str> = s.split('-').collect();

        let workload = match parts.as_slice() {
            ["pandas", "groupby", days, freq, partition_freq] => Workload::PandasGroupby {
                days: number(days, s)?,
                freq: freq.parse()?,
                partition_freq: partition_freq.parse()?,
            },
            ["pandas", "join", days, freq, partition_freq] => Workload::PandasJoin {
                days: number(days, s)?,
                freq: freq.parse()?,
                partition_freq: partition_freq.parse()?,
            },
            ["bag", count] => Workload::Bag {
                count: number(count, s)?,
            },
            ["merge", "slow", count, delay] => Workload::MergeSlow {
                count: number(count, s)?,
                delay: delay.parse()?,
            },
            ["merge", count] => Workload::Merge {
                count: number(count, s)?,
            },
            ["numpy", size] => Workload::Numpy {
                size: number(size, s)?,
                chunk: CHUNK,
            },
            ["numpy", size, chunk] => Workload::Numpy {
                size: number(size, s)?,
                chunk: number(chunk, s)?,
            },
            ["tree", exp] => Workload::Tree {
                exp: number(exp, s)?,
            },
            _ => return Err(unknown()),
        };

        Ok(workload)
    }
}

impl TryFrom<String> for Workload {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Workload> for String {
    fn from(value: Workload) -> Self {
        value.to_string()
    }
}

/// A recipe built into its own graph.
#[derive(Debug)]
pub struct BuiltWorkload {
    pub name: String,
    pub graph: TaskGraph,
    pub terminals: Vec<NodeRef>,
}

impl BuiltWorkload {
    pub fn report(&self) -> NamedReport {
        NamedReport {
            name: self.name.clone(),
            report: self.graph.metrics(),
        }
    }
}

/// An ordered list of workloads.
///
/// ```rust
/// let catalog: dagbench::Catalog =
///     serde_json::from_str(r#"{"workloads": ["tree-3", "merge-5"]}"#).unwrap();
/// assert_eq!(catalog.workloads().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    workloads: Vec<Workload>,
}

impl Catalog {
    pub fn new(workloads: impl IntoIterator<Item = Workload>) -> Self {
        Self {
            workloads: workloads.into_iter().collect(),
        }
    }

    /// Parses every name into a workload.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, CatalogError> {
        let workloads = names
            .into_iter()
            .map(str::parse)
            .collect::<Result<_, _>>()?;

        Ok(Self { workloads })
    }

    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    /// Builds every workload into its own graph, in order.
    pub fn build(&self) -> Result<Vec<BuiltWorkload>, CatalogError> {
        self.workloads.iter().map(Workload::graph).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let minute = Frequency::new(1, Unit::Minutes);
        let hours = |count| Frequency::new(count, Unit::Hours);

        Self::new([
            Workload::PandasGroupby {
                days: 1,
                freq: minute,
                partition_freq: hours(1),
            },
            Workload::PandasGroupby {
                days: 1,
                freq: minute,
                partition_freq: hours(8),
            },
            Workload::PandasJoin {
                days: 1,
                freq: minute,
                partition_freq: hours(1),
            },
            Workload::PandasJoin {
                days: 1,
                freq: minute,
                partition_freq: hours(8),
            },
            Workload::Bag { count: 1000 },
            Workload::Merge { count: 1000 },
            Workload::Numpy {
                size: 2000,
                chunk: CHUNK,
            },
            Workload::Tree { exp: 8 },
        ])
    }
}
