//! Synthetic, reproducible input data for the workloads.
//!
//! Every generator draws from its own ChaCha stream derived from a seed and
//! the position of the partition, so a partition always contains the same
//! data no matter which worker produces it or when.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used by every recipe in the catalog.
pub const SEED: u64 = 0;

const NAMES: [&str; 26] = [
    "Alice", "Bob", "Charlie", "Dan", "Edith", "Frank", "George", "Hannah", "Ingrid", "Jerry",
    "Kevin", "Laura", "Michael", "Norbert", "Oliver", "Patricia", "Quinn", "Ray", "Sarah", "Tim",
    "Ursula", "Victor", "Wendy", "Xavier", "Yvonne", "Zelda",
];

const OCCUPATIONS: [&str; 16] = [
    "Accountant", "Baker", "Carpenter", "Dentist", "Electrician", "Farmer", "Gardener", "Historian",
    "Illustrator", "Journalist", "Librarian", "Mechanic", "Nurse", "Pilot", "Surveyor", "Teacher",
];

/// One row of a synthetic time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Milliseconds since the start of the series.
    pub timestamp: u64,
    pub name: &'static str,
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

/// One partition of a time series.
pub type Frame = Vec<Record>;

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub age: u32,
    pub occupation: &'static str,
}

fn rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Rows with timestamps `start, start + step, ..` strictly below `end`.
pub fn timeseries(seed: u64, partition: usize, start: u64, end: u64, step: u64) -> Frame {
    let mut rng = rng(seed, partition as u64);
    let step = step.max(1);

    (start..end)
        .step_by(step as usize)
        .map(|timestamp| Record {
            timestamp,
            name: NAMES[rng.gen_range(0..NAMES.len())],
            id: rng.gen_range(50..150),
            x: rng.gen_range(-1.0..1.0),
            y: rng.gen_range(-1.0..1.0),
        })
        .collect()
}

pub fn people(seed: u64, partition: usize, count: usize) -> Vec<Person> {
    let mut rng = rng(seed, partition as u64);

    (0..count)
        .map(|_| Person {
            age: rng.gen_range(18..80),
            occupation: OCCUPATIONS[rng.gen_range(0..OCCUPATIONS.len())],
        })
        .collect()
}

/// Row-major block `(i, j)` of a matrix of uniform values in `[0, 1)`.
pub fn block(seed: u64, i: usize, j: usize, rows: usize, cols: usize) -> Vec<f64> {
    let mut rng = rng(seed, ((i as u64) << 32) | j as u64);
    (0..rows * cols).map(|_| rng.r#gen::<f64>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_are_reproducible() {
        assert_eq!(timeseries(SEED, 3, 0, 10_000, 1_000), timeseries(SEED, 3, 0, 10_000, 1_000));
        assert_ne!(timeseries(SEED, 3, 0, 10_000, 1_000), timeseries(SEED, 4, 0, 10_000, 1_000));
        assert_eq!(people(SEED, 1, 20), people(SEED, 1, 20));
        assert_eq!(block(SEED, 1, 2, 3, 3), block(SEED, 1, 2, 3, 3));
        assert_ne!(block(SEED, 1, 2, 3, 3), block(SEED, 2, 1, 3, 3));
    }

    #[test]
    fn test_timeseries_bounds() {
        let frame = timeseries(SEED, 0, 60_000, 120_000, 1_000);
        assert_eq!(frame.len(), 60);
        assert_eq!(frame.first().unwrap().timestamp, 60_000);
        assert_eq!(frame.last().unwrap().timestamp, 119_000);
        assert!(frame.iter().all(|r| (-1.0..1.0).contains(&r.x)));
    }

    #[test]
    fn test_block_shape() {
        let data = block(SEED, 0, 0, 4, 5);
        assert_eq!(data.len(), 20);
        assert!(data.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
