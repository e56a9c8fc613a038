use std::collections::HashMap;

use super::data;
use crate::blueprint::Blueprint;
use crate::engine::{Arg, Handle};
use crate::error::CatalogError;

/// Default edge length of a chunk.
pub const CHUNK: usize = 1000;

/// A dense, row-major chunk of a matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Block {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn transpose(&self) -> Block {
        let mut data = Vec::with_capacity(self.data.len());
        for col in 0..self.cols {
            for row in 0..self.rows {
                data.push(self.get(row, col));
            }
        }

        Block {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }
}

/// Chunked array arithmetic: `sum(mean((x + x.T)[::2, size/2:], axis=1))`
/// for a random `size` by `size` matrix `x` split into `chunk` sized blocks.
///
/// Only the blocks needed for the right half of the result are materialized.
pub fn array(bp: &mut Blueprint, size: usize, chunk: usize) -> Result<Handle<f64>, CatalogError> {
    if size == 0 || chunk == 0 {
        return Err(CatalogError::Parameter {
            workload: "numpy",
            reason: format!("cannot chunk a {size}x{size} array into blocks of {chunk}"),
        });
    }

    let blocks = size.div_ceil(chunk);
    let extent = |i: usize| chunk.min(size - i * chunk);
    let half = size / 2;

    let mut random: HashMap<(usize, usize), Handle<Block>> = HashMap::new();
    let mut x = |bp: &mut Blueprint, i: usize, j: usize| -> Result<Handle<Block>, CatalogError> {
        if let Some(handle) = random.get(&(i, j)) {
            return Ok(*handle);
        }

        let handle = bp.defer(
            "random_sample",
            [
                Arg::literal(i),
                Arg::literal(j),
                Arg::literal(extent(i)),
                Arg::literal(extent(j)),
            ],
            |args| {
                let (i, j) = (*args.get::<usize>(0)?, *args.get::<usize>(1)?);
                let (rows, cols) = (*args.get::<usize>(2)?, *args.get::<usize>(3)?);
                Ok(Block {
                    rows,
                    cols,
                    data: data::block(data::SEED, i, j, rows, cols),
                })
            },
        )?;

        random.insert((i, j), handle);
        Ok(handle)
    };

    // Column blocks that overlap `half..size`.
    let columns: Vec<usize> = (0..blocks)
        .filter(|&j| j * chunk + extent(j) > half)
        .collect();

    let mut row_means = Vec::with_capacity(blocks);
    for i in 0..blocks {
        let mut slices = Vec::with_capacity(columns.len());

        for &j in &columns {
            let left = x(bp, i, j)?;
            let mirrored = x(bp, j, i)?;

            let transposed = bp
                .task()
                .name("transpose")
                .depends_on(mirrored)
                .run(|block| Ok(block.transpose()))?;

            let sum = bp
                .task()
                .name("add")
                .depends_on((left, transposed))
                .run(|(a, b)| {
                    let data = a.data.iter().zip(&b.data).map(|(a, b)| a + b).collect();
                    Ok(Block {
                        rows: a.rows,
                        cols: a.cols,
                        data,
                    })
                })?;

            let (row0, col0) = (i * chunk, j * chunk);
            let slice = bp
                .task()
                .name("getitem")
                .depends_on(sum)
                .run(move |block| {
                    let rows: Vec<usize> = (0..block.rows).filter(|r| (row0 + r) % 2 == 0).collect();
                    let cols: Vec<usize> = (0..block.cols).filter(|c| col0 + c >= half).collect();

                    let mut data = Vec::with_capacity(rows.len() * cols.len());
                    for &r in &rows {
                        for &c in &cols {
                            data.push(block.get(r, c));
                        }
                    }

                    Ok(Block {
                        rows: rows.len(),
                        cols: cols.len(),
                        data,
                    })
                })?;

            slices.push(slice);
        }

        let width = size - half;
        let means = bp
            .task()
            .name("mean")
            .depends_on(slices)
            .run(move |slices| {
                let rows = slices.first().map(|block| block.rows).unwrap_or(0);
                let means = (0..rows)
                    .map(|r| {
                        let total: f64 = slices
                            .iter()
                            .map(|block| (0..block.cols).map(|c| block.get(r, c)).sum::<f64>())
                            .sum();
                        total / width as f64
                    })
                    .collect::<Vec<f64>>();
                Ok(means)
            })?;

        row_means.push(means);
    }

    let total = bp
        .task()
        .name("sum")
        .depends_on(row_means)
        .run(|means| Ok(means.iter().flat_map(|m| m.iter()).sum::<f64>()))?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;

    #[test]
    fn test_transpose() {
        let block = Block {
            rows: 2,
            cols: 3,
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };

        let t = block.transpose();
        assert_eq!((t.rows, t.cols), (3, 2));
        assert_eq!(t.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(t.transpose(), block);
    }

    #[test]
    fn test_array_structure() {
        let mut bp = Blueprint::new();
        array(&mut bp, 4, 2).unwrap();

        let report = bp.finish().metrics();
        assert_eq!(report.vertices, 12);
        assert_eq!(report.edges, 12);
        // random_sample -> transpose -> add -> getitem -> mean -> sum
        assert_eq!(report.critical_path_length, 5);
    }

    #[test]
    fn test_array_value() {
        let (size, chunk) = (6, 4);

        let mut bp = Blueprint::new();
        let total = array(&mut bp, size, chunk).unwrap();

        let graph = bp.finish();
        let output = graph.run([total], &RunConfig::default()).unwrap();
        let result = *output.value(total).unwrap().unwrap();

        // Assemble the full matrix from the same blocks.
        let extent = |i: usize| chunk.min(size - i * chunk);
        let mut x = vec![vec![0.0; size]; size];
        for bi in 0..2 {
            for bj in 0..2 {
                let data = data::block(data::SEED, bi, bj, extent(bi), extent(bj));
                for r in 0..extent(bi) {
                    for c in 0..extent(bj) {
                        x[bi * chunk + r][bj * chunk + c] = data[r * extent(bj) + c];
                    }
                }
            }
        }

        let half = size / 2;
        let expected: f64 = (0..size)
            .step_by(2)
            .map(|r| (half..size).map(|c| x[r][c] + x[c][r]).sum::<f64>() / (size - half) as f64)
            .sum();

        assert!((result - expected).abs() < 1e-9, "{result} != {expected}");
    }

    #[test]
    fn test_zero_chunk_is_rejected() {
        let mut bp = Blueprint::new();
        assert!(array(&mut bp, 10, 0).is_err());
    }
}
