use std::collections::BTreeMap;

use super::data::Frame;
use super::freq::Frequency;
use super::groupby::make_timeseries;
use super::partition_bounds;
use crate::blueprint::Blueprint;
use crate::engine::{Arg, Handle};
use crate::error::CatalogError;

/// Inner self-join of a partitioned time series on `id`, summing the left
/// `x` column of the joined rows.
///
/// The join is a shuffle: every partition is split into one bucket per
/// output partition by `id`, each output partition gathers its bucket from
/// every split (an all-to-all fan-in), joins it locally and sums it. A last
/// node adds up the per-bucket sums.
pub fn join(
    bp: &mut Blueprint,
    days: u32,
    freq: Frequency,
    partition_freq: Frequency,
) -> Result<Handle<f64>, CatalogError> {
    let bounds = partition_bounds("pandas-join", days, freq, partition_freq)?;
    let buckets = bounds.len();

    let mut splits = Vec::with_capacity(buckets);
    for (partition, bound) in bounds.into_iter().enumerate() {
        let frame = make_timeseries(bp, partition, bound, freq)?;

        let split = bp.defer("hash-split", [frame.into(), Arg::literal(buckets)], |args| {
            let frame = args.get::<Frame>(0)?;
            let buckets = *args.get::<usize>(1)?;

            let mut split = vec![Frame::new(); buckets];
            for record in frame {
                split[record.id as usize % buckets].push(record.clone());
            }
            Ok(split)
        })?;

        splits.push(split);
    }

    let mut sums = Vec::with_capacity(buckets);
    for bucket in 0..buckets {
        let gathered = bp.defer(
            "shuffle",
            std::iter::once(Arg::literal(bucket)).chain(splits.iter().map(Arg::from)),
            |args| {
                let bucket = *args.get::<usize>(0)?;
                let mut frame = Frame::new();
                for position in 1..args.len() {
                    let split = args.get::<Vec<Frame>>(position)?;
                    frame.extend(split[bucket].iter().cloned());
                }
                Ok(frame)
            },
        )?;

        let joined = bp
            .task()
            .name("merge")
            .depends_on(gathered)
            .run(|frame| {
                let mut by_id: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
                for record in frame {
                    by_id.entry(record.id).or_default().push(record.x);
                }

                // Every left row pairs with every right row of the same id.
                let mut value_x = Vec::new();
                for xs in by_id.values() {
                    for x in xs {
                        value_x.extend(std::iter::repeat_n(*x, xs.len()));
                    }
                }
                Ok(value_x)
            })?;

        let sum = bp
            .task()
            .name("sum")
            .depends_on(joined)
            .run(|values| Ok(values.iter().sum::<f64>()))?;

        sums.push(sum);
    }

    let total = bp
        .task()
        .name("sum-aggregate")
        .depends_on(sums)
        .run(|sums| Ok(sums.into_iter().sum::<f64>()))?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;
    use crate::catalog::data;

    fn freq(s: &str) -> Frequency {
        s.parse().unwrap()
    }

    #[test]
    fn test_join_structure() {
        let mut bp = Blueprint::new();
        join(&mut bp, 1, freq("1T"), freq("8H")).unwrap();

        let n = 3;
        let report = bp.finish().metrics();
        assert_eq!(report.vertices, 5 * n + 1);
        assert_eq!(report.edges, n * n + 4 * n);
        assert_eq!(report.critical_path_length, 5);
    }

    #[test]
    fn test_join_value() {
        let mut bp = Blueprint::new();
        let total = join(&mut bp, 1, freq("2T"), freq("12H")).unwrap();

        let graph = bp.finish();
        let output = graph.run([total], &RunConfig::default()).unwrap();
        let result = *output.value(total).unwrap().unwrap();

        let half_day = 43_200_000;
        let rows: Frame = (0..2u64)
            .flat_map(|p| data::timeseries(data::SEED, p as usize, p * half_day, (p + 1) * half_day, 120_000))
            .collect();

        let mut by_id: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for record in &rows {
            let entry = by_id.entry(record.id).or_default();
            entry.0 += record.x;
            entry.1 += 1;
        }
        let expected: f64 = by_id.values().map(|(sum, count)| sum * *count as f64).sum();

        assert!((result - expected).abs() < 1e-6, "{result} != {expected}");
    }
}
