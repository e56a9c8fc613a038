use std::collections::BTreeMap;

use super::data::{self, Frame};
use super::freq::Frequency;
use super::partition_bounds;
use crate::blueprint::Blueprint;
use crate::engine::{Arg, Handle};
use crate::error::CatalogError;

/// Width of the resampling buckets, in milliseconds.
const RESAMPLE: u64 = 2_000;

/// Running `(sum, count)` per key.
type Partial<K> = BTreeMap<K, (f64, u64)>;

/// Adds one synthetic time series partition to the graph.
pub(crate) fn make_timeseries(
    bp: &mut Blueprint,
    partition: usize,
    (start, end): (u64, u64),
    freq: Frequency,
) -> Result<Handle<Frame>, CatalogError> {
    let handle = bp.defer(
        "make_timeseries",
        [
            Arg::literal(partition),
            Arg::literal(start),
            Arg::literal(end),
            Arg::literal(freq.as_millis()),
        ],
        |args| {
            Ok(data::timeseries(
                data::SEED,
                *args.get::<usize>(0)?,
                *args.get::<u64>(1)?,
                *args.get::<u64>(2)?,
                *args.get::<u64>(3)?,
            ))
        },
    )?;

    Ok(handle)
}

fn accumulate<K: Ord + Copy>(into: &mut Partial<K>, from: &Partial<K>) {
    for (key, (sum, count)) in from {
        let entry = into.entry(*key).or_default();
        entry.0 += sum;
        entry.1 += count;
    }
}

fn sum_of_means<K>(partial: &Partial<K>) -> f64 {
    partial
        .values()
        .map(|(sum, count)| sum / *count as f64)
        .sum()
}

/// Grouped statistics over a partitioned time series.
///
/// Computes `mean(x) grouped by name` summed over the names, plus the
/// two-second resample of `x` over the rows with `x > 0 && y < 0`, again
/// averaged per bucket and summed. Each partition contributes partial sums
/// which are combined in a single fan-in node per statistic.
pub fn groupby(
    bp: &mut Blueprint,
    days: u32,
    freq: Frequency,
    partition_freq: Frequency,
) -> Result<Handle<f64>, CatalogError> {
    let bounds = partition_bounds("pandas-groupby", days, freq, partition_freq)?;

    let mut groups = Vec::with_capacity(bounds.len());
    let mut buckets = Vec::with_capacity(bounds.len());

    for (partition, bound) in bounds.into_iter().enumerate() {
        let frame = make_timeseries(bp, partition, bound, freq)?;

        let group = bp
            .task()
            .name("groupby-partial")
            .depends_on(frame)
            .run(|frame| {
                let mut partial = Partial::<&'static str>::new();
                for record in frame {
                    let entry = partial.entry(record.name).or_default();
                    entry.0 += record.x;
                    entry.1 += 1;
                }
                Ok(partial)
            })?;

        let filtered = bp
            .task()
            .name("filter")
            .depends_on(frame)
            .run(|frame| {
                Ok(frame
                    .iter()
                    .filter(|record| record.x > 0.0 && record.y < 0.0)
                    .cloned()
                    .collect::<Frame>())
            })?;

        let bucket = bp
            .task()
            .name("resample-partial")
            .depends_on(filtered)
            .run(|frame| {
                let mut partial = Partial::<u64>::new();
                for record in frame {
                    let entry = partial.entry(record.timestamp / RESAMPLE).or_default();
                    entry.0 += record.x;
                    entry.1 += 1;
                }
                Ok(partial)
            })?;

        groups.push(group);
        buckets.push(bucket);
    }

    let grouped = bp
        .task()
        .name("groupby-combine")
        .depends_on(groups)
        .run(|partials| {
            let mut total = Partial::new();
            for partial in partials {
                accumulate(&mut total, partial);
            }
            Ok(total)
        })?;

    let m = bp
        .task()
        .name("sum")
        .depends_on(grouped)
        .run(|grouped| Ok(sum_of_means(grouped)))?;

    let resampled = bp
        .task()
        .name("resample-combine")
        .depends_on(buckets)
        .run(|partials| {
            let mut total = Partial::new();
            for partial in partials {
                accumulate(&mut total, partial);
            }
            Ok(total)
        })?;

    let s = bp
        .task()
        .name("sum")
        .depends_on(resampled)
        .run(|resampled| Ok(sum_of_means(resampled)))?;

    let total = bp
        .task()
        .name("add")
        .depends_on((m, s))
        .run(|(m, s)| Ok(m + s))?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;

    fn freq(s: &str) -> Frequency {
        s.parse().unwrap()
    }

    #[test]
    fn test_groupby_structure() {
        let mut bp = Blueprint::new();
        groupby(&mut bp, 1, freq("1T"), freq("8H")).unwrap();

        let report = bp.finish().metrics();
        assert_eq!(report.vertices, 3 * 4 + 5);
        assert_eq!(report.edges, 3 * 5 + 4);
        // make_timeseries -> filter -> resample-partial -> resample-combine -> sum -> add
        assert_eq!(report.critical_path_length, 5);
    }

    #[test]
    fn test_groupby_value() {
        let mut bp = Blueprint::new();
        let total = groupby(&mut bp, 1, freq("1T"), freq("6H")).unwrap();

        let graph = bp.finish();
        let output = graph.run([total], &RunConfig::default()).unwrap();
        let result = *output.value(total).unwrap().unwrap();

        let rows: Frame = (0..4u64)
            .flat_map(|p| data::timeseries(data::SEED, p as usize, p * 21_600_000, (p + 1) * 21_600_000, 60_000))
            .collect();
        assert_eq!(rows.len(), 1440);

        let mut names = Partial::new();
        let mut buckets = Partial::new();
        for record in &rows {
            let entry: &mut (f64, u64) = names.entry(record.name).or_default();
            entry.0 += record.x;
            entry.1 += 1;

            if record.x > 0.0 && record.y < 0.0 {
                let entry: &mut (f64, u64) = buckets.entry(record.timestamp / RESAMPLE).or_default();
                entry.0 += record.x;
                entry.1 += 1;
            }
        }

        let expected = sum_of_means(&names) + sum_of_means(&buckets);
        assert!((result - expected).abs() < 1e-9, "{result} != {expected}");
    }

    #[test]
    fn test_partition_shorter_than_frequency() {
        let mut bp = Blueprint::new();
        assert!(matches!(
            groupby(&mut bp, 1, freq("1H"), freq("1T")),
            Err(CatalogError::Parameter { workload: "pandas-groupby", .. })
        ));
    }
}
