use std::time::Duration;

use crate::blueprint::Blueprint;
use crate::engine::{Arg, Handle};
use crate::error::CatalogError;

fn check_count(workload: &'static str, count: usize) -> Result<(), CatalogError> {
    if count == 0 {
        return Err(CatalogError::Parameter {
            workload,
            reason: "needs at least one leaf".into(),
        });
    }
    Ok(())
}

/// `count` independent leaves `x * 10` for `x` in `0..count`, merged by a
/// single fan-in sum.
pub fn merge(bp: &mut Blueprint, count: usize) -> Result<Handle<u64>, CatalogError> {
    check_count("merge", count)?;

    let leaves = (0..count as u64)
        .map(|x| {
            bp.defer("do_something", [Arg::literal(x)], |args| {
                Ok(args.get::<u64>(0)? * 10)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = bp
        .task()
        .name("merge")
        .depends_on(leaves)
        .run(|xs| Ok(xs.into_iter().sum::<u64>()))?;

    Ok(total)
}

/// Like [`merge`], but every leaf sleeps for `delay` and yields the slept
/// time in seconds.
pub fn merge_slow(
    bp: &mut Blueprint,
    count: usize,
    delay: Duration,
) -> Result<Handle<f64>, CatalogError> {
    check_count("merge-slow", count)?;

    let leaves = (0..count)
        .map(|_| {
            bp.defer("sleep", [Arg::literal(delay)], |args| {
                let delay = args.get::<Duration>(0)?;
                std::thread::sleep(*delay);
                Ok(delay.as_secs_f64())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = bp
        .task()
        .name("merge")
        .depends_on(leaves)
        .run(|xs| Ok(xs.into_iter().sum::<f64>()))?;

    Ok(total)
}
