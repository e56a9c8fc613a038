use std::collections::BTreeMap;

use crate::blueprint::Blueprint;
use crate::catalog::data::{self, Person};
use crate::engine::{Arg, Handle};
use crate::error::CatalogError;

pub const PARTITIONS: usize = 10;
const TOP: usize = 10;

type Frequencies = BTreeMap<&'static str, u64>;

/// Occupation statistics over a bag of synthetic people.
///
/// Every one of the [`PARTITIONS`] partitions holds `count` records and goes
/// through `filter (age > 30) -> map (occupation) -> frequencies`. The partial
/// frequencies are combined, the ten most common occupations kept, their
/// counts plucked and summed.
pub fn bag(bp: &mut Blueprint, count: usize) -> Result<Handle<u64>, CatalogError> {
    if count == 0 {
        return Err(CatalogError::Parameter {
            workload: "bag",
            reason: "partitions must hold at least one record".into(),
        });
    }

    let mut partials = Vec::with_capacity(PARTITIONS);

    for partition in 0..PARTITIONS {
        let people = bp.defer(
            "make_people",
            [Arg::literal(partition), Arg::literal(count)],
            |args| {
                let partition = *args.get::<usize>(0)?;
                let count = *args.get::<usize>(1)?;
                Ok(data::people(data::SEED, partition, count))
            },
        )?;

        let adults = bp
            .task()
            .name("filter")
            .depends_on(people)
            .run(|people| {
                Ok(people
                    .iter()
                    .filter(|person| person.age > 30)
                    .cloned()
                    .collect::<Vec<Person>>())
            })?;

        let occupations = bp
            .task()
            .name("map")
            .depends_on(adults)
            .run(|adults| {
                Ok(adults
                    .iter()
                    .map(|person| person.occupation)
                    .collect::<Vec<&'static str>>())
            })?;

        let partial = bp
            .task()
            .name("frequencies-partial")
            .depends_on(occupations)
            .run(|occupations| {
                let mut freq = Frequencies::new();
                for occupation in occupations {
                    *freq.entry(*occupation).or_default() += 1;
                }
                Ok(freq)
            })?;

        partials.push(partial);
    }

    let combined = bp
        .task()
        .name("frequencies")
        .depends_on(partials)
        .run(|partials| {
            let mut total = Frequencies::new();
            for partial in partials {
                for (occupation, count) in partial {
                    *total.entry(*occupation).or_default() += count;
                }
            }

            let mut sorted: Vec<(&'static str, u64)> = total.into_iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            Ok(sorted)
        })?;

    let top = bp
        .task()
        .name("topk")
        .depends_on(combined)
        .run(|sorted| Ok(sorted.iter().take(TOP).copied().collect::<Vec<_>>()))?;

    let counts = bp
        .task()
        .name("pluck")
        .depends_on(top)
        .run(|top| Ok(top.iter().map(|(_, count)| *count).collect::<Vec<u64>>()))?;

    let total = bp
        .task()
        .name("sum")
        .depends_on(counts)
        .run(|counts| Ok(counts.iter().sum::<u64>()))?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;

    #[test]
    fn test_bag_structure() {
        let mut bp = Blueprint::new();
        bag(&mut bp, 100).unwrap();

        let report = bp.finish().metrics();
        assert_eq!(report.vertices, PARTITIONS * 4 + 4);
        assert_eq!(report.edges, PARTITIONS * 4 + 3);
        // make_people -> filter -> map -> partial -> frequencies -> topk -> pluck -> sum
        assert_eq!(report.critical_path_length, 7);
    }

    #[test]
    fn test_bag_counts_adults() {
        let mut bp = Blueprint::new();
        let total = bag(&mut bp, 200).unwrap();

        let graph = bp.finish();
        let output = graph.run([total], &RunConfig::default()).unwrap();

        let adults: u64 = (0..PARTITIONS)
            .map(|p| {
                data::people(data::SEED, p, 200)
                    .iter()
                    .filter(|person| person.age > 30)
                    .count() as u64
            })
            .sum();

        // Sixteen occupations but only the ten most common are summed.
        let sum = *output.value(total).unwrap().unwrap();
        assert!(sum > 0);
        assert!(sum <= adults);
    }
}
