use std::fs;
use std::time::Instant;

use anyhow::Context;
use console::style;
use dagbench::{Catalog, export, utils};

fn main() -> anyhow::Result<()> {
    utils::init_logging()?;

    let s = Instant::now();
    fs::create_dir_all("graphs").context("Failed to create the graphs directory")?;

    let mut reports = Vec::new();

    for workload in Catalog::default().build()? {
        let report = workload.report();
        let path = format!("graphs/{}.dot", workload.name);

        fs::write(&path, export::to_dot(&workload.graph.export(), None))
            .with_context(|| format!("Failed to write {path}"))?;

        println!("{report}");
        reports.push(report);
    }

    let json = serde_json::to_string_pretty(&reports)?;
    fs::write("graphs/metrics.json", json).context("Failed to write graphs/metrics.json")?;

    eprintln!(
        "{} {}",
        style(format!("Wrote {} graphs to graphs/", reports.len())).green(),
        utils::as_overhead(s)
    );

    Ok(())
}
