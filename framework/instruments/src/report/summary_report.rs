mod tables;

use crate::metrics::MetricsSnapshot;
use crate::report::summary_report::tables::{CounterRow, DistributionRow, ThresholdRow};
use crate::threshold::ThresholdReport;
use tabled::settings::Style;
use tabled::Table;

/// Print the end of run summary: counters, distributions and threshold results.
pub fn print_summary(snapshot: &MetricsSnapshot, thresholds: &ThresholdReport) {
    let counters = snapshot
        .counters()
        .map(|(name, counter)| CounterRow {
            metric: name.to_string(),
            passes: counter.passes,
            fails: counter.fails,
            fail_rate: counter.fail_rate(),
        })
        .collect::<Vec<_>>();

    if !counters.is_empty() {
        println!("\nChecks and counters");
        let mut table = Table::new(&counters);
        table.with(Style::modern());
        println!("{table}");
    }

    let distributions = snapshot
        .distributions()
        .filter_map(|(name, distribution)| {
            distribution
                .stats()
                .map(|stats| DistributionRow::new(name, stats))
        })
        .collect::<Vec<_>>();

    if !distributions.is_empty() {
        println!("\nDistributions (ms)");
        let mut table = Table::new(&distributions);
        table.with(Style::modern());
        println!("{table}");
    }

    if !thresholds.outcomes.is_empty() {
        println!("\nThresholds");
        let rows = thresholds
            .outcomes
            .iter()
            .map(ThresholdRow::from)
            .collect::<Vec<_>>();
        let mut table = Table::new(&rows);
        table.with(Style::modern());
        println!("{table}");

        println!(
            "\nOverall: {}",
            if thresholds.passed() { "PASSED" } else { "FAILED" }
        );
    }
}
