use crate::{checks::CheckLabels, metrics::RunStats, thresholds::MetricVerdict};
use colored::{ColoredString, Colorize};
use term_table::{row, row::Row, table_cell::*, Table, TableStyle};

/// Renders the end-of-run verdict: a per-scenario breakdown and one row per
/// threshold assertion. Metrics that saw no samples show "no data" instead
/// of a number so a vacuous pass stays visible.
pub fn print(run_id: &str, mode: &str, stats: &RunStats, verdicts: &[MetricVerdict]) {
    println!("\n{}", " Summary ".reversed().green());
    println!(
        "run {} - mode {} - {} requests",
        run_id.green(),
        mode,
        stats.sample_count()
    );

    let mut scenario_rows = vec![row![
        TableCell::builder("Scenario".bold()).build(),
        TableCell::builder("Requests".bold()).build(),
        TableCell::builder("p95 (ms)".bold()).build(),
        TableCell::builder("Failed".bold()).build()
    ]];
    for scenario in stats.by_scenario() {
        scenario_rows.push(row![
            TableCell::new(scenario.scenario.clone()),
            TableCell::new(scenario.requests),
            TableCell::new(
                scenario
                    .p95_ms
                    .map(|ms| format!("{:.1}", ms))
                    .unwrap_or("--".to_string())
            ),
            TableCell::new(scenario.failed)
        ]);
    }
    let table = Table::builder()
        .rows(scenario_rows)
        .style(TableStyle::rounded())
        .build();
    println!("{}", table.render());

    let mut check_rows = vec![row![
        TableCell::builder("Check".bold()).build(),
        TableCell::builder("Passed".bold()).build(),
        TableCell::builder("Rate".bold()).build()
    ]];
    for scenario in stats.by_scenario() {
        let labels = CheckLabels::new(&scenario.scenario);
        let passes = [scenario.status_passes, scenario.duration_passes];
        for (label, passes) in labels.as_array().into_iter().zip(passes) {
            check_rows.push(row![
                TableCell::new(label),
                TableCell::new(format!("{}/{}", passes, scenario.requests)),
                TableCell::new(format_pass_rate(passes, scenario.requests))
            ]);
        }
    }
    let table = Table::builder()
        .rows(check_rows)
        .style(TableStyle::rounded())
        .build();
    println!("{}", table.render());

    let mut verdict_rows = vec![row![
        TableCell::builder("Metric".bold()).build(),
        TableCell::builder("Threshold".bold()).build(),
        TableCell::builder("Observed".bold()).build(),
        TableCell::builder("Verdict".bold()).build()
    ]];
    for verdict in verdicts {
        let observed = match verdict.observed {
            Some(value) => format_observed(&verdict.metric, value).normal(),
            None => "no data".bright_black(),
        };
        let outcome = if verdict.passed {
            "✓ pass".green()
        } else {
            "✗ fail".red()
        };

        verdict_rows.push(row![
            TableCell::new(verdict.metric.clone()),
            TableCell::new(verdict.expr.clone()),
            TableCell::new(observed),
            TableCell::new(outcome)
        ]);
    }
    let table = Table::builder()
        .rows(verdict_rows)
        .style(TableStyle::rounded())
        .build();
    println!("{}", table.render());

    if verdicts.iter().all(|v| v.passed) {
        println!("{}", "all thresholds passed".green());
    } else {
        println!("{}", "thresholds breached".red());
    }
}

fn format_observed(metric: &str, value: f64) -> String {
    match metric {
        "http_req_duration" => format!("{:.1}ms", value),
        _ => format!("{:.2}%", value * 100.0),
    }
}

fn format_pass_rate(passes: u64, total: u64) -> ColoredString {
    if total == 0 {
        return "--".bright_black();
    }
    let rate = passes as f64 / total as f64;
    let text = format!("{:.2}%", rate * 100.0);
    if passes == total {
        text.green()
    } else {
        text.yellow()
    }
}
