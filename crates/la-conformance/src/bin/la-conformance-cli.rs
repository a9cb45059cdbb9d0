#![forbid(unsafe_code)]

use la_conformance::{CaseStatus, HarnessConfig, run_case_by_id, run_fixture_suite};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut case_filter: Option<String> = None;
    let mut emit_json = false;
    let mut require_green = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--case-id" => {
                let value = args
                    .next()
                    .ok_or("--case-id requires a value (e.g. align_outer_fill_zero)")?;
                case_filter = Some(value);
            }
            "--json" => {
                emit_json = true;
            }
            "--require-green" => {
                require_green = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let config = HarnessConfig::default_paths();
    let report = match case_filter.as_deref() {
        Some(case_id) => run_case_by_id(&config, case_id)?,
        None => run_fixture_suite(&config)?,
    };

    if emit_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            if result.status == CaseStatus::Fail {
                println!(
                    "FAIL case={} operation={:?}: {}",
                    result.case_id,
                    result.operation,
                    result.mismatch.as_deref().unwrap_or("<no reason>")
                );
            }
        }
        println!(
            "suite={} fixtures={} passed={} failed={} green={}",
            report.suite,
            report.fixture_count,
            report.passed,
            report.failed,
            report.is_green()
        );
    }

    if require_green && !report.is_green() {
        return Err(format!(
            "suite {} is not green: {} of {} cases failed",
            report.suite, report.failed, report.fixture_count
        )
        .into());
    }

    Ok(())
}

fn print_help() {
    println!(
        "la-conformance-cli\n\
         Usage:\n\
         \tla-conformance-cli [--case-id ID] [--json] [--require-green]\n\
         Options:\n\
         \t--case-id <id>     Run only one fixture case\n\
         \t--json             Print the full parity report as JSON\n\
         \t--require-green    Fail with non-zero exit when any case fails\n\
         \t-h, --help         Show this help"
    );
}
