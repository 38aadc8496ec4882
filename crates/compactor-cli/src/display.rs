//! Human readable output

use compactor_engine::{DirectorySkip, DryRunReport, RunReport, RunRequest};
use compactor_types::{
    Capabilities, FailureReason, LzxPolicy, Outcome, RunResult, SkipReason, WorkerCap,
};
use console::style;
use std::collections::BTreeMap;
use std::time::Duration;

/// Failures listed individually before the rest are summarised
const MAX_LISTED_FAILURES: usize = 20;

/// Describe the run about to start
pub fn display_banner(request: &RunRequest, capabilities: &Capabilities) {
    println!(
        "{} Compressing {} ({} mode)",
        style("→").green().bold(),
        style(request.target.display()).cyan(),
        request.mode
    );
    println!(
        "  CPU: {} physical / {} logical cores, {:?}",
        capabilities.cpu.physical_cores, capabilities.cpu.logical_cores, capabilities.cpu.class
    );
    println!(
        "  Volume: {} on {}, {:?}",
        capabilities.volume.filesystem,
        capabilities.volume.root.display(),
        capabilities.volume.drive_type
    );

    let lzx = match request.lzx_policy {
        LzxPolicy::ForceOff => "off",
        LzxPolicy::ForceOn => "forced",
        LzxPolicy::Auto if capabilities.lzx_permitted(LzxPolicy::Auto) => "on",
        LzxPolicy::Auto => "off (CPU)",
    };
    let workers = match request.worker_cap {
        WorkerCap::Auto => "auto".to_string(),
        WorkerCap::Fixed(count) => count.get().to_string(),
        WorkerCap::SingleWorker => "single".to_string(),
    };
    println!("  LZX: {}, workers: {}", lzx, workers);
}

/// Warning shown before a run on rotational media
pub fn display_hdd_warning() {
    display_warning("Detected a traditional spinning hard drive for this path.");
    println!("Sustained compression can thrash the disk heads, fragment files and slow launches.");
    println!("{}", style("Recommendation:").yellow());
    println!("  • Run during idle hours with a single worker (-s)");
    println!("  • Defragment the drive once compression finishes");
    println!("  • Prefer rarely modified folders");
}

/// Final report of a run
pub fn display_report(report: &RunReport, verbose: bool) {
    let result = &report.result;

    println!();
    println!("{}", style("Compression Statistics:").bold().underlined());
    println!(
        "  Files scanned: {} ({})",
        style(report.files_scanned).cyan(),
        format_bytes(report.bytes_scanned)
    );
    println!("  Compressed: {}", style(result.compressed()).green());
    println!(
        "  Already compressed: {}",
        style(result.already_compressed()).green()
    );
    println!("  Skipped: {}", style(result.skipped()).yellow());
    println!(
        "  Failed: {}",
        if result.failed() > 0 {
            style(result.failed()).red()
        } else {
            style(result.failed()).green()
        }
    );

    let processed = result.bytes_processed();
    let saved = result.space_saved();
    let percent = if processed > 0 {
        saved as f64 / processed as f64 * 100.0
    } else {
        0.0
    };
    println!(
        "  Space saved: {} of {} processed ({:.1}%)",
        style(format_bytes(saved)).green().bold(),
        format_bytes(processed),
        percent
    );

    let timings = &report.timings;
    println!(
        "  Duration: {} (scan {}, classify {}, compress {}, verify {})",
        style(format_duration(timings.total)).blue(),
        format_duration(timings.scan),
        format_duration(timings.classify),
        format_duration(timings.execute),
        format_duration(timings.verify)
    );
    if verbose {
        println!(
            "  Pools: XPRESS {} workers {}, LZX {} workers {}",
            report.sizing.xpress_workers,
            format_duration(timings.xpress_pool),
            report.sizing.lzx_workers,
            format_duration(timings.lzx_pool)
        );
    }

    let scan_rate = report.scan_throughput();
    let work_rate = report.work_throughput();
    println!(
        "  Throughput: scan {:.0} files/s, compression {:.1} files/s ({}/s)",
        scan_rate.files_per_second,
        work_rate.files_per_second,
        format_bytes(work_rate.bytes_per_second as u64)
    );

    if !report.decisions.is_empty() {
        println!();
        println!("{}", style("Adjustments:").bold());
        for decision in &report.decisions {
            println!("  • {}", decision);
        }
    }

    if verbose {
        display_skip_breakdown(result);
        display_excluded(&report.excluded);
    } else if !report.excluded.is_empty() {
        println!(
            "  {} directories excluded (use -v for details)",
            report.excluded.len()
        );
    }

    display_failures(result);

    if report.cancelled {
        display_warning("Run cancelled; batches that had not started were left alone.");
    }
    if result.compressed() == 0 && result.failed() == 0 && result.already_compressed() > 0 {
        display_info("This directory may have already been compressed.");
    }
    if report.has_still_unmarked() {
        display_warning(&format!(
            "{} files report success but are not marked compressed. Run again with --brand-files.",
            result.still_unmarked()
        ));
    }
}

/// Plan of a dry run
pub fn display_dry_run(report: &DryRunReport, verbose: bool) {
    println!();
    println!("{}", style("Compression Plan:").bold().underlined());
    println!(
        "  Workers: {} XPRESS, {} LZX, cap {}",
        report.sizing.xpress_workers, report.sizing.lzx_workers, report.sizing.global_cap
    );

    let mut per_algorithm: BTreeMap<String, (usize, usize, u64)> = BTreeMap::new();
    for batch in &report.batches {
        let entry = per_algorithm
            .entry(batch.algorithm.to_string())
            .or_default();
        entry.0 += 1;
        entry.1 += batch.len();
        entry.2 += batch.total_bytes();
    }
    for (algorithm, (batches, files, bytes)) in &per_algorithm {
        println!(
            "  {}: {} files ({}) in {} batches",
            style(algorithm).cyan(),
            files,
            format_bytes(*bytes),
            batches
        );
    }
    println!(
        "  Would compress {} files, skip {}",
        style(report.planned_files()).green(),
        style(report.result.len()).yellow()
    );

    for decision in &report.decisions {
        println!("  • {}", decision);
    }

    if verbose {
        display_skip_breakdown(&report.result);
        display_excluded(&report.excluded);
    }
}

fn display_skip_breakdown(result: &RunResult) {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for outcome in result.iter() {
        match &outcome.outcome {
            Outcome::Skipped(reason) => *counts.entry(skip_label(reason)).or_default() += 1,
            Outcome::AlreadyCompressed => *counts.entry("already compressed").or_default() += 1,
            Outcome::Compressed | Outcome::Failed(_) => {}
        }
    }
    if counts.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Skipped files:").bold());
    for (label, count) in counts {
        println!("  {}: {}", label, count);
    }
}

fn display_excluded(excluded: &[DirectorySkip]) {
    if excluded.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Excluded directories:").bold());
    for skip in excluded {
        let mut line = format!("  {}: {}", skip.relative_path.display(), skip.reason);
        if let Some(savings) = skip.estimated_savings {
            line.push_str(&format!(" (sampled {} files, est. {:.1}% savings)", skip.sampled_files, savings));
        }
        println!("{}", style(line).dim());
    }
}

fn display_failures(result: &RunResult) {
    let failures: Vec<_> = result
        .iter()
        .filter_map(|o| match &o.outcome {
            Outcome::Failed(reason) => Some((o, reason)),
            _ => None,
        })
        .collect();
    if failures.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Failures:").bold().red());
    for (outcome, reason) in failures.iter().take(MAX_LISTED_FAILURES) {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            outcome.path.display(),
            failure_label(reason)
        );
    }
    if failures.len() > MAX_LISTED_FAILURES {
        println!("  ... and {} more", failures.len() - MAX_LISTED_FAILURES);
    }
}

/// Short label used to group skip reasons
pub fn skip_label(reason: &SkipReason) -> &'static str {
    match reason {
        SkipReason::PoorYieldExtension(_) => "poor-yield format",
        SkipReason::TooSmall => "too small",
        SkipReason::AlreadyCompressed => "already compressed",
        SkipReason::LowEstimatedYield(_) => "low estimated savings",
        SkipReason::Inaccessible(_) => "inaccessible",
        SkipReason::ExcludedDirectory(_) => "excluded directory",
    }
}

fn failure_label(reason: &FailureReason) -> String {
    match reason {
        FailureReason::Backend(message) => message.clone(),
        FailureReason::StillUnmarked => "still not marked compressed".to_string(),
        FailureReason::Verification(message) => format!("verification failed: {}", message),
        FailureReason::Cancelled => "cancelled".to_string(),
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Display a warning message with proper formatting
pub fn display_warning(message: &str) {
    println!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an error message with proper formatting
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display a success message with proper formatting
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), style(message).blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0.00 B")]
    #[case(1536, "1.50 KB")]
    #[case(5 * 1024 * 1024, "5.00 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3.00 GB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(Duration::from_millis(1500), "1.50s")]
    #[case(Duration::from_secs(125), "2m 5s")]
    #[case(Duration::from_secs(3725), "1h 2m 5s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[test]
    fn test_skip_labels() {
        assert_eq!(skip_label(&SkipReason::TooSmall), "too small");
        assert_eq!(
            skip_label(&SkipReason::PoorYieldExtension("zip".into())),
            "poor-yield format"
        );
    }
}
