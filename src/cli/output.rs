use crate::sync::SyncReport;

pub fn format_duration(seconds: i64) -> String {
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn print_report(report: &SyncReport) {
    println!(
        "Stored {} records, {} already up to date",
        report.written.len(),
        report.skipped_fresh
    );
    if let Some(through) = report.complete_through {
        println!("Cache is complete through {through}");
    }
    for problem in report.problems() {
        eprintln!("{problem}");
    }
}
