use skylab_core::leaser::ReleaseReport;
use skylab_model::input::fix_suspicious_hostname;
use tokio_util::sync::CancellationToken;

use crate::{
    app::App,
    cli::{GlobalArgs, ReleaseArgs},
};

/// Releases every host, then fails with the first error if any host failed.
pub async fn run(
    global: &GlobalArgs,
    args: &ReleaseArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let app = App::build(global)?;

    let hosts: Vec<String> = args
        .hosts
        .iter()
        .map(|original| {
            let host = fix_suspicious_hostname(original);
            if &host != original {
                eprintln!("correcting ({original}) to ({host})");
            }
            host
        })
        .collect();

    let summary = app.leaser.release_all(&hosts, cancel).await;
    for report in &summary.reports {
        for line in report_lines(report, |id| app.leaser.task_url(id)) {
            println!("{line}");
        }
    }
    for (host, e) in &summary.failures {
        eprintln!("failed to release {host}: {e}");
    }

    println!("released {} of {} DUT(s)", summary.reports.len(), hosts.len());
    match summary.into_first_error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn report_lines(report: &ReleaseReport, task_url: impl Fn(&String) -> String) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: cancelled {} lease task(s)",
        report.hostname,
        report.cancelled.len()
    )];
    lines.extend(report.cancelled.iter().map(|id| format!("  {}", task_url(id))));
    lines
}
