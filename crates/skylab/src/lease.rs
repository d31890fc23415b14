use std::time::Duration;

use skylab_model::{Selector, SelectorKind, input::dut_name_to_fqdn};
use time::{OffsetDateTime, format_description::well_known::Rfc2822};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    app::App,
    cli::{GlobalArgs, LeaseArgs},
};

pub async fn run(
    global: &GlobalArgs,
    args: &LeaseArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (selector, corrected) = args.selector()?;
    if let Some(original) = corrected {
        eprintln!("correcting ({original}) to ({})", selector.payload());
    }
    let request = args.request(selector)?;
    let duration = request.duration().as_duration();

    let app = App::build(global)?;
    let leaser = &app.leaser;

    let mut lease = leaser.submit(request, cancel).await?;
    for warning in &lease.warnings {
        eprintln!("{warning}");
    }
    if lease.request.kind() == SelectorKind::Hostname && lease.warnings.is_empty() {
        eprintln!("inferred model ({})", lease.model.as_deref().unwrap_or_default());
    }
    println!("{}", created_line(lease.request.selector(), &lease.build_url));
    if lease.request.kind() == SelectorKind::Hostname {
        println!("Waiting for task to start; lease isn't active yet");
    }
    info!(tasks = %app.session_tasks_url(), "session tasks");

    let dut_name = leaser.wait_for_start(&mut lease, cancel).await?;
    println!("{}", dut_name_to_fqdn(&dut_name));
    println!("{}", leased_until_line(OffsetDateTime::now_utc(), duration)?);
    Ok(())
}

fn created_line(selector: &Selector, build_url: &str) -> String {
    let label = match selector.kind() {
        SelectorKind::Hostname => "host",
        SelectorKind::Model => "model",
        SelectorKind::Board => "board",
    };
    format!("Created lease for {label} {}: {build_url}", selector.payload())
}

fn leased_until_line(now: OffsetDateTime, duration: Duration) -> anyhow::Result<String> {
    Ok(format!("DUT leased until {}", (now + duration).format(&Rfc2822)?))
}
