use std::collections::HashSet;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use skylab_model::{
    Dimensions, Flag, LeaseCap, LeaseDuration, LeaseRequest, ModelError, ModelResult, Selector,
    SelectorKind,
    input::{fix_suspicious_hostname, parse_dim, parse_dims_into},
};
use skylab_observe::{LoggerFormat, LoggerLevel, LoggerTimeZone};

#[derive(Debug, Parser)]
#[command(name = "skylab", version, about = "Lease and release Skylab DUTs for debugging")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lease a DUT by hostname, model or board.
    ///
    /// This subcommand's behavior is subject to change without notice.
    /// Do not build automation around it.
    #[command(name = "lease-dut")]
    LeaseDut(LeaseArgs),

    /// Cancel every active lease on the given DUTs.
    #[command(name = "release-duts")]
    ReleaseDuts(ReleaseArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Use the staging environment.
    #[arg(long, global = true, env = "SKYLAB_DEV")]
    pub dev: bool,

    /// Log filter, e.g. "warn" or "skylab_core=debug".
    #[arg(long, global = true, env = "SKYLAB_LOG", default_value = "warn")]
    pub log_level: LoggerLevel,

    #[arg(long, global = true, env = "SKYLAB_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Time zone of log timestamps: utc or local.
    #[arg(long, global = true, env = "SKYLAB_LOG_TZ", default_value = "utc")]
    pub log_tz: LoggerTimeZone,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

/// Overrides for the selected environment.
#[derive(Debug, Default, Args)]
pub struct EndpointArgs {
    /// Swarming service URL.
    #[arg(long, global = true, env = "SKYLAB_SWARMING_SERVICE")]
    pub swarming_service: Option<String>,

    #[arg(long, global = true, env = "SKYLAB_BUILDBUCKET_HOST")]
    pub buildbucket_host: Option<String>,

    /// Lease builder as project/bucket/builder.
    #[arg(long, global = true, env = "SKYLAB_BUILDER")]
    pub builder: Option<String>,

    /// Fleet inventory host.
    #[arg(long, global = true, env = "SKYLAB_INVENTORY_HOST")]
    pub inventory_host: Option<String>,

    /// Top-level pool of leasable bots.
    #[arg(long, global = true, env = "SKYLAB_POOL")]
    pub pool: Option<String>,

    /// File holding an OAuth bearer token.
    #[arg(long, global = true, env = "SKYLAB_TOKEN_FILE")]
    pub token_file: Option<std::path::PathBuf>,

    #[arg(long, global = true, env = "SKYLAB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Concurrent lease limit per model.
    #[arg(long, global = true, env = "SKYLAB_MODEL_CAP")]
    pub model_cap: Option<LeaseCap>,

    /// Concurrent lease limit per board.
    #[arg(long, global = true, env = "SKYLAB_BOARD_CAP")]
    pub board_cap: Option<LeaseCap>,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("selector")
        .required(true)
        .args(["host", "model", "board"]),
))]
pub struct LeaseArgs {
    /// DUT hostname.
    pub host: Option<String>,

    /// Lease any ready DUT of this model.
    #[arg(long)]
    pub model: Option<String>,

    /// Lease any ready DUT of this board.
    #[arg(long)]
    pub board: Option<String>,

    /// Duration of the lease; decimals are truncated to whole minutes.
    #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
    pub minutes: f64,

    /// Why the DUT is leased (at most 30 characters, not a bug id).
    #[arg(long, default_value = "")]
    pub reason: String,

    /// Extra dimension as key=value or key:value; may repeat.
    #[arg(long = "dim", value_name = "KEY=VALUE")]
    pub dim: Vec<String>,

    /// Comma-separated extra dimensions.
    #[arg(long = "dims", value_name = "LIST")]
    pub dims: Option<String>,

    /// Bypass the per-model and per-board lease limits in an emergency.
    #[arg(long)]
    pub evil_lease: bool,
}

impl LeaseArgs {
    /// The selector, with hostname typos corrected. The returned string is
    /// the original hostname when a correction was applied.
    pub fn selector(&self) -> ModelResult<(Selector, Option<String>)> {
        match (&self.host, &self.model, &self.board) {
            (Some(host), _, _) => {
                let fixed = fix_suspicious_hostname(host);
                let corrected = (&fixed != host).then(|| host.clone());
                Ok((Selector::new(SelectorKind::Hostname, fixed)?, corrected))
            }
            (_, Some(model), _) => Ok((Selector::new(SelectorKind::Model, model.as_str())?, None)),
            (_, _, Some(board)) => Ok((Selector::new(SelectorKind::Board, board.as_str())?, None)),
            (None, None, None) => Err(ModelError::Invalid(
                "exactly one hostname or model or board required".into(),
            )),
        }
    }

    pub fn user_dims(&self) -> ModelResult<Dimensions> {
        let mut dims = Dimensions::new();
        for item in &self.dim {
            let (k, v) = parse_dim(item)?;
            dims.set(k, v);
        }
        if let Some(list) = &self.dims {
            parse_dims_into(list, &mut dims)?;
        }
        Ok(dims)
    }

    pub fn request(&self, selector: Selector) -> ModelResult<LeaseRequest> {
        LeaseRequest::new(
            selector,
            LeaseDuration::from_minutes(self.minutes)?,
            self.reason.as_str(),
            self.user_dims()?,
            Flag::from(self.evil_lease),
        )
    }
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Hostnames of the DUTs to release.
    #[arg(required = true, num_args = 1..)]
    pub hosts: Vec<String>,
}

/// Rewrites single-dash long flags (`-minutes`) to their `--` form.
///
/// A flag that takes a value is joined with the token after it
/// (`-reason -wip` becomes `--reason=-wip`), so values are never rewritten.
/// Short flags, negative numbers and everything after `--` pass through.
pub fn normalize_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let value_flags = value_taking_longs();
    let mut out = Vec::new();
    let mut passthrough = false;
    let mut awaiting_value: Option<String> = None;
    for (i, arg) in args.into_iter().map(Into::into).enumerate() {
        if let Some(flag) = awaiting_value.take() {
            out.push(format!("{flag}={arg}"));
            continue;
        }
        if i == 0 || passthrough {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        let long_single_dash = arg.len() > 2
            && arg.starts_with('-')
            && !arg.starts_with("--")
            && arg[1..].starts_with(|c: char| c.is_ascii_alphabetic());
        let arg = if long_single_dash { format!("-{arg}") } else { arg };
        match arg.strip_prefix("--") {
            Some(name) if !name.contains('=') && value_flags.contains(name) => {
                awaiting_value = Some(arg);
            }
            _ => out.push(arg),
        }
    }
    // A trailing flag without a value is left for clap to report.
    out.extend(awaiting_value);
    out
}

/// Long names of every option that takes a value, across all subcommands.
fn value_taking_longs() -> HashSet<String> {
    let cmd = Cli::command();
    std::iter::once(&cmd)
        .chain(cmd.get_subcommands())
        .flat_map(|c| c.get_arguments())
        .filter(|a| !a.is_positional() && a.get_action().takes_values())
        .filter_map(|a| a.get_long())
        .map(str::to_string)
        .collect()
}
