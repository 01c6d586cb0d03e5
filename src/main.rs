use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackset_reconciler::controller::EngineConfig;
use stackset_reconciler::driver::{
    AwsGatewayProvider, DriverConfig, ReconcileRequest, ReconciliationDriver, DEFAULT_REGION,
};
use stackset_reconciler::stackset::StackSetMetadata;
use stackset_reconciler::telemetry::{init_tracing, LogFormat};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile one account's stack set against the requested regions
    Reconcile(ReconcileArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ReconcileArgs {
    /// Target account id
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    account: Option<String>,

    /// Target region, repeat for several; required without `--event`
    #[arg(
        long = "region",
        value_name = "REGION",
        required_unless_present = "event",
        conflicts_with = "event"
    )]
    regions: Vec<String>,

    /// Read the request as JSON from a file (`-` for stdin)
    #[arg(long, value_name = "PATH")]
    event: Option<PathBuf>,

    /// Stack set base name; the account id is appended to it
    #[arg(long, env = "STACK_SET_NAME")]
    stack_set_name: String,

    /// Template used when the request does not name one
    #[arg(long, env = "TEMPLATE_URL")]
    template_url: Option<String>,

    /// Region of the CloudFormation endpoint
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    aws_region: String,

    /// Role to assume before calling CloudFormation; `{account}` is replaced
    #[arg(long, env = "MEMBER_ROLE_ARN")]
    member_role_arn: Option<String>,

    /// Stack set description
    #[arg(long, env = "STACK_SET_DESCRIPTION")]
    description: Option<String>,

    /// Stack set tag as KEY=VALUE, repeat for several
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Give up waiting after this many seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Do not check instances after creating a new stack set
    #[arg(long)]
    skip_created_instance_check: bool,

    /// Print the action that would be taken without applying it
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid tag '{s}', expected KEY=VALUE"))?;
    if key.is_empty() {
        return Err(format!("invalid tag '{s}', key is empty"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("StackSet Reconciler v{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reconcile(reconcile_args) => {
            init_tracing(args.log_format);
            run_reconcile(reconcile_args).await
        }
    }
}

async fn run_reconcile(args: ReconcileArgs) -> anyhow::Result<ExitCode> {
    info!(
        "Starting StackSet Reconciler v{}",
        env!("CARGO_PKG_VERSION")
    );

    let request = match &args.event {
        Some(path) => ReconcileRequest::load(path)
            .with_context(|| format!("reading request from {}", path.display()))?,
        None => ReconcileRequest {
            account: args.account.clone().unwrap_or_default(),
            regions: args.regions.clone(),
            template_url: None,
        },
    };

    let mut metadata = StackSetMetadata::default();
    if let Some(description) = args.description {
        metadata.description = description;
    }
    if !args.tags.is_empty() {
        metadata.tags = args.tags;
    }

    let mut engine = EngineConfig::new(args.stack_set_name);
    engine.wait.timeout = args.timeout_secs.map(Duration::from_secs);
    engine.confirm_created_instances = !args.skip_created_instance_check;

    let provider = AwsGatewayProvider::new(args.aws_region, args.member_role_arn, metadata);
    let driver = ReconciliationDriver::new(
        provider,
        DriverConfig {
            engine,
            template_url: args.template_url,
        },
    );

    if args.dry_run {
        let action = driver
            .plan(&request)
            .await
            .context("planning reconciliation")?;
        info!("Dry run: would apply {} for {}", action, request.account);
        println!("{}", serde_json::to_string(&action)?);
        return Ok(ExitCode::SUCCESS);
    }

    let response = driver
        .handle(&request)
        .await
        .with_context(|| format!("reconciling account {}", request.account))?;
    println!("{}", serde_json::to_string(&response)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
