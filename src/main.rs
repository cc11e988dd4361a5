mod auth;
mod client;
mod config;
mod error;
mod metadata;
mod migrate;
mod output;
mod screenshots;
mod status;
mod types;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use client::AscClient;
use error::{is_already_reported, reported, usage_error};
use output::{print_with, Format};

const PLATFORMS: [&str; 4] = ["IOS", "MAC_OS", "TV_OS", "VISION_OS"];

// ─── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "asc",
    version,
    about = "Release dashboard, metadata sync and screenshot automation for App Store Connect"
)]
struct Cli {
    /// Override data directory (default: ./.asc or ~/.asc).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value = "json", global = true)]
    output: Format,

    /// Indent JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a data directory with a template config.
    Init {
        /// Create in ~/.asc instead of ./.asc.
        #[arg(long)]
        global: bool,
    },

    /// Release health dashboard for one app.
    Status {
        /// App ID, bundle ID or exact name (default: ASC_APP_ID).
        #[arg(long)]
        app: Option<String>,
        /// Sections to collect (comma-separated, default: all).
        #[arg(long)]
        include: Option<String>,
    },

    /// Localized metadata kept as JSON files.
    Metadata {
        #[command(subcommand)]
        cmd: MetadataCmd,
    },

    /// Import and export fastlane metadata directories.
    Migrate {
        #[command(subcommand)]
        cmd: MigrateCmd,
    },

    /// Simulator screenshot automation.
    Screenshots {
        #[command(subcommand)]
        cmd: ScreenshotsCmd,
    },
}

#[derive(clap::Args)]
struct VersionArgs {
    /// App ID, bundle ID or exact name (default: ASC_APP_ID).
    #[arg(long)]
    app: Option<String>,
    /// Version string, e.g. 1.2.3.
    #[arg(long)]
    version: Option<String>,
    /// Platform: IOS, MAC_OS, TV_OS or VISION_OS.
    #[arg(long)]
    platform: Option<String>,
}

#[derive(Subcommand)]
enum MetadataCmd {
    /// Download localizations into <dir>.
    Pull {
        #[command(flatten)]
        target: VersionArgs,
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Only "localizations" is supported.
        #[arg(long)]
        include: Option<String>,
        /// App info ID, when the app has more than one editable.
        #[arg(long = "app-info")]
        app_info: Option<String>,
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Check a metadata directory against App Store limits.
    Validate {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Only validate this version's files.
        #[arg(long)]
        version: Option<String>,
    },
    /// Create or update ASC localizations from <dir>.
    Push {
        #[command(flatten)]
        target: VersionArgs,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long = "app-info")]
        app_info: Option<String>,
        /// Print the plan without changing anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum MigrateCmd {
    /// Upload a fastlane metadata directory.
    Import {
        #[command(flatten)]
        target: VersionArgs,
        #[arg(long)]
        fastlane_dir: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a version's metadata as a fastlane directory.
    Export {
        #[command(flatten)]
        target: VersionArgs,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Check a fastlane directory against App Store limits.
    Validate {
        #[arg(long)]
        fastlane_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ScreenshotsCmd {
    /// Execute a screenshot plan.
    Run {
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Use this bundle ID instead of the plan's.
        #[arg(long)]
        bundle_id: Option<String>,
        /// Simulator UDID (default: the plan's, then "booted").
        #[arg(long)]
        udid: Option<String>,
        /// Accept every action without a simulator.
        #[arg(long)]
        dry_run: bool,
    },
    /// Review captured screenshots.
    Review {
        #[command(subcommand)]
        cmd: ReviewCmd,
    },
}

#[derive(Subcommand)]
enum ReviewCmd {
    /// Build manifest.json and index.html from raw captures.
    Generate {
        /// Directory laid out as <locale>/<device>/*.png.
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<String>,
    },
    /// Open the review page in a browser.
    Open {
        #[arg(long)]
        output_dir: Option<String>,
        #[arg(long)]
        html: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark review entries as approved.
    Approve {
        #[arg(long)]
        output_dir: Option<String>,
        #[arg(long)]
        manifest: Option<String>,
        #[arg(long)]
        approvals: Option<String>,
        /// Approve every entry with status "ready".
        #[arg(long)]
        all_ready: bool,
        #[arg(long)]
        key: Vec<String>,
        /// Screenshot ID.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        locale: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "asc=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if !is_already_reported(&err) {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Shared per-invocation state.
struct Ctx {
    data_dir: PathBuf,
    config: config::Config,
    format: Format,
    pretty: bool,
}

impl Ctx {
    fn client(&self) -> Result<AscClient> {
        let creds = self.config.credentials(&self.data_dir)?;
        let client = AscClient::new(&creds)?;
        Ok(match self.config.base_url() {
            Some(base) => client.with_base_url(base),
            None => client,
        })
    }

    fn app_flag(&self, flag: Option<String>) -> Result<String> {
        flag.map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .or_else(|| self.config.default_app_id())
            .ok_or_else(|| usage_error("--app is required (or set ASC_APP_ID)"))
    }

    fn print<T, F, G>(&self, value: &T, table: F, markdown: G) -> Result<()>
    where
        T: serde::Serialize,
        F: FnOnce(&T),
        G: FnOnce(&T),
    {
        print_with(value, self.format, self.pretty, table, markdown)
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Cmd::Init { global } = &cli.cmd {
        return cmd_init(*global);
    }

    let data_dir = config::resolve_data_dir(cli.data_dir.as_deref())?;
    let ctx = Ctx {
        config: config::Config::load(&data_dir)?,
        data_dir,
        format: cli.output,
        pretty: cli.pretty,
    };

    match cli.cmd {
        Cmd::Init { .. } => unreachable!(),
        Cmd::Status { app, include } => cmd_status(&ctx, app, include).await,
        Cmd::Metadata { cmd } => match cmd {
            MetadataCmd::Pull {
                target,
                dir,
                include,
                app_info,
                force,
            } => cmd_metadata_pull(&ctx, target, dir, include, app_info, force).await,
            MetadataCmd::Validate { dir, version } => cmd_metadata_validate(&ctx, dir, version),
            MetadataCmd::Push {
                target,
                dir,
                app_info,
                dry_run,
            } => cmd_metadata_push(&ctx, target, dir, app_info, dry_run).await,
        },
        Cmd::Migrate { cmd } => match cmd {
            MigrateCmd::Import {
                target,
                fastlane_dir,
                dry_run,
            } => cmd_migrate_import(&ctx, target, fastlane_dir, dry_run).await,
            MigrateCmd::Export { target, output_dir } => cmd_migrate_export(&ctx, target, output_dir).await,
            MigrateCmd::Validate { fastlane_dir } => cmd_migrate_validate(&ctx, fastlane_dir),
        },
        Cmd::Screenshots { cmd } => match cmd {
            ScreenshotsCmd::Run {
                plan,
                bundle_id,
                udid,
                dry_run,
            } => cmd_screenshots_run(&ctx, plan, bundle_id, udid, dry_run).await,
            ScreenshotsCmd::Review { cmd } => cmd_review(&ctx, cmd).await,
        },
    }
}

/// Race `fut` against the request timeout and Ctrl-C. Failures are prefixed
/// with `scope`; dropping `fut` abandons its in-flight requests.
async fn with_deadline<T>(scope: &str, timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(res) => res.with_context(|| scope.to_string()),
            Err(_) => bail!("{scope}: request timed out after {}", humanize(timeout)),
        },
        _ = tokio::signal::ctrl_c() => bail!("{scope}: interrupted"),
    }
}

fn humanize(d: Duration) -> String {
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| usage_error(format!("{flag} is required")))
}

fn required_str(value: Option<String>, flag: &str) -> Result<String> {
    required(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()), flag)
}

fn parse_platform(value: Option<String>) -> Result<Option<String>> {
    let Some(raw) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let platform = client::normalize_enum(&raw);
    if !PLATFORMS.contains(&platform.as_str()) {
        return Err(usage_error(format!("--platform must be one of: {}", PLATFORMS.join(", "))));
    }
    Ok(Some(platform))
}

/// Validated `--app/--version/--platform`. The app is resolved later, once a
/// client exists.
struct VersionFlags {
    app: String,
    version: String,
    platform: Option<String>,
}

impl VersionFlags {
    fn parse(ctx: &Ctx, args: VersionArgs) -> Result<Self> {
        Ok(Self {
            app: ctx.app_flag(args.app)?,
            version: required_str(args.version, "--version")?,
            platform: parse_platform(args.platform)?,
        })
    }
}

// ─── init ────────────────────────────────────────────────────────────────────

fn cmd_init(global: bool) -> Result<()> {
    let dir = config::init_data_dir(global)?;
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    let cfg_path = dir.join("config.toml");
    if cfg_path.exists() {
        eprintln!("Config already exists: {}", cfg_path.display());
    } else {
        std::fs::write(&cfg_path, config::CONFIG_TEMPLATE)?;
        eprintln!("Created {}", cfg_path.display());
    }

    eprintln!("Initialized in {}", dir.display());
    eprintln!();
    eprintln!("Next steps:");
    eprintln!("  1. Edit {} with your API credentials", cfg_path.display());
    eprintln!("  2. Run `asc status --app <id>` to verify");
    Ok(())
}

// ─── status ──────────────────────────────────────────────────────────────────

async fn cmd_status(ctx: &Ctx, app: Option<String>, include: Option<String>) -> Result<()> {
    let app = ctx.app_flag(app)?;
    let includes = status::parse_include(include.as_deref().unwrap_or("")).map_err(usage_error)?;
    let client = Arc::new(ctx.client()?);

    let dash = with_deadline("status", ctx.config.timeout()?, async {
        let source: Arc<dyn status::StatusSource> = client.clone();
        status::collect_dashboard(source, &app, includes).await
    })
    .await?;

    info!(health = dash.summary.health.as_str(), "status collected");
    ctx.print(&dash, status::render_table, status::render_markdown)
}

// ─── metadata ────────────────────────────────────────────────────────────────

async fn cmd_metadata_pull(
    ctx: &Ctx,
    target: VersionArgs,
    dir: Option<PathBuf>,
    include: Option<String>,
    app_info: Option<String>,
    force: bool,
) -> Result<()> {
    let flags = VersionFlags::parse(ctx, target)?;
    let dir = required(dir.filter(|d| !d.as_os_str().is_empty()), "--dir")?;
    let includes = metadata::parse_pull_include(include.as_deref()).map_err(usage_error)?;
    let client = ctx.client()?;

    let result = with_deadline("metadata pull", ctx.config.timeout()?, async {
        let target = metadata::Target {
            app_id: &flags.app,
            version: &flags.version,
            platform: flags.platform.as_deref(),
            app_info_id: app_info.as_deref(),
        };
        metadata::pull(&client, &target, &dir, includes, force).await
    })
    .await?;

    ctx.print(&result, metadata::render_pull_table, metadata::render_pull_markdown)
}

fn cmd_metadata_validate(ctx: &Ctx, dir: Option<PathBuf>, version: Option<String>) -> Result<()> {
    let dir = required(dir, "--dir")?;
    let tree = metadata::read_tree(&dir, version.as_deref()).context("metadata validate")?;
    if tree.is_empty() {
        bail!("metadata validate: no metadata files found under {}", dir.display());
    }
    let issues = metadata::validate_tree(&dir, &tree, metadata::ValidationOptions::default())
        .context("metadata validate")?;
    let report = metadata::ValidationReport::from_issues(&dir, issues);

    ctx.print(&report, metadata::render_validation_table, metadata::render_validation_markdown)?;
    if !report.valid {
        return Err(reported(format!("{} error(s) found", report.error_count)));
    }
    Ok(())
}

async fn cmd_metadata_push(
    ctx: &Ctx,
    target: VersionArgs,
    dir: Option<PathBuf>,
    app_info: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let flags = VersionFlags::parse(ctx, target)?;
    let dir = required(dir, "--dir")?;
    let client = ctx.client()?;

    let result = with_deadline("metadata push", ctx.config.timeout()?, async {
        let target = metadata::Target {
            app_id: &flags.app,
            version: &flags.version,
            platform: flags.platform.as_deref(),
            app_info_id: app_info.as_deref(),
        };
        metadata::push(&client, &target, &dir, dry_run).await
    })
    .await?;

    ctx.print(&result, metadata::render_push_table, metadata::render_push_markdown)
}

// ─── migrate ─────────────────────────────────────────────────────────────────

fn existing_dir(dir: Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    let dir = required(dir, flag)?;
    if !dir.is_dir() {
        return Err(usage_error(format!("{flag} {} is not a directory", dir.display())));
    }
    Ok(dir)
}

async fn cmd_migrate_import(ctx: &Ctx, target: VersionArgs, dir: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let flags = VersionFlags::parse(ctx, target)?;
    let dir = existing_dir(dir, "--fastlane-dir")?;
    let client = ctx.client()?;

    let result = with_deadline("migrate import", ctx.config.timeout()?, async {
        let target = metadata::Target {
            app_id: &flags.app,
            version: &flags.version,
            platform: flags.platform.as_deref(),
            app_info_id: None,
        };
        migrate::import(&client, &target, &dir, dry_run).await
    })
    .await?;

    ctx.print(&result, migrate::render_import_table, migrate::render_import_markdown)
}

async fn cmd_migrate_export(ctx: &Ctx, target: VersionArgs, out: Option<PathBuf>) -> Result<()> {
    let flags = VersionFlags::parse(ctx, target)?;
    let out = required(out, "--output-dir")?;
    let client = ctx.client()?;

    let result = with_deadline("migrate export", ctx.config.timeout()?, async {
        let target = metadata::Target {
            app_id: &flags.app,
            version: &flags.version,
            platform: flags.platform.as_deref(),
            app_info_id: None,
        };
        migrate::export(&client, &target, &out).await
    })
    .await?;

    ctx.print(&result, migrate::render_export_table, migrate::render_export_markdown)
}

fn cmd_migrate_validate(ctx: &Ctx, dir: Option<PathBuf>) -> Result<()> {
    let dir = existing_dir(dir, "--fastlane-dir")?;
    let result = migrate::validate(&dir).context("migrate validate")?;
    ctx.print(&result, migrate::render_validate_table, migrate::render_validate_markdown)?;
    if !result.valid {
        return Err(reported(format!("{} error(s) found", result.error_count)));
    }
    Ok(())
}

// ─── screenshots ─────────────────────────────────────────────────────────────

async fn cmd_screenshots_run(
    ctx: &Ctx,
    plan_path: Option<PathBuf>,
    bundle_id: Option<String>,
    udid: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let plan_path = required(plan_path, "--plan")?;
    let mut file = screenshots::load_plan_unvalidated(&plan_path).context("screenshots run")?;
    if let Some(bundle_id) = bundle_id.filter(|b| !b.trim().is_empty()) {
        file.app.bundle_id = bundle_id;
    }
    if let Some(udid) = udid.filter(|u| !u.trim().is_empty()) {
        file.app.udid = Some(udid);
    }
    let plan = file.validate().map_err(|e| usage_error(e.to_string()))?;

    let driver: Box<dyn screenshots::SimulatorDriver> = if dry_run {
        Box::new(screenshots::NoopDriver)
    } else {
        Box::new(screenshots::SimctlDriver)
    };
    let result = tokio::select! {
        res = screenshots::run_plan(&plan, driver.as_ref()) => res,
        _ = tokio::signal::ctrl_c() => bail!("screenshots run: interrupted"),
    };

    ctx.print(&result, screenshots::render_run_table, screenshots::render_run_markdown)?;
    if let Some(failed) = result.steps.iter().find(|s| s.error.is_some()) {
        let message = failed.error.as_deref().unwrap_or_default();
        eprintln!("Error: step {} ({}) failed: {message}", failed.index, failed.action);
        return Err(reported(message.to_string()));
    }
    Ok(())
}

async fn cmd_review(ctx: &Ctx, cmd: ReviewCmd) -> Result<()> {
    match cmd {
        ReviewCmd::Generate { input_dir, output_dir } => {
            let input = input_dir.unwrap_or_else(|| PathBuf::from(screenshots::DEFAULT_OUTPUT_DIR));
            if !input.is_dir() {
                return Err(usage_error(format!("--input-dir {} is not a directory", input.display())));
            }
            let result = screenshots::generate_review(&input, output_dir.as_deref())
                .context("screenshots review generate")?;
            ctx.print(&result, print_generated, print_generated)
        }
        ReviewCmd::Open {
            output_dir,
            html,
            dry_run,
        } => {
            let result = screenshots::open_review(&screenshots::OpenRequest {
                output_dir,
                html_path: html,
                dry_run,
            })
            .await
            .context("screenshots review open")?;
            ctx.print(&result, |r| println!("{}", r.html_path), |r| println!("[{0}]({0})", r.html_path))
        }
        ReviewCmd::Approve {
            output_dir,
            manifest,
            approvals,
            all_ready,
            key,
            id,
            locale,
            device,
        } => {
            let req = screenshots::ApproveRequest {
                output_dir,
                manifest_path: manifest,
                approval_path: approvals,
                all_ready,
                keys: key,
                screenshot_id: id,
                locale,
                device,
            };
            let result = screenshots::approve_review(&req).context("screenshots review approve")?;
            ctx.print(&result, screenshots::render_approve_table, screenshots::render_approve_markdown)
        }
    }
}

fn print_generated(result: &screenshots::GenerateResult) {
    println!("Manifest: {}", result.manifest_path);
    println!("HTML: {}", result.html_path);
    println!(
        "Entries: {}  Ready: {}  Missing: {}  Approved: {}",
        result.total, result.ready, result.missing, result.approved
    );
}
