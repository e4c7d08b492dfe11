//! Photon Repack CLI
//!
//! Entry point for the `photon-repack` command-line tool.

use clap::{Parser, Subcommand};
use photon_repack::config::{default_host_config_path, EffectiveConfig, PROJECT_CONFIG_FILE};
use photon_repack::deploy::{BackendChoice, Deployment, UploadRecord};
use photon_repack::summary::ExitCode;
use photon_repack::{
    CancelToken, PatchRequest, Pipeline, PipelineConfig, SignalHandler, ToolAvailability,
};
use repack_collab::{AppetizeUploader, FileChecklist};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable read when `upload.api_key` is not configured
const API_KEY_ENV: &str = "APPETIZE_API_KEY";

#[derive(Parser)]
#[command(name = "photon-repack")]
#[command(about = "Retarget the Photon backend of a compiled Android package", version)]
struct Cli {
    /// Project config file (default: ./photon-repack.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Output directory (overrides output.dir)
    #[arg(long, short = 'o', global = true)]
    output_dir: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the settings asset and rebuild the package
    Patch {
        /// Source package
        apk: PathBuf,

        #[command(flatten)]
        backend: BackendArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Extract the package into the working tree and stop
    Extract {
        /// Source package
        apk: PathBuf,
    },

    /// Check which external tools are available
    Doctor {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Patch, upload for emulator testing and record the test checklist
    Deploy {
        /// Source package
        apk: PathBuf,

        #[command(flatten)]
        backend: BackendArgs,

        /// TOML file of checklist answers ("test name" = "y" | "n" | "skip")
        #[arg(long)]
        checklist: Option<PathBuf>,

        /// Skip the upload even when an API key is configured
        #[arg(long)]
        no_upload: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Config,
}

#[derive(clap::Args)]
struct BackendArgs {
    /// New Photon application id (cloud hosting)
    #[arg(long)]
    app_id: Option<String>,

    /// Self-hosted server address
    #[arg(long)]
    server: Option<String>,

    /// Self-hosted server port (default: patch.default_port)
    #[arg(long, requires = "server")]
    port: Option<u16>,
}

impl BackendArgs {
    fn to_request(&self, default_port: u16) -> PatchRequest {
        let mut request = PatchRequest::new();
        if let Some(app_id) = &self.app_id {
            request = request.with_app_id(app_id.clone());
        }
        if let Some(server) = &self.server {
            request = request.with_server(server.clone(), Some(self.port.unwrap_or(default_port)));
        }
        request
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let effective = match load_config(cli.config.as_deref(), cli.output_dir.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    };

    match &cli.command {
        Commands::Patch { apk, backend, json } => {
            let token = install_signal_handler();
            run_patch(&effective, apk, backend, *json, token);
        }
        Commands::Extract { apk } => {
            let token = install_signal_handler();
            run_extract(&effective, apk, token);
        }
        Commands::Doctor { json } => run_doctor(&effective, *json),
        Commands::Deploy {
            apk,
            backend,
            checklist,
            no_upload,
            json,
        } => {
            let token = install_signal_handler();
            run_deploy(
                &effective,
                apk,
                backend,
                checklist.as_deref(),
                *no_upload,
                *json,
                token,
            );
        }
        Commands::Config => print_json(&effective.to_json()),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(
    project: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<EffectiveConfig, photon_repack::config::ConfigError> {
    let host = default_host_config_path();
    let project = project
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));

    let cli_overrides = output_dir.map(|dir| {
        serde_json::json!({
            "output": { "dir": dir.to_string_lossy() }
        })
    });

    EffectiveConfig::build(host.as_deref(), Some(&project), cli_overrides)
}

fn install_signal_handler() -> CancelToken {
    let handler = SignalHandler::new();
    if let Err(e) = handler.install() {
        warn!(error = %e, "cannot install signal handler; interrupts will not cancel cleanly");
    }
    handler.state().token()
}

fn pipeline(effective: &EffectiveConfig, token: CancelToken) -> Pipeline {
    Pipeline::new(PipelineConfig::from_settings(effective.settings())).with_cancel_token(token)
}

fn run_patch(
    effective: &EffectiveConfig,
    apk: &Path,
    backend: &BackendArgs,
    json_output: bool,
    token: CancelToken,
) {
    let request = backend.to_request(effective.settings().patch.default_port);
    if request.is_noop() {
        warn!("no --app-id or --server given; the package will be rebuilt unchanged");
    }

    let outcome = match pipeline(effective, token).run(apk, &request) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if json_output {
        let output = serde_json::json!({
            "run_id": outcome.run_id,
            "artifact": outcome.artifact,
            "patch": outcome.patch,
            "warnings": outcome.warnings,
            "summary_path": outcome.summary_path,
        });
        print_json(&serde_json::to_string_pretty(&output));
        return;
    }

    let label = if outcome.is_signed() { "signed" } else { "unsigned" };
    println!("✓ Modified package ({}): {}", label, outcome.artifact.path.display());
    println!("  Size: {:.2} MB", outcome.artifact.size_mb());
    for warning in &outcome.warnings {
        println!("  ⚠ {}", warning);
    }
    if let Some(path) = &outcome.summary_path {
        println!("  Summary: {}", path.display());
    }
}

fn run_extract(effective: &EffectiveConfig, apk: &Path, token: CancelToken) {
    match pipeline(effective, token).extract_only(apk) {
        Ok(tree) => {
            println!("✓ Extracted ({}): {}", tree.strategy(), tree.root().display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_doctor(effective: &EffectiveConfig, json_output: bool) {
    let tools = &effective.settings().tools;
    let checks = ToolAvailability::probe(tools).checks(tools);

    if json_output {
        print_json(&serde_json::to_string_pretty(&checks));
        return;
    }

    println!("Tool availability:\n");
    for check in &checks {
        println!("{}", check.to_human());
    }

    let missing = checks.iter().filter(|c| !c.ok()).count();
    println!();
    if missing == 0 {
        println!("All tools available.");
    } else {
        println!("{} tool(s) missing; fallbacks will be used.", missing);
    }
}

fn run_deploy(
    effective: &EffectiveConfig,
    apk: &Path,
    backend: &BackendArgs,
    checklist: Option<&Path>,
    no_upload: bool,
    json_output: bool,
    token: CancelToken,
) {
    let settings = effective.settings();
    let request = backend.to_request(settings.patch.default_port);

    let mut deployment = Deployment::new(pipeline(effective, token));

    let api_key = settings
        .upload
        .api_key
        .clone()
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|k| !k.trim().is_empty());
    match api_key {
        Some(_) if no_upload => info!("upload disabled by --no-upload"),
        Some(key) => {
            let uploader = AppetizeUploader::new(key)
                .with_endpoint(settings.upload.endpoint.clone())
                .with_platform(settings.upload.platform.clone());
            deployment = deployment.with_uploader(Box::new(uploader));
        }
        None => warn!(
            "no upload API key configured (set {} or upload.api_key); skipping upload",
            API_KEY_ENV
        ),
    }

    if let Some(path) = checklist {
        deployment = deployment.with_checklist(Box::new(FileChecklist::new(path)));
    }

    let outcome = match deployment.run(apk, &request) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if json_output {
        print_json(&outcome.report.to_json());
        return;
    }

    let report = &outcome.report;
    println!("Deployment summary");
    match &report.backend {
        BackendChoice::Cloud { app_id } => println!("  ✓ Photon: cloud ({})", app_id),
        BackendChoice::SelfHosted { server, port, .. } => {
            println!("  ✓ Photon: self-hosted ({}:{})", server, port)
        }
        BackendChoice::NotConfigured => println!("  ⚠ Photon: not configured"),
    }
    match &report.apk.modified {
        Some(path) => println!("  ✓ Modified package: {} ({:.2} MB)", path.display(), report.apk.size_mb),
        None => println!("  ⚠ Package not modified: {}", report.apk.original.display()),
    }
    match &report.upload {
        UploadRecord::Uploaded { url, .. } => println!("  ✓ Uploaded: {}", url),
        UploadRecord::NotUploaded { reason } => println!("  ⚠ Not uploaded: {}", reason),
        UploadRecord::Failed { error } => println!("  ❌ Upload failed: {}", error),
    }
    if !report.tests.is_empty() {
        println!("  {}", report.test_summary.to_human());
    }
    println!("\nReport: {}", outcome.report_path.display());
}

fn print_json(json: &Result<String, serde_json::Error>) {
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(ExitCode::Failure.as_i32());
        }
    }
}
