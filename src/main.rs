mod config;
mod extension;
mod headless;
mod io;
mod logging;
mod lsp;
mod rubocop;

#[cfg(test)]
mod test_utils;

use clap::{Parser, Subcommand};
use lsp_types::{DiagnosticSeverity, FormattingOptions, NumberOrString, WorkspaceEdit};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use config::JsonSettingsFile;
use extension::{Command, ConnectionState, Controller, EditorHost};
use headless::HeadlessHost;
use io::ShellRunner;
use logging::{LogConfig, init_logging};
use rubocop::RubocopSessionFactory;

/// How long `lint` waits for the first diagnostics of each file
const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `format` waits for the server's edit to arrive
const EDIT_TIMEOUT: Duration = Duration::from_secs(10);

/// CLI arguments for the RuboCop language server client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root (defaults to current directory)
    #[arg(long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Settings file (defaults to <root>/.vscode/settings.json)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log file path (overrides RUBOCOP_CLIENT_LOG_FILE env var)
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Start the server, open FILES and print their diagnostics
    Lint {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Autocorrect FILE through the server and print the result
    Format {
        file: PathBuf,

        /// Apply all corrections, not only the safe ones
        #[arg(long)]
        all: bool,

        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },

    /// Print the command line the server would be launched with
    Resolve,
}

fn severity_label(severity: Option<DiagnosticSeverity>) -> &'static str {
    match severity {
        Some(DiagnosticSeverity::ERROR) => "error",
        Some(DiagnosticSeverity::WARNING) => "warning",
        Some(DiagnosticSeverity::INFORMATION) => "info",
        Some(DiagnosticSeverity::HINT) => "hint",
        _ => "note",
    }
}

async fn lint_files(
    controller: &mut Controller,
    host: &HeadlessHost,
    files: &[PathBuf],
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut documents = Vec::new();
    for file in files {
        documents.push((file, host.open_file(file)?));
    }

    controller.activate().await;
    if controller.state() != ConnectionState::Running {
        return Ok(false);
    }

    let mut clean = true;
    for (file, document) in &documents {
        host.focus(&document.uri);
        controller.on_active_editor_changed();

        if !controller
            .wait_for_diagnostics(document.key(), DIAGNOSTICS_TIMEOUT)
            .await
        {
            eprintln!("{}: no diagnostics received", file.display());
            continue;
        }

        for diagnostic in host.diagnostics(&document.uri).unwrap_or_default() {
            if diagnostic.severity == Some(DiagnosticSeverity::ERROR) {
                clean = false;
            }
            let code = match &diagnostic.code {
                Some(NumberOrString::String(code)) => format!(" [{code}]"),
                Some(NumberOrString::Number(code)) => format!(" [{code}]"),
                None => String::new(),
            };
            println!(
                "{}:{}:{}: {}: {}{}",
                file.display(),
                diagnostic.range.start.line + 1,
                diagnostic.range.start.character + 1,
                severity_label(diagnostic.severity),
                diagnostic.message,
                code
            );
        }
        if let Some(status) = host.status() {
            info!("{}: {}", file.display(), status.tooltip);
        }
    }

    controller.process_pending_events().await;
    Ok(clean)
}

async fn format_file(
    controller: &mut Controller,
    host: &HeadlessHost,
    file: &Path,
    all: bool,
    write: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let document = host.open_file(file)?;

    controller.activate().await;
    if controller.state() != ConnectionState::Running {
        return Ok(false);
    }

    let before = host.edits_applied();
    let command = if all {
        Command::FormatAutocorrectsAll
    } else {
        Command::FormatAutocorrects
    };
    controller.execute(command).await;

    // The edit request can trail the command's response
    if !host.wait_for_edits(before + 1, EDIT_TIMEOUT).await {
        info!("No edit from {}, falling back to formatting", command);
        let edits = controller
            .format_document(&document, FormattingOptions::default())
            .await
            .unwrap_or_default();
        let edit = WorkspaceEdit {
            changes: Some(HashMap::from([(document.uri.clone(), edits)])),
            ..Default::default()
        };
        host.apply_workspace_edit(edit).await;
    }
    controller.process_pending_events().await;

    if write {
        host.save(&document.uri)?;
        info!("Wrote {}", file.display());
    } else if let Some(formatted) = host.document(&document.uri) {
        print!("{}", formatted.text);
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with configuration from env vars and CLI args
    let log_config = LogConfig::from_env().with_overrides(args.log_level, args.log_file);

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = root.canonicalize()?;
    let settings_path = args
        .settings
        .unwrap_or_else(|| root.join(".vscode").join("settings.json"));

    info!(
        "Workspace root: {} (settings: {})",
        root.display(),
        settings_path.display()
    );

    let host = Arc::new(HeadlessHost::new(root.clone()));
    let mut controller = Controller::new(
        host.clone(),
        Arc::new(JsonSettingsFile::new(settings_path)),
        Arc::new(ShellRunner),
        Arc::new(RubocopSessionFactory),
    );

    let succeeded = match &args.command {
        CliCommand::Lint { files } => lint_files(&mut controller, &host, files).await?,
        CliCommand::Format { file, all, write } => {
            format_file(&mut controller, &host, file, *all, *write).await?
        }
        CliCommand::Resolve => match controller.resolve().await {
            Some(descriptor) => {
                for (key, value) in &descriptor.env {
                    println!("{key}={value}");
                }
                println!("{}", descriptor.command_line());
                true
            }
            None => false,
        },
    };

    controller.shutdown().await;
    info!("Done");

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
