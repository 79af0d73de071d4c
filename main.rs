/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use bpaf::Bpaf;
use log::error;
use tracing_subscriber::EnvFilter;
use ucmap::EditorApp;
use ucmap::prefs::EditorConfig;
use ucmap::services::{persistence, validation};

const LOG_ENV: &str = "UCMAP_LOG";

/// Check a saved Use Case Map diagram and print a structural report.
#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
struct Options {
    /// Editor preferences file (TOML)
    #[bpaf(long, argument("PATH"))]
    config: Option<PathBuf>,

    /// Log filter directives, e.g. `ucmap=debug` (falls back to UCMAP_LOG)
    #[bpaf(long, argument("FILTER"))]
    log_filter: Option<String>,

    /// Also load the diagram into an editor session and cross-check the store
    #[bpaf(long)]
    strict: bool,

    /// Diagram document (JSON)
    #[bpaf(positional("FILE"))]
    diagram: PathBuf,
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize logging: {e}");
    }
}

fn main() -> ExitCode {
    let options = options().run();
    init_tracing(options.log_filter.as_deref());

    let config = match &options.config {
        Some(path) => match EditorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                return ExitCode::from(2);
            },
        },
        None => EditorConfig::default(),
    }
    .with_env_overrides();

    let raw = match fs::read_to_string(&options.diagram) {
        Ok(raw) => raw,
        Err(e) => {
            error!("failed to read {}: {e}", options.diagram.display());
            return ExitCode::from(2);
        },
    };
    let snapshot = match persistence::snapshot_from_json(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("{}: {e}", options.diagram.display());
            return ExitCode::from(2);
        },
    };

    let report = validation::validate(&snapshot);
    print!("{}", validation::generate_report(&report));

    if options.strict {
        let mut app = EditorApp::new(config);
        if let Err(e) = app.load_snapshot(&snapshot) {
            error!("{}: {e}", options.diagram.display());
            return ExitCode::from(2);
        }
        let violations = app.graph().collect_index_violations();
        for violation in &violations {
            println!("  ! {violation}");
        }
        if !violations.is_empty() {
            return ExitCode::FAILURE;
        }
    }

    if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
