//! Fleet wiring: load probes, gate them, drive the engine, write reports

use crate::commands::{ListArgs, RunArgs};
use crate::config::DEFAULT_FIREFOX_MAJOR;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use chrono::Utc;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use webcompat::{
    BrowserLauncher, CredentialStore, DualRunEngine, EngineConfig, EnvironmentProfile,
    GeckodriverLauncher, LaunchOptions, LiveSessionFactory, Platform, Probe, ProbeMetadata,
    ProbeRegistry, RemoteEndpointLauncher, RunReport,
};

/// Run the probe fleet end to end and map the result to an exit code.
///
/// Exit code 0 means no probe reported `workaround-obsolete` or
/// `unexpected-inversion`. Errors before any probe runs are returned and
/// end up as one line on stderr.
pub async fn run_fleet(args: RunArgs, reporter: &mut ProgressReporter) -> CliResult<ExitCode> {
    let environment = build_environment(&args)?;
    let registry = ProbeRegistry::load(&args.probe_path)?;
    let probes = select_probes(&registry, args.only_id.as_deref(), args.timeout_per_probe);
    if probes.is_empty() {
        reporter.warning(&format!(
            "no probes matched under {}",
            args.probe_path.display()
        ));
        return Ok(ExitCode::SUCCESS);
    }

    std::fs::create_dir_all(&args.output)?;
    let factory = Arc::new(LiveSessionFactory::new(
        build_launcher(&args),
        build_launch_options(&args),
    ));
    let config = EngineConfig::new()
        .with_workers(args.workers)
        .with_artifacts_dir(args.output.join("artifacts"))
        .with_retry_infrastructure(!args.no_retry);

    reporter.header(&format!(
        "webcompat: {} probes on {}, Firefox {}",
        probes.len(),
        environment.platform(),
        environment.firefox_major()
    ));
    reporter.start_progress(probes.len() as u64, "running probes");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = DualRunEngine::new(factory, environment.clone(), config).with_progress(tx);

    let started_at = Utc::now();
    let clock = Instant::now();
    let fleet = tokio::spawn(async move { engine.run_fleet(probes).await });
    // The engine owns the only sender, so this loop ends when the fleet
    // future finishes.
    while let Some(event) = rx.recv().await {
        reporter.probe_finished(&event);
    }
    let reports = fleet
        .await
        .map_err(|e| CliError::run_aborted(e.to_string()))?;
    reporter.finish_progress();

    let report = RunReport::assemble(&environment, started_at, reports);
    let json_path = args.output.join("report.json");
    let junit_path = args.output.join("report.xml");
    report.write_json(&json_path)?;
    report.write_junit(&junit_path)?;

    reporter.summary(&report.summary, clock.elapsed());
    reporter.info(&format!(
        "reports: {}, {}",
        json_path.display(),
        junit_path.display()
    ));

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print probe metadata without executing any bodies.
pub fn list_probes(args: &ListArgs) -> CliResult<()> {
    let registry = ProbeRegistry::load(&args.probe_path)?;
    let probes = match args.only_id.as_deref() {
        Some(pattern) => registry.matching(pattern),
        None => registry.probes().to_vec(),
    };

    if args.json {
        let metadata: Vec<&ProbeMetadata> = probes.iter().map(|p| &p.metadata).collect();
        let json =
            serde_json::to_string_pretty(&metadata).map_err(webcompat::WebcompatError::from)?;
        println!("{json}");
        return Ok(());
    }

    for probe in &probes {
        let m = &probe.metadata;
        let bug = m
            .bug
            .map_or_else(|| "-".to_string(), |b| format!("bug {b}"));
        println!("{:<40} {:<12} {}", m.id, bug, m.url);
        let gating = describe_gating(m);
        if !gating.is_empty() {
            println!("{:<40} {}", "", gating.join(", "));
        }
    }
    Ok(())
}

fn build_environment(args: &RunArgs) -> CliResult<EnvironmentProfile> {
    let platform = match args.platform.as_deref() {
        Some(tag) => tag
            .parse::<Platform>()
            .map_err(|e| CliError::invalid_argument(e.to_string()))?,
        None => Platform::detect(),
    };
    let credentials = match &args.credentials {
        Some(path) => CredentialStore::from_file(path).map_err(|e| {
            CliError::config(format!("credentials file {}: {e}", path.display()))
        })?,
        None => CredentialStore::new(),
    };
    let major = args.firefox_version.unwrap_or(DEFAULT_FIREFOX_MAJOR);
    Ok(EnvironmentProfile::new(platform, major)
        .with_headless(args.headless)
        .with_visible_scrollbars(args.visible_scrollbars)
        .with_physical_device(args.physical_device)
        .with_credentials(credentials))
}

fn build_launcher(args: &RunArgs) -> Arc<dyn BrowserLauncher> {
    match &args.webdriver_url {
        Some(url) => Arc::new(RemoteEndpointLauncher::new(url.clone())),
        None => Arc::new(GeckodriverLauncher::new(args.geckodriver.clone())),
    }
}

fn build_launch_options(args: &RunArgs) -> LaunchOptions {
    let mut options = LaunchOptions::new()
        .with_headless(args.headless)
        .with_visible_scrollbars(args.visible_scrollbars);
    if let Some(firefox) = &args.firefox {
        options = options.with_firefox_binary(firefox.clone());
    }
    options
}

fn select_probes(
    registry: &ProbeRegistry,
    filter: Option<&str>,
    default_timeout: Option<u64>,
) -> Vec<Probe> {
    let mut probes = match filter {
        Some(pattern) => registry.matching(pattern),
        None => registry.probes().to_vec(),
    };
    // A probe's own deadline wins; the flag covers the rest.
    if let Some(secs) = default_timeout {
        for probe in &mut probes {
            if probe.metadata.timeout_secs.is_none() {
                probe.metadata.timeout_secs = Some(secs);
            }
        }
    }
    probes
}

fn describe_gating(metadata: &ProbeMetadata) -> Vec<String> {
    let mut parts = Vec::new();
    if !metadata.only_platforms.is_empty() {
        parts.push(format!("only: {}", platform_list(&metadata.only_platforms)));
    }
    if !metadata.skip_platforms.is_empty() {
        parts.push(format!("not: {}", platform_list(&metadata.skip_platforms)));
    }
    match (metadata.min_version, metadata.max_version) {
        (Some(min), Some(max)) => parts.push(format!("Firefox {min}..={max}")),
        (Some(min), None) => parts.push(format!("Firefox {min} or later")),
        (None, Some(max)) => parts.push(format!("Firefox up to {max}")),
        (None, None) => {}
    }
    for capability in &metadata.requires {
        parts.push(format!("requires {}", capability.as_str()));
    }
    if metadata.headed_only {
        parts.push("headed only".to_string());
    }
    if let Some(site) = &metadata.credentials_site {
        parts.push(format!("credentials: {site}"));
    }
    parts
}

fn platform_list(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join("/")
}
