use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use csurf_core::config::Config;
use csurf_core::daw::OfflineDaw;
use csurf_core::ini::load_ini;
use csurf_core::integrator::Integrator;
use csurf_io::{build_pages, PortRegistry};

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("csurf")
        .join("csurf.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path)
        .unwrap_or_else(|_| File::create("/tmp/csurf.log").expect("Cannot create log file"));

    WriteLogger::init(log_level, simplelog::Config::default(), log_file).expect("Failed to initialize logger");

    log::info!("csurf starting (log level: {:?})", log_level);
}

/// `--resource <dir>`, then `runtime.resource_path` from config, then
/// `<config_dir>/csurf`.
fn resource_path(args: &[String], config: &Config) -> PathBuf {
    args.iter()
        .position(|a| a == "--resource")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .or_else(|| config.resource_path())
        .unwrap_or_else(|| dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("csurf"))
}

/// Tracks for the offline session, from `--tracks a,b,c`.
fn track_names(args: &[String]) -> Vec<String> {
    args.iter()
        .position(|a| a == "--tracks")
        .and_then(|i| args.get(i + 1))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| (1..=8).map(|i| format!("Track {}", i)).collect())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = Config::load();
    let resource = resource_path(&args, &config);
    log::info!("resource path {}", resource.display());

    let (ini, diagnostics) = match load_ini(&resource, config.version_token()) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!(target: "ini", "{}", e);
            eprintln!("csurf: {}", e);
            std::process::exit(1);
        }
    };
    for diagnostic in &diagnostics {
        diagnostic.log();
    }

    let mut ports = PortRegistry::new("csurf");
    let (pages, report) = build_pages(&ini, &resource, &mut ports, &config);
    for diagnostic in &report.diagnostics {
        diagnostic.log();
    }
    for (surface, e) in &report.failures {
        eprintln!("csurf: surface {} not started: {}", surface, e);
    }
    if pages.iter().all(|p| p.surfaces().is_empty()) {
        eprintln!("csurf: no surfaces could be started");
        std::process::exit(1);
    }

    let mut daw = OfflineDaw::new().with_resource_path(&resource).with_wall_clock();
    for name in track_names(&args) {
        daw.add_track(&name);
    }

    let poll = Duration::from_millis(config.poll_interval_ms());
    let mut integrator = Integrator::new(Box::new(daw), config);
    for page in pages {
        integrator.add_page(page);
    }
    integrator.initialize();
    log::info!("{} page(s) running", integrator.pages().len());

    loop {
        integrator.run();
        std::thread::sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resource_flag_wins() {
        let path = resource_path(&args(&["csurf", "--resource", "/srv/csi"]), &Config::embedded());
        assert_eq!(path, PathBuf::from("/srv/csi"));
    }

    #[test]
    fn test_track_list_is_split_on_commas() {
        assert_eq!(track_names(&args(&["csurf", "--tracks", "Kick, Snare,,Bass"])), vec!["Kick", "Snare", "Bass"]);
        assert_eq!(track_names(&args(&["csurf"])).len(), 8);
    }
}
