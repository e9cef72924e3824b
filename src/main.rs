use cargonetsim::app::{App, Backends};
use cargonetsim::backend::heartbeat::HeartbeatConfig;
use cargonetsim::config::SimulationConfig;
use cargonetsim::coords;
use cargonetsim::document::objects::{Container, Mode, TerminalType};
use cargonetsim::document::scene::SceneKind;
use log::*;
use std::path::Path;
use std::time::Duration;

fn main() {
    simple_logging::log_to_stderr(log::LevelFilter::Info);
    info!("Starting {} v{}.", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    // optional simulation configuration for the truck flow
    let config = match std::env::args().nth(1) {
        Some(path) => match SimulationConfig::load(Path::new(&path)) {
            Ok(c) => {
                info!("loaded simulation config with {} networks", c.networks.len());
                Some(c)
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let mut app = App::new(Backends::in_process());
    app.start_heartbeat(HeartbeatConfig::default());

    if let Err(e) = plan_sample_corridor(&mut app, config.as_ref()) {
        error!("planning failed: {}", e);
    }

    app.stop_heartbeat();
}

/// Headless exercise of the full pipeline against the in-process
/// backends: a small two-hop corridor, top-3 paths, then simulation
/// fan-out for the best path.
fn plan_sample_corridor(
    app: &mut App,
    config: Option<&SimulationConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = &mut app.document;
    let origin = doc.add_terminal(
        "Factory",
        TerminalType::Origin,
        "Default Region",
        coords::geodetic_to_scene(10.0, 54.0),
    )?;
    let port = doc.add_terminal(
        "North Port",
        TerminalType::SeaPort,
        "Default Region",
        coords::geodetic_to_scene(10.5, 54.3),
    )?;
    let hub = doc.add_terminal(
        "Inland Hub",
        TerminalType::IntermodalLand,
        "Default Region",
        coords::geodetic_to_scene(11.0, 53.8),
    )?;
    let destination = doc.add_terminal(
        "Distribution Center",
        TerminalType::Destination,
        "Default Region",
        coords::geodetic_to_scene(11.5, 54.1),
    )?;
    for i in 0..25 {
        doc.get_terminal_mut(&origin)
            .unwrap()
            .containers
            .push(Container::new(format!("container-{:03}", i), origin.clone()));
    }
    doc.connect_terminals(SceneKind::Region, &origin, &port, Mode::Truck)?;
    doc.connect_terminals(SceneKind::Region, &origin, &hub, Mode::Truck)?;
    doc.connect_terminals(SceneKind::Region, &port, &destination, Mode::Ship)?;
    doc.connect_terminals(SceneKind::Region, &hub, &destination, Mode::Rail)?;

    app.find_paths(3);
    wait_idle(app);
    if let Some(e) = &app.document.analysis.last_error {
        return Err(Box::new(e.clone()));
    }
    for (i, ranked) in app.document.analysis.paths.iter().enumerate() {
        let stops: Vec<String> = ranked
            .record
            .terminal_sequence()
            .iter()
            .map(|id| {
                app.document
                    .get_terminal(id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
        info!(
            "path {}: {} ({:.1} km)",
            i + 1,
            stops.join(" -> "),
            ranked.record.total_distance / 1000.0
        );
    }

    app.document.analysis.set_checked(0, true);
    app.validate_checked_paths(config);
    wait_idle(app);
    if let Some(e) = &app.document.analysis.last_error {
        return Err(Box::new(e.clone()));
    }
    if let Some(summary) = &app.document.analysis.fanout_summary {
        info!(
            "validated: {} trains, {} ships, {} truck trips, {} segments skipped",
            summary.trains, summary.ships, summary.truck_trips, summary.skipped_segments
        );
    }
    Ok(())
}

fn wait_idle(app: &mut App) {
    while app.document.analysis.busy() {
        app.check();
        std::thread::sleep(Duration::from_millis(10));
    }
}
