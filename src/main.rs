use log::info;
use std::time::Instant;
use traffic_control::{
    Controller, ControllerConfig, Inflow, LaneAttributes, LaneSimulator, VehicleAttributes,
};

/// The simulated time in s.
const RUN_TIME: f64 = 300.0;
/// The spread of vehicle speed factors around the speed limit.
const SPEED_FACTOR_STDDEV: f64 = 0.1;

fn main() -> traffic_control::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };

    let mut sim = LaneSimulator::new(config.dt)?.with_duration(RUN_TIME);
    sim.randomise_speed_factors(SPEED_FACTOR_STDDEV)?;
    for (name, period) in [("east_0", 2.0), ("east_1", 4.0)] {
        let lane = sim.add_lane(&LaneAttributes {
            name,
            length: 1000.0,
            speed_limit: 13.89,
        });
        sim.set_inflow(
            lane,
            Inflow {
                period,
                speed: 10.0,
                attributes: VehicleAttributes::default(),
            },
        );
    }

    let mut controller = Controller::new(config)?;
    let start = Instant::now();
    let mut min_gap = f64::INFINITY;
    let ticks = controller.run_until(&mut sim, |report| {
        min_gap = report.min_gap.map_or(min_gap, |g| g.min(min_gap));
        true
    })?;

    info!(
        "Simulated {} ticks in {:?}: {} vehicles exited, smallest gap {:.2} m",
        ticks,
        start.elapsed(),
        sim.exited(),
        min_gap
    );
    if let Some(estimator) = controller.estimator() {
        for lane in estimator.states() {
            info!(
                "Lane `{}`: v = {:.2} m/s, rho = {:.3}, q = {:.3}, alpha = {:.3}",
                lane.name(),
                lane.mean_speed(),
                lane.density(),
                lane.flow(),
                lane.sensitivity()
            );
        }
    }
    Ok(())
}
