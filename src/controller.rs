use crate::calibration::SensitivityCalibration;
use crate::config::ControllerConfig;
use crate::estimator::LaneStateEstimator;
use crate::model::SpeedCommand;
use crate::network::TrafficNetwork;
use crate::snapshot::Snapshot;
use crate::{Error, Result, VehicleId};
use log::{debug, info, trace};

/// Whether the controller is driving a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// A summary of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    /// The tick index, starting at 1.
    pub frame: usize,
    /// The number of vehicles that were given a command.
    pub vehicles: usize,
    /// The number of vehicles that had a leader.
    pub following: usize,
    /// The smallest gap between a follower and its leader, in m.
    pub min_gap: Option<f64>,
}

impl TickReport {
    /// The number of vehicles that were left to free flow.
    pub fn free_flow(&self) -> usize {
        self.vehicles - self.following
    }
}

/// Drives a [TrafficNetwork], computing a speed command for every vehicle each tick.
pub struct Controller {
    /// The configuration.
    config: ControllerConfig,
    /// Whether a run is in progress.
    state: RunState,
    /// The lane state estimator, built when the run starts.
    estimator: Option<LaneStateEstimator>,
    /// A calibration store supplied before the run started.
    calibration: Option<SensitivityCalibration>,
    /// The commands computed this tick, committed once every vehicle has been processed.
    commands: Vec<(VehicleId, SpeedCommand)>,
}

impl Controller {
    /// Creates a new, idle controller.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RunState::Idle,
            estimator: None,
            calibration: None,
            commands: vec![],
        })
    }

    /// Uses the given calibration store instead of the one named in the configuration.
    pub fn with_calibration(mut self, calibration: SensitivityCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Gets the run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Gets the lane state estimator, once the controller has been started.
    pub fn estimator(&self) -> Option<&LaneStateEstimator> {
        self.estimator.as_ref()
    }

    /// Enumerates the network's lanes and begins a run.
    ///
    /// A controller can only be started once.
    pub fn start(&mut self, network: &impl TrafficNetwork) -> Result<()> {
        if self.estimator.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let lanes = network
            .lanes()
            .into_iter()
            .map(|id| -> Result<_> { Ok((id, network.lane_name(id)?, network.lane_length(id)?)) })
            .collect::<Result<Vec<_>>>()?;

        let calibration = match (self.calibration.take(), &self.config.calibration) {
            (Some(calibration), _) => Some(calibration),
            (None, Some(path)) => Some(SensitivityCalibration::load(
                path,
                lanes.iter().map(|(id, name, _)| (*id, *name)),
            )?),
            (None, None) => None,
        };

        let mut estimator = LaneStateEstimator::new(
            lanes.iter().copied(),
            self.config.epsilon,
            self.config.history,
        );
        if let Some(calibration) = calibration {
            estimator = estimator.with_calibration(calibration);
        }

        info!(
            "Starting controller: {} lanes, {} model, dt = {}s",
            lanes.len(),
            self.config.model.name(),
            self.config.dt
        );
        self.estimator = Some(estimator);
        self.state = RunState::Running;
        Ok(())
    }

    /// Ends the run. The network is left as of the last committed tick.
    pub fn stop(&mut self) {
        if self.state == RunState::Running {
            let frame = self.estimator.as_ref().map_or(0, |e| e.frame());
            info!("Stopping controller after {} ticks", frame);
        }
        self.state = RunState::Idle;
    }

    /// Performs one tick: refreshes every lane, then computes and commits a speed
    /// command for every vehicle.
    ///
    /// Commands are committed only after every vehicle has been processed, so all
    /// leader and gap computations see the network as it was at the start of the tick.
    pub fn tick(&mut self, network: &mut impl TrafficNetwork) -> Result<TickReport> {
        let estimator = match (self.state, self.estimator.as_mut()) {
            (RunState::Running, Some(estimator)) => estimator,
            _ => return Err(Error::NotRunning),
        };

        // Lane phase
        estimator.step();
        let lane_ids = estimator.lane_ids().collect::<Vec<_>>();
        for lane_id in lane_ids {
            let obs = network.observe_lane(lane_id)?;
            estimator.update(lane_id, &obs)?;
        }

        // Vehicle phase
        let snapshot = Snapshot::capture(&*network)?;
        let mut report = TickReport {
            frame: estimator.frame(),
            ..Default::default()
        };
        self.commands.clear();
        for follower in snapshot.iter() {
            let leader_id = network.leader(follower.id, self.config.sensing_horizon)?;
            let leader = snapshot.resolve_leader(follower, leader_id, self.config.sensing_horizon);
            let lane = estimator.get(follower.lane_id)?;
            let alpha = self.config.fixed_sensitivity.unwrap_or(lane.sensitivity());
            let command = self.config.model.compute(
                follower,
                leader.map(|l| l.kinematics),
                alpha,
                self.config.dt,
            )?;
            if let SpeedCommand::Target(speed) = command {
                if !speed.is_finite() {
                    return Err(Error::NonFiniteCommand {
                        vehicle: follower.id,
                    });
                }
            }
            trace!("{:?}: {:?} (alpha {:.3})", follower.id, command, alpha);

            report.vehicles += 1;
            if let Some(leader) = leader {
                report.following += 1;
                report.min_gap = Some(report.min_gap.map_or(leader.gap, |g| g.min(leader.gap)));
            }
            self.commands.push((follower.id, command));
        }

        // Commit phase
        for (vehicle_id, command) in self.commands.drain(..) {
            network.command_speed(vehicle_id, command)?;
        }

        debug!(
            "Tick {}: {} vehicles, {} following, min gap {:?}",
            report.frame, report.vehicles, report.following, report.min_gap
        );
        let interval = self.config.report_interval;
        if interval > 0 && report.frame % interval == 0 {
            estimator.log_summary();
        }
        Ok(report)
    }

    /// Runs until the network ends, or `keep_going` returns `false` for a tick's report.
    /// Starts the controller first if it is idle. Returns the number of ticks performed.
    ///
    /// The run is stopped on the first error.
    pub fn run_until(
        &mut self,
        network: &mut impl TrafficNetwork,
        mut keep_going: impl FnMut(&TickReport) -> bool,
    ) -> Result<usize> {
        if self.state == RunState::Idle {
            self.start(&*network)?;
        }

        let mut ticks = 0;
        let result = loop {
            let report = match self.tick(network) {
                Ok(report) => report,
                Err(err) => break Err(err),
            };
            ticks += 1;
            match network.advance() {
                Ok(true) => {}
                Ok(false) => break Ok(ticks),
                Err(err) => break Err(err),
            }
            if !keep_going(&report) {
                break Ok(ticks);
            }
        };

        self.stop();
        result
    }

    /// Runs until the controller has performed `max_ticks` ticks in total, or the network ends.
    /// At least one tick is performed. [Read more](Self::run_until).
    pub fn run(&mut self, network: &mut impl TrafficNetwork, max_ticks: usize) -> Result<usize> {
        self.run_until(network, |report| report.frame < max_ticks)
    }
}
