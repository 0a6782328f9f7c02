use crate::lane::LaneObservation;
use crate::model::SpeedCommand;
use crate::network::TrafficNetwork;
use crate::vehicle::VehicleKinematics;
use crate::{Error, LaneId, Result, VehicleId};
use log::debug;
use rand_distr::{Distribution, Normal};
use slotmap::SlotMap;

/// A minimal straight-lane traffic simulation which integrates vehicle positions
/// from commanded speeds.
///
/// Stands in for an external simulator in tests and demonstrations.
pub struct LaneSimulator {
    /// The lanes in the network.
    lanes: SlotMap<LaneId, Lane>,
    /// The vehicles being simulated.
    vehicles: SlotMap<VehicleId, Vehicle>,
    /// The time step in s.
    dt: f64,
    /// The current frame of simulation.
    frame: usize,
    /// The simulation ends after this many frames, if set.
    end_frame: Option<usize>,
    /// The number of vehicles that have driven off the end of their lane.
    exited: usize,
    /// Speed factors of newly added vehicles are drawn from this, if set.
    speed_factors: Option<Normal<f64>>,
}

/// The attributes of a simulated lane.
pub struct LaneAttributes<'a> {
    /// The lane's name.
    pub name: &'a str,
    /// The length of the lane in m.
    pub length: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The maximum acceleration of the vehicle, in m/s<sup>2</sup>.
    pub max_acc: f64,
    /// The maximum deceleration of the vehicle, a positive number in m/s<sup>2</sup>.
    pub max_dec: f64,
    /// The minimum gap to the vehicle ahead, in m.
    pub min_gap: f64,
    /// The reaction time in s.
    pub reaction_time: f64,
}

/// Vehicles entering at the start of a lane at a regular interval.
#[derive(Clone, Copy, Debug)]
pub struct Inflow {
    /// The time between insertions in s.
    pub period: f64,
    /// The speed of inserted vehicles in m/s.
    pub speed: f64,
    /// The attributes of inserted vehicles.
    pub attributes: VehicleAttributes,
}

struct Lane {
    name: String,
    length: f64,
    speed_limit: f64,
    /// The vehicles on the lane, rearmost first.
    vehicles: Vec<VehicleId>,
    inflow: Option<Inflow>,
    /// The time since the last insertion in s.
    since_inflow: f64,
}

struct Vehicle {
    attributes: VehicleAttributes,
    lane: LaneId,
    /// The position of the front of the vehicle in m.
    pos: f64,
    vel: f64,
    acc: f64,
    /// Multiplies the lane's speed limit.
    speed_factor: f64,
    command: Option<SpeedCommand>,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            length: 5.0,
            max_acc: 2.6,
            max_dec: 4.5,
            min_gap: 2.5,
            reaction_time: 1.0,
        }
    }
}

impl LaneSimulator {
    /// Creates a new simulation with the given time step in s.
    pub fn new(dt: f64) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::Config(format!("time step must be positive, got {}", dt)));
        }
        Ok(Self {
            lanes: SlotMap::with_key(),
            vehicles: SlotMap::with_key(),
            dt,
            frame: 0,
            end_frame: None,
            exited: 0,
            speed_factors: None,
        })
    }

    /// Ends the simulation after `duration` seconds.
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.end_frame = Some((duration / self.dt).round() as usize);
        self
    }

    /// Adds a lane to the network.
    pub fn add_lane(&mut self, attributes: &LaneAttributes) -> LaneId {
        self.lanes.insert(Lane {
            name: attributes.name.to_owned(),
            length: attributes.length,
            speed_limit: attributes.speed_limit,
            vehicles: vec![],
            inflow: None,
            since_inflow: 0.0,
        })
    }

    /// Inserts vehicles at the start of the lane every `inflow.period` seconds,
    /// whenever there is room.
    pub fn set_inflow(&mut self, lane_id: LaneId, inflow: Inflow) {
        let lane = &mut self.lanes[lane_id];
        lane.inflow = Some(inflow);
        lane.since_inflow = inflow.period;
    }

    /// Adds a vehicle to the simulation.
    ///
    /// # Parameters
    /// * `lane` - The lane to place the vehicle on
    /// * `pos` - The position of the vehicle's front along the lane in m
    /// * `vel` - The initial speed in m/s
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        lane: LaneId,
        pos: f64,
        vel: f64,
    ) -> VehicleId {
        let speed_factor = self
            .speed_factors
            .as_ref()
            .map_or(1.0, sample_speed_factor);
        let vehicle_id = self.vehicles.insert(Vehicle {
            attributes: *attributes,
            lane,
            pos,
            vel,
            acc: 0.0,
            speed_factor,
            command: None,
        });
        self.insert_vehicle(lane, vehicle_id);
        vehicle_id
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            self.lanes[vehicle.lane].vehicles.retain(|v| *v != id);
        }
    }

    /// Randomly assigns a speed factor to each vehicle, which is sampled from a normal
    /// distribution with a mean of 1 (no adjustment) and standard deviation of `stddev`.
    /// Vehicles added later, including from inflows, are assigned one too.
    pub fn randomise_speed_factors(&mut self, stddev: f64) -> Result<()> {
        let distr = Normal::new(1.0, stddev)
            .map_err(|err| Error::Config(format!("speed factor distribution: {}", err)))?;
        for vehicle in self.vehicles.values_mut() {
            vehicle.speed_factor = sample_speed_factor(&distr);
        }
        self.speed_factors = Some(distr);
        Ok(())
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The number of vehicles that have left the network.
    pub fn exited(&self) -> usize {
        self.exited
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) {
        self.integrate();
        self.advance_vehicles();
        self.apply_inflows();
        self.frame += 1;
    }

    /// Moves every vehicle at its commanded speed, or toward its speed limit if it has none.
    fn integrate(&mut self) {
        let dt = self.dt;
        for vehicle in self.vehicles.values_mut() {
            let limit = vehicle.speed_factor * self.lanes[vehicle.lane].speed_limit;
            let vel = match vehicle.command.take() {
                Some(SpeedCommand::Target(vel)) => f64::max(vel, 0.0),
                Some(SpeedCommand::FreeFlow) | None => {
                    if vehicle.vel < limit {
                        f64::min(vehicle.vel + vehicle.attributes.max_acc * dt, limit)
                    } else {
                        f64::max(vehicle.vel - vehicle.attributes.max_dec * dt, limit)
                    }
                }
            };
            vehicle.acc = (vel - vehicle.vel) / dt;
            vehicle.pos += 0.5 * (vehicle.vel + vel) * dt;
            vehicle.vel = vel;
        }
        for lane in self.lanes.values_mut() {
            let vehicles = &self.vehicles;
            lane.vehicles
                .sort_by(|a, b| vehicles[*a].pos.total_cmp(&vehicles[*b].pos));
        }
    }

    /// Removes vehicles that have driven past the end of their lane.
    fn advance_vehicles(&mut self) {
        let exited = self
            .vehicles
            .iter()
            .filter(|(_, v)| v.pos - v.attributes.length > self.lanes[v.lane].length)
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        for vehicle_id in exited {
            self.remove_vehicle(vehicle_id);
            self.exited += 1;
        }
    }

    /// Inserts vehicles from lane inflows.
    fn apply_inflows(&mut self) {
        let mut inserts = vec![];
        for (lane_id, lane) in &mut self.lanes {
            let inflow = match lane.inflow {
                Some(inflow) => inflow,
                None => continue,
            };
            lane.since_inflow += self.dt;
            if lane.since_inflow < inflow.period {
                continue;
            }
            let attribs = inflow.attributes;
            let has_room = lane.vehicles.first().map_or(true, |id| {
                let rear = &self.vehicles[*id];
                rear.pos - rear.attributes.length >= attribs.length + attribs.min_gap
            });
            if has_room {
                lane.since_inflow = 0.0;
                inserts.push((lane_id, inflow));
            }
        }
        for (lane_id, inflow) in inserts {
            let id = self.add_vehicle(&inflow.attributes, lane_id, inflow.attributes.length, inflow.speed);
            debug!("Frame {}: inserted {:?} on lane {:?}", self.frame, id, lane_id);
        }
    }

    /// Inserts the vehicle with the given ID into the lane, keeping the lane ordered.
    fn insert_vehicle(&mut self, lane_id: LaneId, id: VehicleId) {
        let vehicles = &self.vehicles;
        let lane = &mut self.lanes[lane_id];
        let veh_pos = vehicles[id].pos;
        let idx = lane
            .vehicles
            .iter()
            .position(|v| vehicles[*v].pos > veh_pos)
            .unwrap_or(lane.vehicles.len());
        lane.vehicles.insert(idx, id);
    }

    fn lane(&self, lane_id: LaneId) -> Result<&Lane> {
        self.lanes.get(lane_id).ok_or(Error::UnknownLane(lane_id))
    }

    fn get_vehicle(&self, vehicle_id: VehicleId) -> Result<&Vehicle> {
        self.vehicles
            .get(vehicle_id)
            .ok_or(Error::UnknownVehicle(vehicle_id))
    }
}

fn sample_speed_factor(distr: &Normal<f64>) -> f64 {
    distr.sample(&mut rand::thread_rng()).clamp(0.75, 1.25)
}

impl TrafficNetwork for LaneSimulator {
    fn lanes(&self) -> Vec<LaneId> {
        self.lanes.keys().collect()
    }

    fn lane_name(&self, lane_id: LaneId) -> Result<&str> {
        self.lane(lane_id).map(|lane| lane.name.as_str())
    }

    fn lane_length(&self, lane_id: LaneId) -> Result<f64> {
        self.lane(lane_id).map(|lane| lane.length)
    }

    /// Empty lanes report their speed limit as the mean speed.
    fn observe_lane(&self, lane_id: LaneId) -> Result<LaneObservation> {
        let lane = self.lane(lane_id)?;
        let vehicles = lane.vehicles.iter().map(|id| &self.vehicles[*id]);
        let count = lane.vehicles.len();
        let mean_speed = if count == 0 {
            lane.speed_limit
        } else {
            vehicles.clone().map(|v| v.vel).sum::<f64>() / count as f64
        };
        let occupied = vehicles
            .map(|v| f64::min(v.pos, lane.length) - f64::max(v.pos - v.attributes.length, 0.0))
            .map(|len| f64::max(len, 0.0))
            .sum::<f64>();
        Ok(LaneObservation {
            mean_speed,
            density: (occupied / lane.length).clamp(0.0, 1.0),
            vehicles: lane.vehicles.clone(),
        })
    }

    fn vehicles(&self) -> Vec<VehicleId> {
        self.vehicles.keys().collect()
    }

    fn vehicle(&self, vehicle_id: VehicleId) -> Result<VehicleKinematics> {
        let vehicle = self.get_vehicle(vehicle_id)?;
        let lane = self.lane(vehicle.lane)?;
        let attribs = &vehicle.attributes;
        Ok(VehicleKinematics {
            id: vehicle_id,
            length: attribs.length,
            max_accel: attribs.max_acc,
            max_decel: attribs.max_dec,
            min_gap: attribs.min_gap,
            reaction_time: attribs.reaction_time,
            max_speed: vehicle.speed_factor * lane.speed_limit,
            lane_id: vehicle.lane,
            position: vehicle.pos,
            speed: vehicle.vel,
            measured_accel: Some(vehicle.acc),
        })
    }

    fn leader(&self, vehicle_id: VehicleId, horizon: f64) -> Result<Option<VehicleId>> {
        let vehicle = self.get_vehicle(vehicle_id)?;
        let lane = self.lane(vehicle.lane)?;
        let leader = lane
            .vehicles
            .iter()
            .skip_while(|id| **id != vehicle_id)
            .nth(1)
            .copied()
            .filter(|id| {
                let leader = &self.vehicles[*id];
                leader.pos - leader.attributes.length - vehicle.pos <= horizon
            });
        Ok(leader)
    }

    fn command_speed(&mut self, vehicle_id: VehicleId, command: SpeedCommand) -> Result<()> {
        let vehicle = self
            .vehicles
            .get_mut(vehicle_id)
            .ok_or(Error::UnknownVehicle(vehicle_id))?;
        vehicle.command = Some(command);
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        self.step();
        Ok(self.end_frame.map_or(true, |end| self.frame < end))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn setup() -> (LaneSimulator, LaneId) {
        let mut sim = LaneSimulator::new(0.5).unwrap();
        let lane = sim.add_lane(&LaneAttributes {
            name: "main_0",
            length: 100.0,
            speed_limit: 10.0,
        });
        (sim, lane)
    }

    #[test]
    fn leader_is_next_vehicle_ahead() {
        let (mut sim, lane) = setup();
        let attribs = VehicleAttributes::default();
        let c = sim.add_vehicle(&attribs, lane, 80.0, 0.0);
        let a = sim.add_vehicle(&attribs, lane, 10.0, 0.0);
        let b = sim.add_vehicle(&attribs, lane, 40.0, 0.0);

        assert_eq!(sim.leader(a, 300.0).unwrap(), Some(b));
        assert_eq!(sim.leader(b, 300.0).unwrap(), Some(c));
        assert_eq!(sim.leader(c, 300.0).unwrap(), None);
        assert_eq!(sim.leader(a, 20.0).unwrap(), None);
    }

    #[test]
    fn observation() {
        let (mut sim, lane) = setup();
        assert_eq!(sim.observe_lane(lane).unwrap().mean_speed, 10.0);
        let attribs = VehicleAttributes::default();
        sim.add_vehicle(&attribs, lane, 20.0, 4.0);
        sim.add_vehicle(&attribs, lane, 50.0, 8.0);
        // Only half of this one is on the lane
        sim.add_vehicle(&attribs, lane, 2.5, 0.0);
        let obs = sim.observe_lane(lane).unwrap();
        assert_approx_eq!(obs.mean_speed, 4.0);
        assert_approx_eq!(obs.density, 0.125);
        assert_eq!(obs.vehicles.len(), 3);
    }

    #[test]
    fn integrates_commanded_speed() {
        let (mut sim, lane) = setup();
        let veh = sim.add_vehicle(&VehicleAttributes::default(), lane, 10.0, 4.0);
        sim.command_speed(veh, SpeedCommand::Target(6.0)).unwrap();
        sim.step();
        let v = sim.vehicle(veh).unwrap();
        assert_approx_eq!(v.speed, 6.0);
        assert_approx_eq!(v.position, 12.5);
        assert_approx_eq!(v.measured_accel.unwrap(), 4.0);
    }

    #[test]
    fn free_flow_approaches_limit() {
        let (mut sim, lane) = setup();
        let veh = sim.add_vehicle(&VehicleAttributes::default(), lane, 10.0, 9.0);
        sim.command_speed(veh, SpeedCommand::FreeFlow).unwrap();
        sim.step();
        assert_approx_eq!(sim.vehicle(veh).unwrap().speed, 10.0);
    }

    #[test]
    fn vehicles_exit_at_lane_end() {
        let (mut sim, lane) = setup();
        let veh = sim.add_vehicle(&VehicleAttributes::default(), lane, 104.0, 10.0);
        sim.step();
        assert!(sim.vehicle(veh).is_err());
        assert_eq!(sim.exited(), 1);
        assert!(sim.observe_lane(lane).unwrap().vehicles.is_empty());
    }

    #[test]
    fn inflow_inserts_with_room() {
        let (mut sim, lane) = setup();
        sim.set_inflow(
            lane,
            Inflow {
                period: 1.0,
                speed: 10.0,
                attributes: VehicleAttributes::default(),
            },
        );
        for _ in 0..8 {
            sim.step();
        }
        let count = sim.vehicles().len();
        assert!(count >= 2 && count <= 8, "{count} vehicles");
    }

    #[test]
    fn time_step_must_be_positive() {
        for dt in [0.0, -0.1, f64::NAN] {
            assert!(matches!(LaneSimulator::new(dt), Err(Error::Config(_))));
        }
    }

    #[test]
    fn speed_factors_scale_limit() {
        let (mut sim, lane) = setup();
        let attribs = VehicleAttributes::default();
        let vehicles = (0..20)
            .map(|i| sim.add_vehicle(&attribs, lane, 4.0 * i as f64, 0.0))
            .collect::<Vec<_>>();
        for id in &vehicles {
            assert_eq!(sim.vehicle(*id).unwrap().max_speed, 10.0);
        }

        sim.randomise_speed_factors(0.1).unwrap();
        let limits = vehicles
            .iter()
            .map(|id| sim.vehicle(*id).unwrap().max_speed)
            .collect::<Vec<_>>();
        assert!(limits.iter().all(|v| (7.5..=12.5).contains(v)));
        assert!(limits.iter().any(|v| *v != limits[0]));

        // A huge spread saturates at the clamp, for new vehicles too
        sim.randomise_speed_factors(1e9).unwrap();
        let late = sim.add_vehicle(&attribs, lane, 90.0, 0.0);
        let limit = sim.vehicle(late).unwrap().max_speed;
        assert!(limit == 7.5 || limit == 12.5, "{limit}");
    }

    #[test]
    fn rejects_invalid_speed_spread() {
        let (mut sim, _) = setup();
        assert!(matches!(
            sim.randomise_speed_factors(-1.0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn ends_after_duration() {
        let (sim, _) = setup();
        let mut sim = sim.with_duration(1.0);
        assert!(sim.advance().unwrap());
        assert!(!sim.advance().unwrap());
    }
}
