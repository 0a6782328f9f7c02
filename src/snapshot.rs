use crate::network::TrafficNetwork;
use crate::vehicle::VehicleKinematics;
use crate::{Result, VehicleId};
use log::trace;
use slotmap::SecondaryMap;

/// The vehicle population frozen at the start of a tick.
///
/// Every leader and gap computation within a tick reads from the same snapshot,
/// so the order in which vehicles are controlled does not matter.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// The vehicles, by ID.
    vehicles: SecondaryMap<VehicleId, VehicleKinematics>,
    /// The vehicle IDs in the order the network listed them.
    order: Vec<VehicleId>,
}

/// A resolved leader of some vehicle.
#[derive(Clone, Copy, Debug)]
pub struct Leader<'a> {
    /// The leader's kinematics.
    pub kinematics: &'a VehicleKinematics,
    /// The clear distance from the follower's front to the leader's rear, in m.
    pub gap: f64,
}

impl Snapshot {
    /// Reads and validates every vehicle in the network.
    pub fn capture(network: &impl TrafficNetwork) -> Result<Self> {
        let vehicles = network
            .vehicles()
            .into_iter()
            .map(|id| network.vehicle(id))
            .collect::<Result<Vec<_>>>()?;
        Self::from_vehicles(vehicles)
    }

    /// Builds a snapshot from vehicles already read.
    pub fn from_vehicles(vehicles: impl IntoIterator<Item = VehicleKinematics>) -> Result<Self> {
        let mut snapshot = Self::default();
        for vehicle in vehicles {
            vehicle.validate()?;
            snapshot.order.push(vehicle.id);
            snapshot.vehicles.insert(vehicle.id, vehicle);
        }
        Ok(snapshot)
    }

    /// The number of vehicles.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Gets a vehicle.
    pub fn get(&self, vehicle_id: VehicleId) -> Option<&VehicleKinematics> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over the vehicles.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleKinematics> {
        self.order.iter().map(|id| &self.vehicles[*id])
    }

    /// Resolves the leader the network reported for `follower`.
    ///
    /// The leader is discarded if it is not part of this snapshot, is on another lane,
    /// or its gap exceeds `horizon`. The gap is measured from snapshot positions.
    pub fn resolve_leader(
        &self,
        follower: &VehicleKinematics,
        leader_id: Option<VehicleId>,
        horizon: f64,
    ) -> Option<Leader<'_>> {
        let leader = self.vehicles.get(leader_id?)?;
        if leader.id == follower.id || leader.lane_id != follower.lane_id {
            trace!("{:?}: ignoring leader {:?} on another lane", follower.id, leader.id);
            return None;
        }
        let gap = follower.gap_to(leader);
        if gap > horizon {
            return None;
        }
        Some(Leader {
            kinematics: leader,
            gap,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::test::car;
    use crate::{Error, LaneId};
    use slotmap::SlotMap;

    fn snapshot() -> (Snapshot, Vec<VehicleId>) {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let vehicles = [(0.0, 8.0), (30.0, 8.0), (400.0, 8.0)]
            .into_iter()
            .map(|(pos, speed)| VehicleKinematics {
                id: ids.insert(()),
                ..car(pos, speed)
            })
            .collect::<Vec<_>>();
        let ids = vehicles.iter().map(|v| v.id).collect();
        (Snapshot::from_vehicles(vehicles).unwrap(), ids)
    }

    #[test]
    fn resolves_gap_from_snapshot() {
        let (snapshot, ids) = snapshot();
        let follower = snapshot.get(ids[0]).unwrap();
        let leader = snapshot.resolve_leader(follower, Some(ids[1]), 300.0).unwrap();
        assert_eq!(leader.kinematics.id, ids[1]);
        assert_eq!(leader.gap, 25.0);
    }

    #[test]
    fn discards_distant_and_missing_leaders() {
        let (snapshot, ids) = snapshot();
        let follower = snapshot.get(ids[1]).unwrap();
        assert!(snapshot.resolve_leader(follower, Some(ids[2]), 300.0).is_none());
        assert!(snapshot.resolve_leader(follower, Some(ids[2]), 500.0).is_some());
        assert!(snapshot.resolve_leader(follower, None, 300.0).is_none());
        assert!(snapshot.resolve_leader(follower, Some(ids[1]), 300.0).is_none());
    }

    #[test]
    fn discards_leader_on_other_lane() {
        let (mut snapshot, ids) = snapshot();
        let mut lanes = SlotMap::<LaneId, ()>::with_key();
        lanes.insert(());
        snapshot.vehicles[ids[1]].lane_id = lanes.insert(());
        let follower = snapshot.get(ids[0]).unwrap();
        assert!(snapshot.resolve_leader(follower, Some(ids[1]), 300.0).is_none());
    }

    #[test]
    fn rejects_invalid_vehicles() {
        let mut vehicle = car(0.0, 1.0);
        vehicle.max_decel = 0.0;
        let result = Snapshot::from_vehicles([vehicle]);
        assert!(matches!(result, Err(Error::InvalidAttribute { .. })));
    }
}
