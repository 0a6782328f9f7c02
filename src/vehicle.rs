use crate::{Error, LaneId, Result, VehicleId};

/// A snapshot of a vehicle's attributes and motion, taken at the start of a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleKinematics {
    /// The vehicle's ID.
    pub id: VehicleId,
    /// The vehicle length in m.
    pub length: f64,
    /// The maximum acceleration of the vehicle, in m/s<sup>2</sup>.
    pub max_accel: f64,
    /// The maximum deceleration of the vehicle, a positive number in m/s<sup>2</sup>.
    pub max_decel: f64,
    /// The minimum gap to maintain to the vehicle ahead, in m.
    pub min_gap: f64,
    /// The reaction time in s.
    pub reaction_time: f64,
    /// The speed the vehicle is allowed to travel at, in m/s.
    pub max_speed: f64,
    /// The lane the vehicle is on.
    pub lane_id: LaneId,
    /// The longitudinal position of the front of the vehicle along its lane, in m.
    pub position: f64,
    /// The speed in m/s.
    pub speed: f64,
    /// The acceleration realised over the previous tick, in m/s<sup>2</sup>, if known.
    pub measured_accel: Option<f64>,
}

impl VehicleKinematics {
    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.position - self.length
    }

    /// The clear distance between this vehicle's front and the `leader`'s rear, in m.
    /// Negative when the two overlap.
    pub fn gap_to(&self, leader: &VehicleKinematics) -> f64 {
        leader.position - self.position - leader.length
    }

    /// The realised acceleration, which some models cannot do without.
    pub fn require_measured_accel(&self) -> Result<f64> {
        self.measured_accel.ok_or(Error::MissingAttribute {
            vehicle: self.id,
            attribute: "measured_accel",
        })
    }

    /// Checks that the attributes are physically meaningful.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("length", self.length),
            ("max_accel", self.max_accel),
            ("max_decel", self.max_decel),
            ("min_gap", self.min_gap),
            ("reaction_time", self.reaction_time),
        ];
        let non_negative = [("max_speed", self.max_speed), ("speed", self.speed)];
        let finite = [
            ("position", self.position),
            ("measured_accel", self.measured_accel.unwrap_or(0.0)),
        ];

        let invalid = positive
            .into_iter()
            .find(|(_, value)| !(*value > 0.0 && value.is_finite()))
            .or_else(|| {
                non_negative
                    .into_iter()
                    .find(|(_, value)| !(*value >= 0.0 && value.is_finite()))
            })
            .or_else(|| finite.into_iter().find(|(_, value)| !value.is_finite()));

        match invalid {
            Some((attribute, value)) => Err(Error::InvalidAttribute {
                vehicle: self.id,
                attribute,
                value,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use slotmap::{KeyData, SlotMap};

    /// A vehicle with typical passenger car attributes.
    pub(crate) fn car(position: f64, speed: f64) -> VehicleKinematics {
        VehicleKinematics {
            id: VehicleId::from(KeyData::from_ffi(1)),
            length: 5.0,
            max_accel: 2.0,
            max_decel: 4.5,
            min_gap: 2.5,
            reaction_time: 1.0,
            max_speed: 13.89,
            lane_id: LaneId::from(KeyData::from_ffi(1)),
            position,
            speed,
            measured_accel: Some(0.0),
        }
    }

    #[test]
    fn gap_uses_leader_length() {
        let follower = car(10.0, 0.0);
        let leader = car(35.0, 0.0);
        assert_eq!(follower.gap_to(&leader), 20.0);
        assert_eq!(leader.pos_rear(), 30.0);
    }

    #[test]
    fn validation() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let mut vehicle = car(0.0, 5.0);
        vehicle.id = ids.insert(());
        assert!(vehicle.validate().is_ok());

        vehicle.reaction_time = 0.0;
        assert!(matches!(
            vehicle.validate(),
            Err(Error::InvalidAttribute { attribute: "reaction_time", .. })
        ));

        vehicle.reaction_time = 1.0;
        vehicle.speed = -1.0;
        assert!(matches!(
            vehicle.validate(),
            Err(Error::InvalidAttribute { attribute: "speed", .. })
        ));

        vehicle.speed = f64::NAN;
        assert!(vehicle.validate().is_err());
    }

    #[test]
    fn missing_measured_accel() {
        let mut vehicle = car(0.0, 5.0);
        vehicle.measured_accel = None;
        assert!(matches!(
            vehicle.require_measured_accel(),
            Err(Error::MissingAttribute { attribute: "measured_accel", .. })
        ));
    }
}
