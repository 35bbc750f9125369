use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// A spatial and kinematic configuration under which a behaviour is compiled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModellingHypothesis {
    AxisymmetricalGeneralisedPlaneStrain,
    AxisymmetricalGeneralisedPlaneStress,
    Axisymmetrical,
    PlaneStress,
    PlaneStrain,
    GeneralisedPlaneStrain,
    Tridimensional,
}

impl ModellingHypothesis {
    pub const ALL: [ModellingHypothesis; 7] = [
        Self::AxisymmetricalGeneralisedPlaneStrain,
        Self::AxisymmetricalGeneralisedPlaneStress,
        Self::Axisymmetrical,
        Self::PlaneStress,
        Self::PlaneStrain,
        Self::GeneralisedPlaneStrain,
        Self::Tridimensional,
    ];

    pub fn space_dimension(&self) -> usize {
        match self {
            Self::AxisymmetricalGeneralisedPlaneStrain | Self::AxisymmetricalGeneralisedPlaneStress => 1,
            Self::Axisymmetrical | Self::PlaneStress | Self::PlaneStrain | Self::GeneralisedPlaneStrain => 2,
            Self::Tridimensional => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AxisymmetricalGeneralisedPlaneStrain => "AxisymmetricalGeneralisedPlaneStrain",
            Self::AxisymmetricalGeneralisedPlaneStress => "AxisymmetricalGeneralisedPlaneStress",
            Self::Axisymmetrical => "Axisymmetrical",
            Self::PlaneStress => "PlaneStress",
            Self::PlaneStrain => "PlaneStrain",
            Self::GeneralisedPlaneStrain => "GeneralisedPlaneStrain",
            Self::Tridimensional => "Tridimensional",
        }
    }
}

impl Display for ModellingHypothesis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
