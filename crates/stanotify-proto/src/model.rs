//! SensorThings entity model: resource types, navigation links and properties.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How many entities a navigation link reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// The link reaches a single entity (e.g. `Datastreams(1)/Thing`).
    One,
    /// The link reaches a collection (e.g. `Things(1)/Datastreams`).
    Many,
}

/// The closed set of resource types notifications can be raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Things,
    Locations,
    HistoricalLocations,
    Datastreams,
    MultiDatastreams,
    Sensors,
    ObservedProperties,
    Observations,
    FeaturesOfInterest,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 9] = [
        EntityType::Things,
        EntityType::Locations,
        EntityType::HistoricalLocations,
        EntityType::Datastreams,
        EntityType::MultiDatastreams,
        EntityType::Sensors,
        EntityType::ObservedProperties,
        EntityType::Observations,
        EntityType::FeaturesOfInterest,
    ];

    /// Entity-set name, as used for root collections (`Things`).
    pub fn plural(self) -> &'static str {
        match self {
            EntityType::Things => "Things",
            EntityType::Locations => "Locations",
            EntityType::HistoricalLocations => "HistoricalLocations",
            EntityType::Datastreams => "Datastreams",
            EntityType::MultiDatastreams => "MultiDatastreams",
            EntityType::Sensors => "Sensors",
            EntityType::ObservedProperties => "ObservedProperties",
            EntityType::Observations => "Observations",
            EntityType::FeaturesOfInterest => "FeaturesOfInterest",
        }
    }

    /// Name of a to-one navigation link to this type (`Thing`).
    pub fn singular(self) -> &'static str {
        match self {
            EntityType::Things => "Thing",
            EntityType::Locations => "Location",
            EntityType::HistoricalLocations => "HistoricalLocation",
            EntityType::Datastreams => "Datastream",
            EntityType::MultiDatastreams => "MultiDatastream",
            EntityType::Sensors => "Sensor",
            EntityType::ObservedProperties => "ObservedProperty",
            EntityType::Observations => "Observation",
            EntityType::FeaturesOfInterest => "FeatureOfInterest",
        }
    }

    /// Resolve an entity-set name.
    pub fn from_plural(name: &str) -> Option<EntityType> {
        Self::ALL.into_iter().find(|t| t.plural() == name)
    }

    /// Resolve any resource name, plural or singular.
    pub fn from_any_name(name: &str) -> Option<EntityType> {
        Self::ALL
            .into_iter()
            .find(|t| t.plural() == name || t.singular() == name)
    }

    /// Bit used for this type in compact type sets.
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Navigation links leaving this type.
    pub fn navigations(self) -> &'static [(EntityType, Cardinality)] {
        use Cardinality::{Many, One};
        use EntityType::*;
        match self {
            Things => &[
                (Datastreams, Many),
                (MultiDatastreams, Many),
                (Locations, Many),
                (HistoricalLocations, Many),
            ],
            Locations => &[(Things, Many), (HistoricalLocations, Many)],
            HistoricalLocations => &[(Things, One), (Locations, Many)],
            Datastreams => &[
                (Things, One),
                (Sensors, One),
                (ObservedProperties, One),
                (Observations, Many),
            ],
            MultiDatastreams => &[
                (Things, One),
                (Sensors, One),
                (ObservedProperties, Many),
                (Observations, Many),
            ],
            Sensors => &[(Datastreams, Many), (MultiDatastreams, Many)],
            ObservedProperties => &[(Datastreams, Many), (MultiDatastreams, Many)],
            Observations => &[
                (Datastreams, One),
                (MultiDatastreams, One),
                (FeaturesOfInterest, One),
            ],
            FeaturesOfInterest => &[(Observations, Many)],
        }
    }

    /// Follow the navigation link named `name`, if this type has one.
    pub fn navigate(self, name: &str) -> Option<(EntityType, Cardinality)> {
        self.navigations()
            .iter()
            .copied()
            .find(|(target, cardinality)| match cardinality {
                Cardinality::One => target.singular() == name,
                Cardinality::Many => target.plural() == name,
            })
    }

    /// Entity properties that can be watched or selected.
    pub fn properties(self) -> &'static [&'static str] {
        match self {
            EntityType::Things => &["id", "name", "description", "properties"],
            EntityType::Locations => &[
                "id",
                "name",
                "description",
                "encodingType",
                "location",
                "properties",
            ],
            EntityType::HistoricalLocations => &["id", "time"],
            EntityType::Datastreams => &[
                "id",
                "name",
                "description",
                "observationType",
                "unitOfMeasurement",
                "observedArea",
                "phenomenonTime",
                "resultTime",
                "properties",
            ],
            EntityType::MultiDatastreams => &[
                "id",
                "name",
                "description",
                "observationType",
                "multiObservationDataTypes",
                "unitOfMeasurements",
                "observedArea",
                "phenomenonTime",
                "resultTime",
                "properties",
            ],
            EntityType::Sensors => &[
                "id",
                "name",
                "description",
                "encodingType",
                "metadata",
                "properties",
            ],
            EntityType::ObservedProperties => {
                &["id", "name", "definition", "description", "properties"]
            }
            EntityType::Observations => &[
                "id",
                "phenomenonTime",
                "resultTime",
                "result",
                "resultQuality",
                "validTime",
                "parameters",
            ],
            EntityType::FeaturesOfInterest => &[
                "id",
                "name",
                "description",
                "encodingType",
                "feature",
                "properties",
            ],
        }
    }

    /// Whether `name` is a property of this type.
    pub fn has_property(self, name: &str) -> bool {
        self.properties().contains(&name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::from_any_name(s)
            .ok_or_else(|| Error::InvalidMessage(format!("unknown entity type: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve() {
        for t in EntityType::ALL {
            assert_eq!(EntityType::from_plural(t.plural()), Some(t));
            assert_eq!(EntityType::from_any_name(t.singular()), Some(t));
        }
        assert_eq!(EntityType::from_plural("Thing"), None);
        assert!("Widgets".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_navigation_uses_cardinality_names() {
        assert_eq!(
            EntityType::Datastreams.navigate("Thing"),
            Some((EntityType::Things, Cardinality::One))
        );
        assert_eq!(
            EntityType::Datastreams.navigate("Observations"),
            Some((EntityType::Observations, Cardinality::Many))
        );
        assert_eq!(EntityType::Datastreams.navigate("Things"), None);
        assert_eq!(EntityType::Things.navigate("Sensor"), None);
    }

    #[test]
    fn test_bits_are_distinct() {
        let mut seen = 0u16;
        for t in EntityType::ALL {
            assert_eq!(seen & t.bit(), 0);
            seen |= t.bit();
        }
    }
}
