//! Resource path validation.

use crate::error::PathError;
use crate::model::{Cardinality, EntityType};
use crate::path::split_segments;

/// Confirms that a path addresses a real, navigable resource.
///
/// The service backing the REST surface implements this against its store;
/// [`ModelPathValidator`] checks the path against the entity model only.
pub trait ResourcePathValidator: Send + Sync {
    /// Validate a resource path (without version prefix or query).
    fn validate(&self, path: &str) -> Result<(), PathError>;
}

impl<F> ResourcePathValidator for F
where
    F: Fn(&str) -> Result<(), PathError> + Send + Sync,
{
    fn validate(&self, path: &str) -> Result<(), PathError> {
        self(path)
    }
}

/// Validates paths against the SensorThings navigation model.
///
/// Identifiers are not resolved, so any identifier is assumed to exist.
///
/// A valid path is not necessarily subscribable. Topics only name the wanted
/// resource and at most one identified source directly before it, so
/// `Datastreams(52)/Thing/Locations` validates here but the topic parser
/// rejects it as unclassifiable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelPathValidator;

impl ModelPathValidator {
    /// Create a new model validator.
    pub fn new() -> Self {
        Self
    }
}

impl ResourcePathValidator for ModelPathValidator {
    fn validate(&self, path: &str) -> Result<(), PathError> {
        let invalid = |reason: String| PathError::InvalidNavigation {
            path: path.to_string(),
            reason,
        };
        let segments = split_segments(path, false).map_err(invalid)?;

        let first = &segments[0];
        let mut current = match EntityType::from_plural(&first.name) {
            Some(t) => t,
            None if EntityType::from_any_name(&first.name).is_some() => {
                return Err(invalid(format!("{} is not an entity set", first.name)));
            }
            None => {
                return Err(PathError::NotFound {
                    path: path.to_string(),
                })
            }
        };
        let mut cardinality = Cardinality::Many;
        let mut has_id = first.has_id();

        for segment in &segments[1..] {
            if cardinality == Cardinality::Many && !has_id {
                return Err(invalid(format!(
                    "cannot navigate from the {} collection without an id",
                    current
                )));
            }

            let (next, next_cardinality) = match current.navigate(&segment.name) {
                Some(link) => link,
                None if EntityType::from_any_name(&segment.name).is_some() => {
                    return Err(invalid(format!(
                        "{} has no navigation {}",
                        current, segment.name
                    )));
                }
                None => {
                    return Err(PathError::NotFound {
                        path: path.to_string(),
                    })
                }
            };

            if next_cardinality == Cardinality::One && segment.has_id() {
                return Err(invalid(format!(
                    "to-one navigation {} cannot take an id",
                    segment.name
                )));
            }

            current = next;
            cardinality = next_cardinality;
            has_id = segment.has_id();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        let v = ModelPathValidator::new();
        for path in [
            "Things",
            "Things(1)",
            "Datastreams(52)/Observations",
            "Datastreams(52)/Thing",
            "Datastreams(52)/Thing/Locations",
            "Observations(7)/FeatureOfInterest",
            "Things(1)/Datastreams(2)/Observations",
            "Things('x/y')",
        ] {
            assert!(v.validate(path).is_ok(), "{path} should validate");
        }
    }

    #[test]
    fn test_unknown_names_are_not_found() {
        let v = ModelPathValidator::new();
        assert!(matches!(
            v.validate("Widgets"),
            Err(PathError::NotFound { .. })
        ));
        assert!(matches!(
            v.validate("Things(1)/name"),
            Err(PathError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_navigation() {
        let v = ModelPathValidator::new();
        for path in [
            "Thing",
            "Things/Datastreams",
            "Things(1)/Sensor",
            "Datastreams(1)/Thing(2)",
            "Things(1",
        ] {
            assert!(
                matches!(v.validate(path), Err(PathError::InvalidNavigation { .. })),
                "{path} should be invalid navigation"
            );
        }
    }

    #[test]
    fn test_closure_validator() {
        let always_ok = |_: &str| -> Result<(), PathError> { Ok(()) };
        assert!(ResourcePathValidator::validate(&always_ok, "anything").is_ok());
    }
}
