//! Topic classification.
//!
//! A topic is a version prefix followed by a resource path and, for field
//! projections, a `$select` query:
//!
//! | Topic                                           | Variant     |
//! |-------------------------------------------------|-------------|
//! | `v1.1/Things`                                   | Collection  |
//! | `v1.1/Datastreams(52)/Observations`             | Collection  |
//! | `v1.1/Things(1)`, `v1.1/Datastreams(52)/Thing`  | Entity      |
//! | `v1.1/Things(1)/name`                           | Property    |
//! | `v1.1/Observations?$select=result,phenomenonTime` | Select    |
//!
//! Classification runs an ordered table of grammar rules. Each rule pairs a
//! path guard, answered by the [`ResourcePathValidator`], with a structural
//! production; the first rule whose guard holds and whose production matches
//! wins.

use std::sync::Arc;

use crate::error::{PathError, TopicError};
use crate::model::{Cardinality, EntityType};
use crate::path::{is_identifier, split_query, split_segments, PathSegment};
use crate::subscription::{
    CollectionTarget, EntityTarget, Projection, Source, Subscription, SubscriptionKind,
};
use crate::validator::ResourcePathValidator;

/// Versions accepted when no explicit list is configured.
pub const DEFAULT_VERSIONS: [&str; 2] = ["v1.0", "v1.1"];

/// Query option introducing a field projection.
const SELECT_OPTION: &str = "$select=";

/// Topic parser settings.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Accepted protocol version prefixes, without the trailing `/`.
    pub versions: Vec<String>,
    /// Strip one layer of quoting from parenthesized identifiers.
    pub unquote_ids: bool,
}

impl ParserConfig {
    /// Create a configuration accepting the default versions.
    pub fn new() -> Self {
        Self {
            versions: DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect(),
            unquote_ids: false,
        }
    }

    /// Replace the accepted versions.
    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable identifier unquoting.
    pub fn with_unquote_ids(mut self, unquote: bool) -> Self {
        self.unquote_ids = unquote;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A topic after preprocessing.
struct TopicInput<'a> {
    path: &'a str,
    query: Option<&'a str>,
    segments: Vec<PathSegment>,
}

impl TopicInput<'_> {
    /// Path without its final segment, if there is more than one.
    fn parent_path(&self) -> Option<&str> {
        if self.segments.len() < 2 {
            return None;
        }
        let last = &self.segments[self.segments.len() - 1];
        Some(&self.path[..last.span.start - 1])
    }
}

/// Which validator outcome a rule requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathGuard {
    /// Topic has a query and its path validates.
    QueryPrefix,
    /// Topic has no query and its whole path validates.
    FullPath,
    /// Topic has no query, its whole path fails, its parent path validates.
    ParentPath,
}

struct GrammarRule {
    name: &'static str,
    guard: PathGuard,
    production: fn(&TopicInput<'_>) -> Option<SubscriptionKind>,
}

/// Classification rules, in precedence order.
const GRAMMAR: [GrammarRule; 4] = [
    GrammarRule {
        name: "select",
        guard: PathGuard::QueryPrefix,
        production: select_production,
    },
    GrammarRule {
        name: "collection",
        guard: PathGuard::FullPath,
        production: collection_production,
    },
    GrammarRule {
        name: "entity",
        guard: PathGuard::FullPath,
        production: entity_production,
    },
    GrammarRule {
        name: "property",
        guard: PathGuard::ParentPath,
        production: property_production,
    },
];

/// Validator outcomes for one topic, computed at most once each.
struct PathChecks<'v> {
    validator: &'v dyn ResourcePathValidator,
    full: Option<Result<(), PathError>>,
    parent: Option<Result<(), PathError>>,
}

impl<'v> PathChecks<'v> {
    fn new(validator: &'v dyn ResourcePathValidator) -> Self {
        Self {
            validator,
            full: None,
            parent: None,
        }
    }

    fn full(&mut self, input: &TopicInput<'_>) -> &Result<(), PathError> {
        let validator = self.validator;
        self.full.get_or_insert_with(|| validator.validate(input.path))
    }

    fn parent(&mut self, input: &TopicInput<'_>) -> bool {
        let validator = self.validator;
        let Some(parent) = input.parent_path() else {
            return false;
        };
        self.parent
            .get_or_insert_with(|| validator.validate(parent))
            .is_ok()
    }

    fn holds(&mut self, guard: PathGuard, input: &TopicInput<'_>) -> bool {
        match guard {
            PathGuard::QueryPrefix => input.query.is_some() && self.full(input).is_ok(),
            PathGuard::FullPath => input.query.is_none() && self.full(input).is_ok(),
            PathGuard::ParentPath => {
                input.query.is_none() && self.full(input).is_err() && self.parent(input)
            }
        }
    }
}

/// Classifies raw topics into [`Subscription`]s.
#[derive(Clone)]
pub struct TopicParser {
    config: ParserConfig,
    validator: Arc<dyn ResourcePathValidator>,
}

impl TopicParser {
    /// Create a parser using `validator` to check resource paths.
    pub fn new(config: ParserConfig, validator: Arc<dyn ResourcePathValidator>) -> Self {
        Self { config, validator }
    }

    /// Parser configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Classify `topic`.
    pub fn parse(&self, topic: &str) -> Result<Subscription, TopicError> {
        let input = self.preprocess(topic)?;
        let mut checks = PathChecks::new(self.validator.as_ref());

        for rule in &GRAMMAR {
            if !checks.holds(rule.guard, &input) {
                continue;
            }
            if let Some(kind) = (rule.production)(&input) {
                tracing::trace!(topic, rule = rule.name, "topic classified");
                return Ok(Subscription::new(topic, kind));
            }
        }

        match checks.full(&input) {
            Err(e) => Err(TopicError::from_path(topic, e.clone())),
            Ok(()) => Err(TopicError::Unclassifiable {
                topic: topic.to_string(),
            }),
        }
    }

    fn preprocess<'a>(&self, topic: &'a str) -> Result<TopicInput<'a>, TopicError> {
        let rest = self
            .config
            .versions
            .iter()
            .find_map(|v| topic.strip_prefix(v.as_str())?.strip_prefix('/'))
            .ok_or_else(|| TopicError::MissingVersion {
                topic: topic.to_string(),
            })?;

        let (path, query) = split_query(rest);

        let segments =
            split_segments(path, self.config.unquote_ids).map_err(|reason| TopicError::Malformed {
                topic: topic.to_string(),
                reason,
            })?;

        Ok(TopicInput {
            path,
            query,
            segments,
        })
    }
}

impl std::fmt::Debug for TopicParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicParser")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Resolve the entity type and cardinality reached by each segment.
fn resolve_chain(segments: &[PathSegment]) -> Option<Vec<(EntityType, Cardinality)>> {
    let (first, rest) = segments.split_first()?;
    let mut chain = vec![(EntityType::from_plural(&first.name)?, Cardinality::Many)];
    for segment in rest {
        let (current, _) = chain[chain.len() - 1];
        chain.push(current.navigate(&segment.name)?);
    }
    Some(chain)
}

/// The segment before the last one, as a source reference, if it has an id.
fn source_of(segments: &[PathSegment], chain: &[(EntityType, Cardinality)]) -> Option<Source> {
    let n = segments.len();
    if n < 2 {
        return None;
    }
    let prev = &segments[n - 2];
    let id = prev.id.as_ref()?;
    Some(Source::new(chain[n - 2].0, id.clone()))
}

fn collection_target(segments: &[PathSegment]) -> Option<CollectionTarget> {
    let last = segments.last()?;
    if last.has_id() {
        return None;
    }
    let chain = resolve_chain(segments)?;
    let (wanted, cardinality) = chain[chain.len() - 1];
    if cardinality != Cardinality::Many {
        return None;
    }
    if segments.len() == 1 {
        return Some(CollectionTarget {
            source: None,
            wanted,
        });
    }
    let source = source_of(segments, &chain)?;
    Some(CollectionTarget {
        source: Some(source),
        wanted,
    })
}

fn entity_target(segments: &[PathSegment]) -> Option<EntityTarget> {
    let last = segments.last()?;
    let chain = resolve_chain(segments)?;
    let (wanted, cardinality) = chain[chain.len() - 1];

    if let Some(id) = &last.id {
        return Some(EntityTarget {
            source: source_of(segments, &chain),
            wanted,
            id: Some(id.clone()),
        });
    }

    if cardinality == Cardinality::One {
        let source = source_of(segments, &chain)?;
        return Some(EntityTarget {
            source: Some(source),
            wanted,
            id: None,
        });
    }

    None
}

fn collection_production(input: &TopicInput<'_>) -> Option<SubscriptionKind> {
    collection_target(&input.segments).map(SubscriptionKind::Collection)
}

fn entity_production(input: &TopicInput<'_>) -> Option<SubscriptionKind> {
    entity_target(&input.segments).map(SubscriptionKind::Entity)
}

fn property_production(input: &TopicInput<'_>) -> Option<SubscriptionKind> {
    let (last, parent) = input.segments.split_last()?;
    if last.has_id() || !is_identifier(&last.name) {
        return None;
    }

    let target = entity_target(parent).or_else(|| collection_target(parent).map(Into::into))?;
    if !target.wanted.has_property(&last.name) {
        return None;
    }

    Some(SubscriptionKind::Property {
        target,
        property: last.name.clone(),
    })
}

fn select_production(input: &TopicInput<'_>) -> Option<SubscriptionKind> {
    let fields = input.query?.strip_prefix(SELECT_OPTION)?;
    let target = collection_target(&input.segments)?;

    let mut selected = Vec::new();
    for field in fields.split(',').map(str::trim) {
        if !target.wanted.has_property(field) {
            return None;
        }
        selected.push(field);
    }

    Some(SubscriptionKind::Select {
        target,
        projection: Projection::new(selected),
    })
}
