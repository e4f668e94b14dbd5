use tracing::debug;

use crate::{
    dep::{
        constraint::{parse_tag, Constraint},
        fetcher::Fetcher,
        Dependency,
    },
    error::ResolveError,
};

/// Picks registry tags for dependencies.
pub struct Resolver<'a> {
    fetcher: &'a dyn Fetcher,
    default_registry: String,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, default_registry: impl Into<String>) -> Self {
        Self {
            fetcher,
            default_registry: default_registry.into(),
        }
    }

    /// Returns the highest tag satisfying the dependency's constraint, as the
    /// registry spells it.
    pub fn resolve_tag(&self, dep: &Dependency) -> Result<String, ResolveError> {
        let constraint = Constraint::parse(&dep.constraint).map_err(|reason| {
            ResolveError::InvalidConstraint {
                constraint: dep.constraint.clone(),
                reason,
            }
        })?;
        let reference = dep
            .reference(&self.default_registry)
            .map_err(ResolveError::InvalidReference)?;

        let tags = self.fetcher.tags(&reference).map_err(|source| {
            ResolveError::ListTags {
                package: reference.name(),
                source,
            }
        })?;
        debug!("{} has {} tags", reference.name(), tags.len());

        select(&tags, &constraint).ok_or_else(|| {
            ResolveError::NoMatchingVersion {
                package: reference.name(),
                constraint: dep.constraint.clone(),
                available: tags.clone(),
            }
        })
    }
}

/// Highest tag matching `constraint`; tags that are not versions are ignored.
/// On equal versions the first tag listed wins.
pub fn select(tags: &[String], constraint: &Constraint) -> Option<String> {
    let mut best: Option<(semver::Version, &String)> = None;

    for tag in tags {
        let Some(version) = parse_tag(tag) else {
            continue;
        };
        if !constraint.matches(&version) {
            continue;
        }
        match &best {
            Some((current, _)) if version <= *current => {}
            _ => best = Some((version, tag)),
        }
    }

    best.map(|(_, tag)| tag.clone())
}
