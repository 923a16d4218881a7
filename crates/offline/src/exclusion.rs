use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use crate::manifest::BaseUrl;

/// Mirrors known to be failing, as seen by a segment list build.
///
/// The state is owned by whoever drives the download job and shared by every build of that
/// job. Builds only read it.
pub trait ExclusionState: Send + Sync {
    fn is_excluded(&self, base_url: &BaseUrl) -> bool;
}

impl ExclusionState for () {
    fn is_excluded(&self, _base_url: &BaseUrl) -> bool {
        false
    }
}

impl ExclusionState for HashSet<String> {
    fn is_excluded(&self, base_url: &BaseUrl) -> bool {
        self.contains(base_url.url.as_str())
    }
}

impl<T> ExclusionState for Arc<T>
where
    T: ExclusionState + ?Sized,
{
    fn is_excluded(&self, base_url: &BaseUrl) -> bool {
        self.as_ref().is_excluded(base_url)
    }
}

/// Picks the mirror every segment of a representation is fetched from.
///
/// The first mirror that is not excluded wins. When all of them are excluded the first one is
/// used anyway. `None` only for an empty list.
pub fn select_base_url<'a, E>(base_urls: &'a [BaseUrl], exclusions: &E) -> Option<&'a BaseUrl>
where
    E: ExclusionState + ?Sized,
{
    base_urls
        .iter()
        .find(|base_url| !exclusions.is_excluded(base_url))
        .or_else(|| base_urls.first())
}

/// Timed exclusions by URL and by service location.
#[derive(Debug, Default)]
pub struct BaseUrlExclusionList {
    urls: RwLock<HashMap<String, Instant>>,
    service_locations: RwLock<HashMap<String, Instant>>,
}

impl BaseUrlExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes `base_url`, and every mirror sharing its service location, for `duration`.
    pub fn exclude(&self, base_url: &BaseUrl, duration: Duration) {
        let until = Instant::now() + duration;
        tracing::debug!("Excluding {} for {duration:?}", base_url.url);

        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(base_url.url.to_string(), until);
        if let Some(service_location) = &base_url.service_location {
            self.service_locations
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(service_location.clone(), until);
        }
    }

    pub fn reset(&self) {
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.service_locations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn is_active(entries: &RwLock<HashMap<String, Instant>>, key: &str) -> bool {
    entries
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .is_some_and(|until| *until > Instant::now())
}

impl ExclusionState for BaseUrlExclusionList {
    fn is_excluded(&self, base_url: &BaseUrl) -> bool {
        is_active(&self.urls, base_url.url.as_str())
            || base_url
                .service_location
                .as_deref()
                .is_some_and(|service_location| is_active(&self.service_locations, service_location))
    }
}
