//! Enumeration capability and the locator matching rules backends share.
//!
//! Matching convention used by [`LocatorFilter`]:
//!
//! * The locator `name` and every locator label value are regular
//!   expressions, searched unanchored and case-sensitively (`"db"` matches
//!   `"mydb-1"`; write `"^db$"` for an exact match).
//! * An empty name, or an empty label value, matches anything.  A label key
//!   in the filter must still be present on the volume.
//! * All non-empty parts must match (AND).
//! * The separate `labels` filter of `enumerate` and `snap_enumerate`
//!   compares values for equality, not as regexes.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Result, VolumeError};
use crate::types::{Volume, VolumeId, VolumeLocator};

/// Enumeration service — look volumes up by id, locator, or parent.
#[async_trait]
pub trait Enumerator: Send + Sync {
    /// Return the subset of `volume_ids` that exist, with full metadata.
    ///
    /// Unknown ids are skipped, never reported as errors.
    async fn inspect(&self, volume_ids: &[VolumeId]) -> Result<Vec<Volume>>;

    /// Every volume whose locator matches `locator` and whose spec labels
    /// contain `labels`.  See the module docs for the matching rules.
    async fn enumerate(
        &self,
        locator: &VolumeLocator,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>>;

    /// Snapshots whose parent is one of `volume_ids` and whose locator
    /// labels contain `snap_labels`.  An empty id list means every parent.
    async fn snap_enumerate(
        &self,
        volume_ids: &[VolumeId],
        snap_labels: &HashMap<String, String>,
    ) -> Result<Vec<Volume>>;
}

/// Compiled form of a [`VolumeLocator`] used as an enumeration filter.
#[derive(Debug)]
pub struct LocatorFilter {
    name: Option<Regex>,
    labels: Vec<(String, Option<Regex>)>,
}

impl LocatorFilter {
    /// Compile the filter.  An invalid pattern is an `InvalidArgument`.
    pub fn new(locator: &VolumeLocator) -> Result<Self> {
        let name = compile(&locator.name)?;
        let labels = locator
            .volume_labels
            .iter()
            .map(|(k, v)| -> Result<(String, Option<Regex>)> { Ok((k.clone(), compile(v)?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, labels })
    }

    /// `true` when the filter has nothing to check.
    pub fn matches_all(&self) -> bool {
        self.name.is_none() && self.labels.is_empty()
    }

    pub fn matches(&self, locator: &VolumeLocator) -> bool {
        if let Some(re) = &self.name
            && !re.is_match(&locator.name)
        {
            return false;
        }
        self.labels.iter().all(|(key, re)| {
            match (locator.volume_labels.get(key), re) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value), Some(re)) => re.is_match(value),
            }
        })
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| VolumeError::InvalidArgument(format!("locator pattern {pattern:?}: {e}")))
}

/// `true` when every `(key, value)` of `filter` is present in `labels`.
pub fn labels_match(labels: &HashMap<String, String>, filter: &HashMap<String, String>) -> bool {
    filter.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = LocatorFilter::new(&VolumeLocator::default()).unwrap();
        assert!(filter.matches_all());
        assert!(filter.matches(&VolumeLocator::named("anything")));
    }

    #[test]
    fn name_is_unanchored_regex() {
        let filter = LocatorFilter::new(&VolumeLocator::named("db")).unwrap();
        assert!(filter.matches(&VolumeLocator::named("mydb-1")));
        assert!(!filter.matches(&VolumeLocator::named("DB")));

        let exact = LocatorFilter::new(&VolumeLocator::named("^db$")).unwrap();
        assert!(exact.matches(&VolumeLocator::named("db")));
        assert!(!exact.matches(&VolumeLocator::named("mydb")));
    }

    #[test]
    fn labels_are_anded() {
        let filter = LocatorFilter::new(
            &VolumeLocator::default()
                .with_label("tier", "gold|silver")
                .with_label("zone", ""),
        )
        .unwrap();

        let both = VolumeLocator::named("a")
            .with_label("tier", "silver")
            .with_label("zone", "eu-1");
        assert!(filter.matches(&both));

        let missing_zone = VolumeLocator::named("a").with_label("tier", "gold");
        assert!(!filter.matches(&missing_zone));

        let wrong_tier = VolumeLocator::named("a")
            .with_label("tier", "bronze")
            .with_label("zone", "eu-1");
        assert!(!filter.matches(&wrong_tier));
    }

    #[test]
    fn bad_pattern_is_invalid_argument() {
        let err = LocatorFilter::new(&VolumeLocator::named("(")).unwrap_err();
        assert!(matches!(err, VolumeError::InvalidArgument(_)));
    }

    #[test]
    fn exact_label_match() {
        let labels = HashMap::from([("app".to_owned(), "web".to_owned())]);
        assert!(labels_match(&labels, &HashMap::new()));
        assert!(labels_match(&labels, &labels));
        let other = HashMap::from([("app".to_owned(), "we".to_owned())]);
        assert!(!labels_match(&labels, &other));
    }
}
