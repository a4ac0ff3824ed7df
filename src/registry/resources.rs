//! Shared resource catalog and the query matching algorithm
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::resource::Resource;
use crate::concurrency_error;
use crate::error::Result;

/// Process-wide resource catalog.
///
/// Clones share the same underlying collection. The registry stores whatever
/// it is given; ownership rules are enforced by the command processor.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    resources: Arc<RwLock<Vec<Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Resource>>> {
        self.resources
            .read()
            .map_err(|e| concurrency_error!("RwLock read fail {}", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Resource>>> {
        self.resources
            .write()
            .map_err(|e| concurrency_error!("RwLock write fail {}", e))
    }

    /// Snapshot of every stored resource in registry order
    pub fn list(&self) -> Result<Vec<Resource>> {
        Ok(self.read()?.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Replace the entry with the same (channel, uri, owner) in place, or append.
    /// Returns `true` when an existing entry was replaced.
    pub fn insert_or_replace(&self, resource: Resource) -> Result<bool> {
        let mut resources = self.write()?;
        match resources.iter().position(|r| r.same_identity(&resource)) {
            Some(pos) => {
                resources[pos] = resource;
                Ok(true)
            }
            None => {
                resources.push(resource);
                Ok(false)
            }
        }
    }

    /// Remove the first entry matching `predicate`
    pub fn remove_first<F>(&self, predicate: F) -> Result<Option<Resource>>
    where
        F: Fn(&Resource) -> bool,
    {
        let mut resources = self.write()?;
        Ok(resources
            .iter()
            .position(predicate)
            .map(|pos| resources.remove(pos)))
    }

    pub fn find_first<F>(&self, predicate: F) -> Result<Option<Resource>>
    where
        F: Fn(&Resource) -> bool,
    {
        Ok(self.read()?.iter().find(|r| predicate(*r)).cloned())
    }

    pub fn any<F>(&self, predicate: F) -> Result<bool>
    where
        F: Fn(&Resource) -> bool,
    {
        Ok(self.read()?.iter().any(predicate))
    }

    /// Sanitized copies of every entry matching `template`, in registry order.
    ///
    /// The whole pass runs under one read guard so it never observes a
    /// half-applied mutation.
    pub fn query(&self, template: &Resource, origin: &str) -> Result<Vec<Resource>> {
        let resources = self.read()?;
        let matches: Vec<Resource> = resources
            .iter()
            .filter(|candidate| matches_template(template, candidate))
            .map(|candidate| candidate.sanitized(origin))
            .collect();
        debug!(
            "Query matched {} of {} resources in channel '{}'",
            matches.len(),
            resources.len(),
            template.channel
        );
        Ok(matches)
    }
}

/// Whether a stored `candidate` satisfies a query `template`.
///
/// Channel must be equal (the empty channel is a channel, not a wildcard);
/// an empty owner or uri in the template matches any; template tags must be
/// a case-insensitive subset of the candidate's tags; and when the template
/// carries a name or description, at least one of them must be a substring
/// of the candidate's corresponding field.
pub fn matches_template(template: &Resource, candidate: &Resource) -> bool {
    if template.channel != candidate.channel {
        return false;
    }
    if !template.owner.is_empty() && template.owner != candidate.owner {
        return false;
    }
    if !tags_subset(&template.tags, &candidate.tags) {
        return false;
    }
    if !template.uri.is_empty() && template.uri != candidate.uri {
        return false;
    }
    if template.name.is_empty() && template.description.is_empty() {
        return true;
    }
    (!template.name.is_empty() && candidate.name.contains(&template.name))
        || (!template.description.is_empty()
            && candidate.description.contains(&template.description))
}

fn tags_subset(wanted: &[String], available: &[String]) -> bool {
    let available: Vec<String> = available.iter().map(|t| t.to_lowercase()).collect();
    wanted
        .iter()
        .all(|tag| available.contains(&tag.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(channel: &str, uri: &str, owner: &str) -> Resource {
        Resource {
            channel: channel.to_string(),
            uri: uri.to_string(),
            owner: owner.to_string(),
            ..Default::default()
        }
    }

    fn with_tags(mut r: Resource, tags: &[&str]) -> Resource {
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    #[test]
    fn test_insert_or_replace_identity() {
        let registry = ResourceRegistry::new();
        let mut first = resource("c", "x://y", "a");
        first.name = "first".to_string();
        let mut second = first.clone();
        second.name = "second".to_string();

        assert!(!registry.insert_or_replace(first).unwrap());
        assert!(registry.insert_or_replace(second).unwrap());

        let stored = registry.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "second");
    }

    #[test]
    fn test_replace_keeps_position() {
        let registry = ResourceRegistry::new();
        registry.insert_or_replace(resource("c", "x://1", "a")).unwrap();
        registry.insert_or_replace(resource("c", "x://2", "a")).unwrap();
        let mut updated = resource("c", "x://1", "a");
        updated.description = "updated".to_string();
        registry.insert_or_replace(updated).unwrap();

        let stored = registry.list().unwrap();
        assert_eq!(stored[0].description, "updated");
        assert_eq!(stored[1].uri, "x://2");
    }

    #[test]
    fn test_remove_first_only() {
        let registry = ResourceRegistry::new();
        registry.insert_or_replace(resource("c", "x://y", "a")).unwrap();
        registry.insert_or_replace(resource("d", "x://y", "a")).unwrap();

        let removed = registry.remove_first(|r| r.uri == "x://y").unwrap();
        assert_eq!(removed.unwrap().channel, "c");
        assert_eq!(registry.len().unwrap(), 1);

        assert!(registry.remove_first(|r| r.owner == "zed").unwrap().is_none());
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_channel_is_exact() {
        let stored = resource("", "x://y", "a");
        assert!(matches_template(&resource("", "", ""), &stored));
        assert!(!matches_template(&resource("other", "", ""), &stored));
    }

    #[test]
    fn test_owner_and_uri_filters() {
        let stored = resource("c", "x://y", "alice");
        assert!(matches_template(&resource("c", "", "alice"), &stored));
        assert!(!matches_template(&resource("c", "", "bob"), &stored));
        assert!(matches_template(&resource("c", "x://y", ""), &stored));
        assert!(!matches_template(&resource("c", "x://z", ""), &stored));
    }

    #[test]
    fn test_tag_subset_is_case_insensitive() {
        let stored = with_tags(resource("c", "x://y", "a"), &["a", "b", "c"]);
        assert!(matches_template(&with_tags(resource("c", "", ""), &["A", "B"]), &stored));
        assert!(!matches_template(&with_tags(resource("c", "", ""), &["a", "d"]), &stored));
        assert!(matches_template(&resource("c", "", ""), &stored));
    }

    #[test]
    fn test_name_or_description_substring() {
        let mut stored = resource("c", "x://y", "a");
        stored.name = "Rust Book".to_string();
        stored.description = "The Rust programming language".to_string();

        let mut by_name = resource("c", "", "");
        by_name.name = "Book".to_string();
        assert!(matches_template(&by_name, &stored));

        let mut by_description = resource("c", "", "");
        by_description.description = "programming".to_string();
        assert!(matches_template(&by_description, &stored));

        let mut either = resource("c", "", "");
        either.name = "missing".to_string();
        either.description = "language".to_string();
        assert!(matches_template(&either, &stored));

        let mut neither = resource("c", "", "");
        neither.name = "missing".to_string();
        assert!(!matches_template(&neither, &stored));
    }

    #[test]
    fn test_query_redacts_owner() {
        let registry = ResourceRegistry::new();
        registry
            .insert_or_replace(resource("c", "x://y", "alice"))
            .unwrap();

        let results = registry.query(&resource("c", "", ""), "me:3000").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].owner, "*");
        assert_eq!(results[0].origin.as_deref(), Some("me:3000"));

        // stored entry is untouched
        assert_eq!(registry.list().unwrap()[0].owner, "alice");
    }
}
