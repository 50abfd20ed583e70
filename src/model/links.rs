//! Named external links, grouped by a fixed set of categories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The categories a link can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    Documentation,
    Repository,
    Design,
    Ticket,
    Meeting,
    Other,
}

impl LinkCategory {
    pub const ALL: [Self; 6] = [
        Self::Documentation,
        Self::Repository,
        Self::Design,
        Self::Ticket,
        Self::Meeting,
        Self::Other,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Documentation => "documentation",
            Self::Repository => "repository",
            Self::Design => "design",
            Self::Ticket => "ticket",
            Self::Meeting => "meeting",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "docs" | "doc" => Some(Self::Documentation),
            "repo" | "code" => Some(Self::Repository),
            _ => Self::ALL.into_iter().find(|c| c.as_str() == lower),
        }
    }
}

/// A single named link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Ordered links per category. Empty categories are never stored, so two
/// groups with the same links compare (and serialize) equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkGroups(BTreeMap<LinkCategory, Vec<Link>>);

impl LinkGroups {
    /// Append a link to a category and return its generated id.
    pub fn add(
        &mut self,
        category: LinkCategory,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> String {
        let id = format!("lnk_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        self.0.entry(category).or_default().push(Link {
            id: id.clone(),
            name: name.into(),
            url: url.into(),
        });
        id
    }

    /// Remove a link by id from whichever category holds it.
    pub fn remove(&mut self, id: &str) -> bool {
        let mut removed = false;
        self.0.retain(|_, links| {
            let before = links.len();
            links.retain(|link| link.id != id);
            removed |= links.len() != before;
            !links.is_empty()
        });
        removed
    }

    #[must_use]
    pub fn get(&self, category: LinkCategory) -> &[Link] {
        self.0.get(&category).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LinkCategory, &Link)> {
        self.0
            .iter()
            .flat_map(|(category, links)| links.iter().map(move |link| (*category, link)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_keeps_groups_canonical() {
        let mut links = LinkGroups::default();
        let guide = links.add(LinkCategory::Documentation, "Guide", "https://example.com/guide");
        links.add(LinkCategory::Documentation, "FAQ", "https://example.com/faq");
        let repo = links.add(LinkCategory::Repository, "Repo", "https://example.com/git");

        assert_eq!(links.len(), 3);
        assert_eq!(links.get(LinkCategory::Documentation)[1].name, "FAQ");

        assert!(links.remove(&repo));
        assert!(!links.remove(&repo));
        assert!(links.get(LinkCategory::Repository).is_empty());

        assert!(links.remove(&guide));
        let json = serde_json::to_string(&links).unwrap();
        assert!(json.starts_with("{\"documentation\":"));
        assert!(!json.contains("repository"));
    }

    #[test]
    fn test_category_parse_aliases() {
        assert_eq!(LinkCategory::parse("Docs"), Some(LinkCategory::Documentation));
        assert_eq!(LinkCategory::parse("ticket"), Some(LinkCategory::Ticket));
        assert_eq!(LinkCategory::parse("wiki"), None);
    }
}
