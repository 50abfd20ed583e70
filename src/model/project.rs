//! Project model for taskdeck.
//!
//! Projects group tasks. A task only stores the project id; the display name
//! is resolved at load time through the name cache.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::links::LinkGroups;

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    Planning,
    #[default]
    Active,
    #[serde(rename = "On Hold")]
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub const ALL: [Self; 4] = [Self::Planning, Self::Active, Self::OnHold, Self::Completed];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "Planning",
            Self::Active => "Active",
            Self::OnHold => "On Hold",
            Self::Completed => "Completed",
        }
    }

    #[must_use]
    pub fn from_stored(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

/// A project in taskdeck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque identifier (`proj_` + 12 hex chars)
    pub id: String,

    /// Owner the project belongs to
    pub owner_id: String,

    /// Display name, unique per owner
    pub name: String,

    pub description: Option<String>,

    #[serde(default)]
    pub team_members: Vec<String>,

    #[serde(default)]
    pub scope: BTreeSet<String>,

    #[serde(default)]
    pub status: ProjectStatus,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cost_center: Option<String>,

    #[serde(default)]
    pub links: LinkGroups,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Project {
    /// Create a new active project with default values.
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("proj_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

        Self {
            id,
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            team_members: Vec::new(),
            scope: BTreeSet::new(),
            status: ProjectStatus::default(),
            start_date: None,
            end_date: None,
            cost_center: None,
            links: LinkGroups::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial project update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub team_members: Option<Vec<String>>,
    pub scope: Option<BTreeSet<String>>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub cost_center: Option<Option<String>>,
    pub links: Option<LinkGroups>,
}

impl ProjectPatch {
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            project.description.clone_from(description);
        }
        if let Some(members) = &self.team_members {
            project.team_members.clone_from(members);
        }
        if let Some(scope) = &self.scope {
            project.scope.clone_from(scope);
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(start) = self.start_date {
            project.start_date = start;
        }
        if let Some(end) = self.end_date {
            project.end_date = end;
        }
        if let Some(cost_center) = &self.cost_center {
            project.cost_center.clone_from(cost_center);
        }
        if let Some(links) = &self.links {
            project.links.clone_from(links);
        }
    }
}
