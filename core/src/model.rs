// Story data model: remote stories and their locally curated copies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A story as served by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: String,
    /// Server-assigned creation time (RFC 3339).
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl Story {
    /// Minimal story, mostly useful for tests and fixtures.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            photo_url: String::new(),
            created_at: None,
            lat: None,
            lon: None,
        }
    }

    /// Coordinates, only when both halves are present.
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// One of the three independent user-curated story sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Saved,
    Liked,
    Offline,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Saved, Category::Liked, Category::Offline];

    /// Collection name, also used as the storage key prefix.
    pub fn collection(self) -> &'static str {
        match self {
            Category::Saved => "saved_stories",
            Category::Liked => "liked_stories",
            Category::Offline => "offline_stories",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Saved => "saved",
            Category::Liked => "liked",
            Category::Offline => "offline",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "saved" | "savedstories" | "saved_stories" => Ok(Category::Saved),
            "liked" | "likedstories" | "liked_stories" => Ok(Category::Liked),
            "offline" | "offlinestories" | "offline_stories" | "downloaded" => {
                Ok(Category::Offline)
            }
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// A cached copy of a remote story inside one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    #[serde(flatten)]
    pub story: Story,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl StoryRecord {
    /// Unstamped record; the store stamps it on insert.
    pub fn new(category: Category, mut story: Story) -> Self {
        if story.location().is_none() {
            story.lat = None;
            story.lon = None;
        }
        Self {
            story,
            category,
            saved_at: None,
            liked_at: None,
            downloaded_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.story.id
    }

    /// Timestamp belonging to this record's category.
    pub fn stamp(&self) -> Option<DateTime<Utc>> {
        match self.category {
            Category::Saved => self.saved_at,
            Category::Liked => self.liked_at,
            Category::Offline => self.downloaded_at,
        }
    }

    pub(crate) fn stamp_mut(&mut self) -> &mut Option<DateTime<Utc>> {
        match self.category {
            Category::Saved => &mut self.saved_at,
            Category::Liked => &mut self.liked_at,
            Category::Offline => &mut self.downloaded_at,
        }
    }
}

/// Derived membership summary for one story id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryStatus {
    pub id: String,
    pub is_saved: bool,
    pub is_liked: bool,
    pub is_offline: bool,
    pub has_any_status: bool,
}

impl StoryStatus {
    pub fn new(id: impl Into<String>, is_saved: bool, is_liked: bool, is_offline: bool) -> Self {
        Self {
            id: id.into(),
            is_saved,
            is_liked,
            is_offline,
            has_any_status: is_saved || is_liked || is_offline,
        }
    }

    pub fn contains(&self, category: Category) -> bool {
        match category {
            Category::Saved => self.is_saved,
            Category::Liked => self.is_liked,
            Category::Offline => self.is_offline,
        }
    }

    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect()
    }
}

/// Every locally curated story, grouped by category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStories {
    pub saved: Vec<StoryRecord>,
    pub liked: Vec<StoryRecord>,
    pub offline: Vec<StoryRecord>,
    pub total: usize,
}

impl UserStories {
    pub fn new(saved: Vec<StoryRecord>, liked: Vec<StoryRecord>, offline: Vec<StoryRecord>) -> Self {
        let total = saved.len() + liked.len() + offline.len();
        Self {
            saved,
            liked,
            offline,
            total,
        }
    }

    pub fn category(&self, category: Category) -> &[StoryRecord] {
        match category {
            Category::Saved => &self.saved,
            Category::Liked => &self.liked,
            Category::Offline => &self.offline,
        }
    }

    /// Stories across all categories, first occurrence of each id wins.
    pub fn unique_stories(&self) -> Vec<Story> {
        let mut seen = std::collections::HashSet::new();
        self.saved
            .iter()
            .chain(&self.liked)
            .chain(&self.offline)
            .filter(|record| seen.insert(record.story.id.clone()))
            .map(|record| record.story.clone())
            .collect()
    }
}

/// A story to be submitted to the remote API.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub description: String,
    pub photo: Vec<u8>,
    pub photo_name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Logged-in user as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub token: String,
}
