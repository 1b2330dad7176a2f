// Backup file format for the user's curated stories and preferences

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Category, UserStories};
use crate::StoryKeepError;

/// Version written into every export.
pub const EXPORT_FORMAT_VERSION: &str = "2.0.0";

/// Full cross-category state plus preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub user_stories: UserStories,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

impl ExportBundle {
    pub fn new(
        user_stories: UserStories,
        preferences: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            user_stories,
            preferences,
        }
    }

    /// Parse and validate an export file.
    pub fn from_json(json: &str) -> Result<Self, StoryKeepError> {
        let bundle: ExportBundle = serde_json::from_str(json)
            .map_err(|e| StoryKeepError::InvalidExport(e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn to_json_pretty(&self) -> Result<String, StoryKeepError> {
        serde_json::to_string_pretty(self).map_err(|e| StoryKeepError::InvalidExport(e.to_string()))
    }

    /// Major version must match, and each record must sit in the list of its own category.
    pub fn validate(&self) -> Result<(), StoryKeepError> {
        let major = |v: &str| v.split('.').next().map(str::to_owned);
        if major(&self.version) != major(EXPORT_FORMAT_VERSION) {
            return Err(StoryKeepError::InvalidExport(format!(
                "unsupported export version {}",
                self.version
            )));
        }

        for category in Category::ALL {
            for record in self.user_stories.category(category) {
                if record.category != category {
                    return Err(StoryKeepError::InvalidExport(format!(
                        "record {} tagged {} found in {} list",
                        record.id(),
                        record.category,
                        category
                    )));
                }
                if record.id().is_empty() {
                    return Err(StoryKeepError::InvalidExport(format!(
                        "record without id in {} list",
                        category
                    )));
                }
            }
        }
        Ok(())
    }
}
