//! Portal-facing project metadata (`metadata.json`)

use crate::error::Result;
use crate::store::json::{self, Loaded};
use crate::types::{Project, ProjectMetadata};
use chrono::Utc;
use std::path::PathBuf;

/// Fields supplied by the caller when (re)writing metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(project: &Project) -> Self {
        Self {
            path: project.metadata_path(),
        }
    }

    pub fn read(&self) -> Loaded<ProjectMetadata> {
        json::load(&self.path)
    }

    /// Write metadata, keeping `createdAt` from an existing readable file.
    pub fn write(&self, update: MetadataUpdate) -> Result<ProjectMetadata> {
        let now = Utc::now();
        let created_at = self.read().parsed().map(|m| m.created_at).unwrap_or(now);

        let metadata = ProjectMetadata {
            title: update.title,
            description: update.description,
            category: update.category,
            tags: update.tags,
            summary: update.summary,
            created_at,
            updated_at: now,
        };

        json::write_atomic(&self.path, &metadata)?;
        tracing::info!(title = %metadata.title, "Metadata saved");
        Ok(metadata)
    }
}

/// Tool-style confirmation for a metadata write
pub fn format_metadata_saved(metadata: &ProjectMetadata) -> String {
    format!(
        "Metadata saved successfully!\n\nTitle: {}\nCategory: {}\nTags: {}\n\nThis project will now display as '{}' in the research portal.",
        metadata.title,
        metadata.category,
        metadata.tags.join(", "),
        metadata.title
    )
}
