//! Catalog entities as served to clients.
//!
//! Blob columns are carried as raw JSON fragments: they are validated once when
//! the row is folded and written back verbatim on serialization.

use serde::Serialize;
use serde_json::value::RawValue;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecord {
    pub creation_date: String,
    pub project_name: String,
    pub variable_metadata: Box<RawValue>,
    pub output_metadata: Box<RawValue>,
    pub assets: Box<RawValue>,
    pub deleted: bool,
    pub metadata: MetadataRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataRecord {
    pub captions: Box<RawValue>,
    pub description: Description,
    pub human_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Description {
    pub slug: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionRecord {
    pub id: String,
    pub scoped_id: String,
    pub parameters: Box<RawValue>,
    pub output_parameters: Box<RawValue>,
    pub files: Vec<AssetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    pub tag: String,
    pub file: String,
}
