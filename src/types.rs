//! Core data model (spec §3). All ids are content-addressed so that
//! deduplication across runs is deterministic (I1).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::compute_mdhash_id;

/// Document content types the loader registry can dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Jpg,
    Png,
    Zip,
    Txt,
    Csv,
    Text,
    Tsv,
    Html,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Docx => "docx",
            ContentType::Pptx => "pptx",
            ContentType::Xlsx => "xlsx",
            ContentType::Jpg => "jpg",
            ContentType::Png => "png",
            ContentType::Zip => "zip",
            ContentType::Txt => "txt",
            ContentType::Csv => "csv",
            ContentType::Text => "text",
            ContentType::Tsv => "tsv",
            ContentType::Html => "html",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Some(ContentType::Pdf),
            "docx" => Some(ContentType::Docx),
            "pptx" => Some(ContentType::Pptx),
            "xlsx" => Some(ContentType::Xlsx),
            "jpg" | "jpeg" => Some(ContentType::Jpg),
            "png" => Some(ContentType::Png),
            "zip" => Some(ContentType::Zip),
            "txt" => Some(ContentType::Txt),
            "csv" => Some(ContentType::Csv),
            "text" => Some(ContentType::Text),
            "tsv" => Some(ContentType::Tsv),
            "html" | "htm" => Some(ContentType::Html),
            _ => None,
        }
    }
}

/// Metadata shared by `File` and inherited by every `Chunk` of that file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub filename: String,
    pub page_number: Option<i64>,
    pub uri: String,
    pub private: bool,
}

/// A loaded document, before chunking. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub page_content: String,
    pub metadata: FileMetadata,
}

impl File {
    /// `id` is derived from the stripped `page_content` (I1, P1).
    pub fn new(page_content: String, metadata: FileMetadata) -> Self {
        let id = compute_mdhash_id(page_content.trim(), "doc-");
        Self {
            id,
            page_content,
            metadata,
        }
    }
}

/// Metadata for a `Chunk`: the file's metadata plus chunk-local fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub content_type: ContentType,
    pub filename: String,
    pub page_number: Option<i64>,
    pub uri: String,
    pub private: bool,
    pub chunk_idx: u32,
    pub document_id: String,
}

impl ChunkMetadata {
    pub fn from_file(file_meta: &FileMetadata, chunk_idx: u32, document_id: String) -> Self {
        Self {
            content_type: file_meta.content_type,
            filename: file_meta.filename.clone(),
            page_number: file_meta.page_number,
            uri: file_meta.uri.clone(),
            private: file_meta.private,
            chunk_idx,
            document_id,
        }
    }
}

/// A bounded-size, overlapping window of a document's text (P2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub page_content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// `id == "chunk-" + hex(md5(page_content))` (P2).
    pub fn new(page_content: String, metadata: ChunkMetadata) -> Self {
        let id = compute_mdhash_id(&page_content, "chunk-");
        Self {
            id,
            page_content,
            metadata,
        }
    }
}

/// Metadata for an `Entity`: type, aggregated description, back-references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity_type: String,
    pub description: String,
    pub chunk_ids: BTreeSet<String>,
}

/// A named, typed node extracted from chunks (spec §3). `page_content` is the
/// canonical (uppercased) entity name; `id` is content-addressed on it, so
/// two chunks mentioning the same name always resolve to the same entity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub page_content: String,
    pub metadata: EntityMetadata,
}

impl Entity {
    /// `name` is canonicalized (trimmed + uppercased) before hashing, so
    /// "Acme Corp" and "ACME CORP" collapse to the same entity id.
    pub fn new(name: &str, entity_type: String, description: String, chunk_id: String) -> Self {
        let canonical = name.trim().to_uppercase();
        let id = compute_mdhash_id(&canonical, "ent-");
        let mut chunk_ids = BTreeSet::new();
        chunk_ids.insert(chunk_id);
        Self {
            id,
            page_content: canonical,
            metadata: EntityMetadata {
                entity_type,
                description,
                chunk_ids,
            },
        }
    }
}

/// Properties carried by a directed graph edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationProperties {
    pub description: String,
    pub weight: f32,
    pub chunk_id: String,
}

/// A directed, weighted, described edge between two entities (spec §3).
/// Holds its endpoints by value; the graph store resolves them by id.
/// Self-loops (`source.id == target.id`) are invalid and must be discarded
/// before construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub source: Entity,
    pub target: Entity,
    pub properties: RelationProperties,
}
