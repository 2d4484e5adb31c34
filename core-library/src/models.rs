//! Domain models for the comic catalog
//!
//! This module contains the persisted row types and the write-side value
//! objects handed to [`CatalogTransaction`](crate::catalog::CatalogTransaction).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;

/// Current time as Unix epoch milliseconds, the unit of every catalog timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// ID Types
// =============================================================================

/// Identifier of a comic row. Allocated by SQLite and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ComicId(pub i64);

impl fmt::Display for ComicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a row in one of the named-entity tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Named entities
// =============================================================================

/// The eight deduplicated name tables.
///
/// The first six are attached to comics through a junction table; `Person`
/// and `Role` only appear together as a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Team,
    Location,
    StoryArc,
    Genre,
    GenericTag,
    Person,
    Role,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Character,
        EntityKind::Team,
        EntityKind::Location,
        EntityKind::StoryArc,
        EntityKind::Genre,
        EntityKind::GenericTag,
        EntityKind::Person,
        EntityKind::Role,
    ];

    /// Kinds linked to comics through a junction table.
    pub const ASSOCIATED: [EntityKind; 6] = [
        EntityKind::Character,
        EntityKind::Team,
        EntityKind::Location,
        EntityKind::StoryArc,
        EntityKind::Genre,
        EntityKind::GenericTag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Team => "team",
            EntityKind::Location => "location",
            EntityKind::StoryArc => "story_arc",
            EntityKind::Genre => "genre",
            EntityKind::GenericTag => "generic_tag",
            EntityKind::Person => "person",
            EntityKind::Role => "role",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Character => "characters",
            EntityKind::Team => "teams",
            EntityKind::Location => "locations",
            EntityKind::StoryArc => "storyarcs",
            EntityKind::Genre => "genres",
            EntityKind::GenericTag => "generictags",
            EntityKind::Person => "persons",
            EntityKind::Role => "roles",
        }
    }

    /// Junction table joining comics to this kind, `None` for credit-only kinds.
    pub fn join_table(&self) -> Option<&'static str> {
        match self {
            EntityKind::Character => Some("comics_characters"),
            EntityKind::Team => Some("comics_teams"),
            EntityKind::Location => Some("comics_locations"),
            EntityKind::StoryArc => Some("comics_storyarcs"),
            EntityKind::Genre => Some("comics_genres"),
            EntityKind::GenericTag => Some("comics_generictags"),
            EntityKind::Person | EntityKind::Role => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| LibraryError::InvalidInput {
                field: "entity_kind".to_string(),
                message: format!("unknown entity kind '{}'", s),
            })
    }
}

/// A row of one of the named-entity tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NamedEntity {
    pub id: EntityId,
    pub name: String,
}

/// Fold a name to the key used for case-insensitive comparison.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

// =============================================================================
// Comics
// =============================================================================

/// A cataloged comic file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comic {
    pub id: ComicId,
    /// Absolute path, unique across the catalog
    pub path: String,
    pub folder: String,
    pub file: String,
    pub series: Option<String>,
    pub issue: Option<String>,
    /// Sortable numeric form of `issue`
    pub issue_num: Option<f64>,
    /// Cover date built from year/month/day
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
    pub volume: Option<i32>,
    pub page_count: Option<i32>,
    pub comments: Option<String>,
    pub publisher: Option<String>,
    pub title: Option<String>,
    pub imprint: Option<String>,
    pub weblink: Option<String>,
    pub filesize: i64,
    pub hash: Option<String>,
    pub added_ts: i64,
    /// File modification time observed when the comic was ingested
    pub mod_ts: i64,
    pub deleted_ts: Option<i64>,
    pub lastread_ts: Option<i64>,
    pub lastread_page: Option<i32>,
}

/// The minimal projection needed to decide whether a comic is stale.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ComicStamp {
    pub id: ComicId,
    pub path: String,
    pub mod_ts: i64,
}

/// Person/role pair attached to a comic, by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CreditRef {
    pub person_id: EntityId,
    pub role_id: EntityId,
}

/// Person/role pair attached to a comic, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreditName {
    pub person: String,
    pub role: String,
}

/// A comic row to be inserted, with its associations already resolved to ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewComic {
    pub path: String,
    pub folder: String,
    pub file: String,
    pub series: Option<String>,
    pub issue: Option<String>,
    pub issue_num: Option<f64>,
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
    pub volume: Option<i32>,
    pub page_count: Option<i32>,
    pub comments: Option<String>,
    pub publisher: Option<String>,
    pub title: Option<String>,
    pub imprint: Option<String>,
    pub weblink: Option<String>,
    pub filesize: i64,
    pub hash: Option<String>,
    pub added_ts: i64,
    pub mod_ts: i64,
    pub associations: BTreeMap<EntityKind, BTreeSet<EntityId>>,
    pub credits: BTreeSet<CreditRef>,
}

impl NewComic {
    /// Validate invariants that the schema cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Comic path cannot be empty".to_string());
        }

        if self.file.is_empty() {
            return Err(format!("Comic path '{}' has no file name", self.path));
        }

        if let Some(kind) = self
            .associations
            .keys()
            .find(|kind| kind.join_table().is_none())
        {
            return Err(format!("{} cannot be associated directly, use a credit", kind));
        }

        Ok(())
    }
}

// =============================================================================
// Change feed & catalog identity
// =============================================================================

/// Tombstone written whenever a comic row is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DeletedComic {
    pub id: i64,
    pub comic_id: ComicId,
    pub ts: i64,
}

/// Catalog identity and freshness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DatabaseInfo {
    pub uuid: String,
    pub created: i64,
    pub last_updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("publisher".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_only_tag_kinds_have_join_tables() {
        for kind in EntityKind::ASSOCIATED {
            assert!(kind.join_table().is_some(), "{} should join", kind);
        }
        assert!(EntityKind::Person.join_table().is_none());
        assert!(EntityKind::Role.join_table().is_none());
    }

    #[test]
    fn test_name_key_folds_unicode_case() {
        assert_eq!(name_key("ÉMILE"), name_key("émile"));
        assert_eq!(name_key("Spider-Man"), "spider-man");
    }

    #[test]
    fn test_new_comic_validation() {
        let mut comic = NewComic {
            path: "/comics/a.cbz".to_string(),
            folder: "/comics".to_string(),
            file: "a.cbz".to_string(),
            ..Default::default()
        };
        assert!(comic.validate().is_ok());

        comic
            .associations
            .entry(EntityKind::Person)
            .or_default()
            .insert(EntityId(1));
        assert!(comic.validate().unwrap_err().contains("credit"));

        let empty = NewComic::default();
        assert!(empty.validate().is_err());
    }
}
