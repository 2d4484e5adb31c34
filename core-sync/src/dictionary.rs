//! Per-batch entity dictionaries
//!
//! Before a batch of comics is written, every character, team, person, role
//! and so on that the batch mentions must exist in its name table. The
//! builder inserts only the names that are missing, in one statement per
//! kind, then loads a lowercase-name to id map that the ingestor resolves
//! against.

use core_library::models::{name_key, EntityId, EntityKind};
use core_library::Catalog;
use core_metadata::names::{normalize_role, normalize_text, split_optional};
use core_metadata::ComicMetadata;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument};

use crate::error::{Result, SyncError};
use crate::ingestor::PendingComic;

/// The free-text field of `metadata` that feeds `kind`, for junction kinds.
pub(crate) fn tag_field(metadata: &ComicMetadata, kind: EntityKind) -> Option<&str> {
    match kind {
        EntityKind::Character => metadata.characters.as_deref(),
        EntityKind::Team => metadata.teams.as_deref(),
        EntityKind::Location => metadata.locations.as_deref(),
        EntityKind::StoryArc => metadata.story_arcs.as_deref(),
        EntityKind::Genre => metadata.genres.as_deref(),
        EntityKind::GenericTag => metadata.tags.as_deref(),
        EntityKind::Person | EntityKind::Role => None,
    }
}

/// Credits of `metadata` as normalized `(person, role)` names. Pairs with an
/// empty side are dropped.
pub(crate) fn credit_names(metadata: &ComicMetadata) -> Vec<(String, String)> {
    metadata
        .credits
        .iter()
        .map(|credit| (normalize_text(&credit.person), normalize_role(&credit.role)))
        .filter(|(person, role)| !person.is_empty() && !role.is_empty())
        .collect()
}

/// Every name `metadata` refers to, grouped by kind.
pub fn referenced_names(metadata: &ComicMetadata) -> BTreeMap<EntityKind, Vec<String>> {
    let mut names: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();

    for kind in EntityKind::ASSOCIATED {
        let values = split_optional(tag_field(metadata, kind));
        if !values.is_empty() {
            names.insert(kind, values);
        }
    }

    for (person, role) in credit_names(metadata) {
        names.entry(EntityKind::Person).or_default().push(person);
        names.entry(EntityKind::Role).or_default().push(role);
    }

    names
}

/// Lowercase name to id, per kind, for one batch.
#[derive(Debug, Default)]
pub struct EntityDictionary {
    ids: HashMap<EntityKind, HashMap<String, EntityId>>,
    inserted: u64,
}

impl EntityDictionary {
    pub fn get(&self, kind: EntityKind, name: &str) -> Option<EntityId> {
        self.ids.get(&kind)?.get(&name_key(name)).copied()
    }

    /// Like [`get`](Self::get), but a miss is an error.
    pub fn resolve(&self, kind: EntityKind, name: &str) -> Result<EntityId> {
        self.get(kind, name).ok_or_else(|| SyncError::MissingEntity {
            kind,
            name: name.to_string(),
        })
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.ids.get(&kind).map_or(0, HashMap::len)
    }

    /// Names created while building this dictionary.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }
}

pub struct EntityDictionaryBuilder {
    catalog: Catalog,
}

impl EntityDictionaryBuilder {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Make sure every name in `batch` is stored and return the dictionary.
    ///
    /// Missing names are inserted and committed in their own transaction.
    /// When nothing is missing the catalog is only read.
    #[instrument(skip_all, fields(records = batch.len()))]
    pub async fn build(&self, batch: &[PendingComic]) -> Result<EntityDictionary> {
        let wanted = collect_wanted(batch);

        let mut absent: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
        for (kind, names) in &wanted {
            let existing: HashSet<String> = self
                .catalog
                .entities
                .names(*kind)
                .await?
                .iter()
                .map(|name| name_key(name))
                .collect();

            let missing: Vec<String> = names
                .iter()
                .filter(|name| !existing.contains(&name_key(name)))
                .cloned()
                .collect();

            if !missing.is_empty() {
                absent.insert(*kind, missing);
            }
        }

        let mut inserted = 0;
        if !absent.is_empty() {
            let mut tx = self.catalog.writer.begin().await?;
            for (kind, names) in &absent {
                match tx.insert_entity_names(*kind, names).await {
                    Ok(count) => inserted += count,
                    Err(e) => {
                        tx.rollback().await?;
                        return Err(e.into());
                    }
                }
            }
            tx.commit().await?;
            debug!(inserted, "Stored new entity names");
        }

        let mut ids = HashMap::with_capacity(wanted.len());
        for kind in wanted.keys() {
            let rows = self.catalog.entities.load(*kind).await?;
            let map: HashMap<String, EntityId> = rows
                .into_iter()
                .map(|entity| (name_key(&entity.name), entity.id))
                .collect();
            ids.insert(*kind, map);
        }

        Ok(EntityDictionary { ids, inserted })
    }
}

/// Union of the names referenced by `batch`, case-insensitively unique per
/// kind, first spelling wins.
fn collect_wanted(batch: &[PendingComic]) -> BTreeMap<EntityKind, Vec<String>> {
    let mut wanted: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
    let mut seen: HashMap<EntityKind, HashSet<String>> = HashMap::new();

    for record in batch {
        for (kind, names) in referenced_names(&record.metadata) {
            let seen = seen.entry(kind).or_default();
            for name in names {
                if seen.insert(name_key(&name)) {
                    wanted.entry(kind).or_default().push(name);
                }
            }
        }
    }

    wanted
}
