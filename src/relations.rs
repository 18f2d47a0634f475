//! Relation definitions and default dependency discovery.
//!
//! A record type registers a static table of [`RelationDef`]s. When the
//! schema does not spell out its relation dependencies, they are derived
//! from that table: each relation depends on the key column(s) of this
//! record it is joined on.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::dependency::DependencyMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    /// Table holding the related records.
    pub related: String,
    #[serde(flatten)]
    pub kind: RelationKind,
}

/// The closed set of relation variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationKind {
    /// This record holds `foreign_key` pointing at `related.owner_key`.
    BelongsTo { foreign_key: String, owner_key: String },
    HasOne { foreign_key: String, local_key: String },
    HasMany { foreign_key: String, local_key: String },
    BelongsToMany {
        pivot: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
        parent_key: String,
        related_key: String,
    },
    /// Polymorphic owner: the related table is named by `type_column`.
    MorphTo { type_column: String, id_column: String },
    MorphOne {
        type_column: String,
        id_column: String,
        local_key: String,
        morph_class: String,
    },
    MorphMany {
        type_column: String,
        id_column: String,
        local_key: String,
        morph_class: String,
    },
    HasOneThrough {
        through: String,
        first_key: String,
        second_key: String,
        local_key: String,
        second_local_key: String,
    },
    HasManyThrough {
        through: String,
        first_key: String,
        second_key: String,
        local_key: String,
        second_local_key: String,
    },
}

impl RelationKind {
    /// Columns of this record the relation is keyed on.
    pub fn local_keys(&self) -> Vec<String> {
        match self {
            RelationKind::BelongsTo { foreign_key, .. } => vec![foreign_key.clone()],
            RelationKind::HasOne { local_key, .. } | RelationKind::HasMany { local_key, .. } => {
                vec![local_key.clone()]
            }
            RelationKind::BelongsToMany { parent_key, .. } => vec![parent_key.clone()],
            RelationKind::MorphTo {
                type_column,
                id_column,
            } => vec![type_column.clone(), id_column.clone()],
            RelationKind::MorphOne { local_key, .. }
            | RelationKind::MorphMany { local_key, .. }
            | RelationKind::HasOneThrough { local_key, .. }
            | RelationKind::HasManyThrough { local_key, .. } => vec![local_key.clone()],
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationKind::HasMany { .. }
                | RelationKind::BelongsToMany { .. }
                | RelationKind::MorphMany { .. }
                | RelationKind::HasManyThrough { .. }
        )
    }
}

impl RelationDef {
    pub fn new(name: impl Into<String>, related: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            related: related.into(),
            kind,
        }
    }

    /// `name` → `related`, keyed on `foreign_key` of this record and `id`
    /// of the related one.
    pub fn belongs_to(name: &str, related: &str, foreign_key: &str) -> Self {
        Self::new(
            name,
            related,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
                owner_key: "id".to_string(),
            },
        )
    }

    pub fn has_one(name: &str, related: &str, foreign_key: &str) -> Self {
        Self::new(
            name,
            related,
            RelationKind::HasOne {
                foreign_key: foreign_key.to_string(),
                local_key: "id".to_string(),
            },
        )
    }

    pub fn has_many(name: &str, related: &str, foreign_key: &str) -> Self {
        Self::new(
            name,
            related,
            RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
                local_key: "id".to_string(),
            },
        )
    }

    pub fn belongs_to_many(
        name: &str,
        related: &str,
        pivot: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> Self {
        Self::new(
            name,
            related,
            RelationKind::BelongsToMany {
                pivot: pivot.to_string(),
                foreign_pivot_key: foreign_pivot_key.to_string(),
                related_pivot_key: related_pivot_key.to_string(),
                parent_key: "id".to_string(),
                related_key: "id".to_string(),
            },
        )
    }

    /// Polymorphic owner stored in `<morph>_type` / `<morph>_id`.
    pub fn morph_to(name: &str, morph: &str) -> Self {
        Self::new(
            name,
            "",
            RelationKind::MorphTo {
                type_column: format!("{morph}_type"),
                id_column: format!("{morph}_id"),
            },
        )
    }

    pub fn morph_many(name: &str, related: &str, morph: &str, morph_class: &str) -> Self {
        Self::new(
            name,
            related,
            RelationKind::MorphMany {
                type_column: format!("{morph}_type"),
                id_column: format!("{morph}_id"),
                local_key: "id".to_string(),
                morph_class: morph_class.to_string(),
            },
        )
    }

    pub fn has_many_through(
        name: &str,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> Self {
        Self::new(
            name,
            related,
            RelationKind::HasManyThrough {
                through: through.to_string(),
                first_key: first_key.to_string(),
                second_key: second_key.to_string(),
                local_key: "id".to_string(),
                second_local_key: "id".to_string(),
            },
        )
    }
}

/// Relation name → key columns, for every registered relation.
pub fn discover(defs: &[RelationDef]) -> DependencyMap {
    let mut map = DependencyMap::new();
    for def in defs {
        map.insert(def.name.clone(), def.kind.local_keys());
    }
    map
}

type CacheKey = (String, Vec<RelationDef>);

fn cache() -> &'static RwLock<HashMap<CacheKey, Arc<DependencyMap>>> {
    static CACHE: OnceLock<RwLock<HashMap<CacheKey, Arc<DependencyMap>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// [`discover`], computed once per record type and relation table for the
/// life of the process.
pub fn discover_cached(record_type: &str, defs: &[RelationDef]) -> Arc<DependencyMap> {
    let key = (record_type.to_string(), defs.to_vec());
    if let Some(map) = cache()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Arc::clone(map);
    }

    let mut guard = cache().write().unwrap_or_else(PoisonError::into_inner);
    let map = guard.entry(key).or_insert_with(|| {
        tracing::trace!(record_type, relations = defs.len(), "discovered relations");
        Arc::new(discover(defs))
    });
    Arc::clone(map)
}
