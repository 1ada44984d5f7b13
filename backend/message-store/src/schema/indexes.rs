//! Index catalogue for the messages collection and the planner that picks among it

use crate::error::{StoreError, StoreResult};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Messages expire seven days after their `timestamp`
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(604_800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    /// `1` / `-1` as written in key patterns
    pub fn sign(&self) -> i8 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexKey {
    pub field: String,
    pub direction: Direction,
}

impl IndexKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    /// Present on TTL indexes only
    pub expire_after: Option<Duration>,
}

impl IndexSpec {
    pub fn new(keys: Vec<IndexKey>) -> Self {
        Self {
            keys,
            expire_after: None,
        }
    }

    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    pub fn is_ttl(&self) -> bool {
        self.expire_after.is_some()
    }

    /// `idx_<collection>_<field>_<dir>...`
    pub fn name(&self, collection: &str) -> String {
        let mut name = format!("idx_{collection}");
        for key in &self.keys {
            name.push('_');
            name.push_str(&key.field);
            name.push('_');
            name.push_str(key.direction.suffix());
        }
        name
    }

    /// Canonical `field:1,field:-1` form; two indexes with the same pattern are the same index
    pub fn key_pattern(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}:{}", k.field, k.direction.sign()))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse_key_pattern(pattern: &str) -> StoreResult<Vec<IndexKey>> {
        pattern
            .split(',')
            .map(|part| {
                let (field, sign) = part.split_once(':').ok_or_else(|| {
                    StoreError::Malformed(format!("bad index key {part:?} in {pattern:?}"))
                })?;
                let direction = match sign.trim() {
                    "1" => Direction::Asc,
                    "-1" => Direction::Desc,
                    other => {
                        return Err(StoreError::Malformed(format!(
                            "bad index direction {other:?} in {pattern:?}"
                        )))
                    }
                };
                Ok(IndexKey {
                    field: field.trim().to_string(),
                    direction,
                })
            })
            .collect()
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.key_pattern())?;
        if let Some(ttl) = self.expire_after {
            write!(f, " expire_after={}s", ttl.as_secs())?;
        }
        Ok(())
    }
}

/// The indexes every messages collection carries, in creation order
pub fn message_indexes(ttl: Duration) -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(vec![IndexKey::asc("sender_id")]),
        IndexSpec::new(vec![IndexKey::asc("recipient_id")]),
        IndexSpec::new(vec![IndexKey::asc("group_id")]),
        IndexSpec::new(vec![IndexKey::desc("timestamp")]),
        // inbox
        IndexSpec::new(vec![IndexKey::asc("recipient_id"), IndexKey::desc("timestamp")]),
        // group history
        IndexSpec::new(vec![IndexKey::asc("group_id"), IndexKey::desc("timestamp")]),
        // one direction of a conversation
        IndexSpec::new(vec![
            IndexKey::asc("sender_id"),
            IndexKey::asc("recipient_id"),
            IndexKey::desc("timestamp"),
        ]),
        IndexSpec::new(vec![IndexKey::asc("timestamp")]).with_expiry(ttl),
    ]
}

/// Equality predicates plus an optional sort; one per `$or` branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    pub equality: Vec<String>,
    pub sort: Option<IndexKey>,
}

impl QueryShape {
    pub fn new(equality: &[&str], sort: Option<IndexKey>) -> Self {
        Self {
            equality: equality.iter().map(|f| f.to_string()).collect(),
            sort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Fit {
    SortOnly,
    LeadingEquality,
    EqualityPrefix,
    EqualityPrefixThenSort,
}

struct Candidate<'a> {
    index: &'a IndexSpec,
    fit: Fit,
    exact_direction: bool,
    position: usize,
}

fn fit_of(index: &IndexSpec, shape: &QueryShape) -> Option<(Fit, bool)> {
    let eq_len = shape.equality.len();
    let first = index.keys.first()?;

    if eq_len > 0 && index.keys.len() >= eq_len {
        let prefix_matches = index.keys[..eq_len]
            .iter()
            .all(|k| shape.equality.contains(&k.field))
            && shape
                .equality
                .iter()
                .all(|f| index.keys[..eq_len].iter().any(|k| &k.field == f));

        if prefix_matches {
            if let (Some(sort), Some(next)) = (&shape.sort, index.keys.get(eq_len)) {
                if next.field == sort.field {
                    return Some((Fit::EqualityPrefixThenSort, next.direction == sort.direction));
                }
            }
            return Some((Fit::EqualityPrefix, true));
        }
    }

    if shape.equality.contains(&first.field) {
        return Some((Fit::LeadingEquality, true));
    }

    match &shape.sort {
        Some(sort) if first.field == sort.field => {
            Some((Fit::SortOnly, first.direction == sort.direction))
        }
        _ => None,
    }
}

/// Pick the index that serves `shape`, or `None` for a collection scan
///
/// Preference: equality prefix followed by the sort key (either scan
/// direction), then equality prefix, then an index led by one equality
/// field, then an index on the sort key. Ties go to an index already in the
/// requested direction, then fewer keys, then declaration order.
pub fn select_index<'a>(indexes: &'a [IndexSpec], shape: &QueryShape) -> Option<&'a IndexSpec> {
    best_candidate(indexes, shape).map(|c| c.index)
}

fn best_candidate<'a>(indexes: &'a [IndexSpec], shape: &QueryShape) -> Option<Candidate<'a>> {
    indexes
        .iter()
        .enumerate()
        .filter_map(|(position, index)| {
            fit_of(index, shape).map(|(fit, exact_direction)| Candidate {
                index,
                fit,
                exact_direction,
                position,
            })
        })
        .max_by(|a, b| {
            a.fit
                .cmp(&b.fit)
                .then(a.exact_direction.cmp(&b.exact_direction))
                .then(b.index.keys.len().cmp(&a.index.keys.len()))
                .then(b.position.cmp(&a.position))
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBranch {
    /// `None` means a collection scan
    pub index: Option<String>,
    /// Results come out of the index already ordered
    pub sort_covered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueryPlan {
    pub branches: Vec<PlannedBranch>,
}

impl QueryPlan {
    /// Plan each branch against the catalogue
    pub fn for_shapes(indexes: &[IndexSpec], collection: &str, shapes: &[QueryShape]) -> Self {
        let branches = shapes
            .iter()
            .map(|shape| match best_candidate(indexes, shape) {
                Some(candidate) => PlannedBranch {
                    index: Some(candidate.index.name(collection)),
                    sort_covered: shape.sort.is_none()
                        || matches!(candidate.fit, Fit::EqualityPrefixThenSort | Fit::SortOnly),
                },
                None => PlannedBranch {
                    index: None,
                    sort_covered: shape.sort.is_none(),
                },
            })
            .collect();
        Self { branches }
    }

    pub fn uses_index(&self, name: &str) -> bool {
        self.branches
            .iter()
            .any(|b| b.index.as_deref() == Some(name))
    }

    pub fn is_collection_scan(&self) -> bool {
        self.branches.iter().any(|b| b.index.is_none())
    }

    pub fn index_names(&self) -> Vec<&str> {
        self.branches
            .iter()
            .filter_map(|b| b.index.as_deref())
            .collect()
    }
}
