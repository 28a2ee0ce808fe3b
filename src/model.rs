//! Core data model: samples, state sets, tag definitions, and filter
//! configuration.
//!
//! # Examples
//!
//! ```rust
//! use aika_core::model::{Quality, Sample};
//! use chrono::Utc;
//!
//! let s = Sample::numeric(Utc::now(), 42.0, Quality::Good, "degC");
//! assert_eq!(s.quality, Quality::Good);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use self::uuid_like::TagId;

/// Minimal RFC-4122-shaped identifier used for tags, avoiding a dependency
/// on a dedicated UUID crate for a single opaque 128-bit id.
pub mod uuid_like {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Opaque tag identifier, unique for the lifetime of a [`crate::registry::TagRegistry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct TagId(pub u128);

    static NEXT: AtomicU64 = AtomicU64::new(1);

    impl TagId {
        /// Generates a fresh, process-unique id.
        ///
        /// Grounded on the monotonic counter idiom the teacher's dictionary
        /// uses for string ids; a full UUID generator is unnecessary
        /// complexity for an in-process identifier with no cross-process
        /// uniqueness requirement.
        pub fn new() -> Self {
            let low = NEXT.fetch_add(1, Ordering::Relaxed);
            TagId(((std::process::id() as u128) << 64) | low as u128)
        }
    }

    impl Default for TagId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for TagId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:032x}", self.0)
        }
    }
}

/// Data quality, ordered `Bad < Uncertain < Good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    /// The value should not be trusted.
    Bad,
    /// The value may be stale or derived under degraded conditions.
    Uncertain,
    /// The value is trustworthy.
    Good,
}

impl Quality {
    /// The worst (lowest) of two qualities, used when combining inputs.
    pub fn worst(self, other: Quality) -> Quality {
        self.min(other)
    }

    /// Folds an iterator of qualities to the worst one, defaulting to
    /// [`Quality::Good`] for an empty input (the identity for `worst`).
    pub fn worst_of<I: IntoIterator<Item = Quality>>(qualities: I) -> Quality {
        qualities
            .into_iter()
            .fold(Quality::Good, |acc, q| acc.worst(q))
    }
}

/// The data type a tag carries, governing how exception/compression filters
/// interpret its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// IEEE-754 double, compared with a deviation-based filter.
    FloatingPoint,
    /// Signed integer, stored and compared as a float for filter purposes.
    Integer,
    /// Text, filtered by equality ("emit on change").
    Text,
    /// Enumerated value from a named [`StateSet`], filtered by equality.
    State,
}

impl DataType {
    /// Discrete types (`Text`, `State`) degenerate both filters to
    /// "emit on change" per spec.md §4.2/§4.3.
    pub fn is_discrete(self) -> bool {
        matches!(self, DataType::Text | DataType::State)
    }
}

/// An immutable sample of a tag's value at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The instant the sample was taken, UTC.
    pub utc_time: DateTime<Utc>,
    /// The numeric value; may be NaN/±∞ for non-numeric data types.
    pub numeric: f64,
    /// Canonical display text, if any (required for `Text`/`State` tags).
    pub text: Option<String>,
    /// Data quality of this sample.
    pub quality: Quality,
    /// Units, denormalized from the tag definition at write time.
    pub units: String,
}

impl Sample {
    /// Builds a numeric sample with no display text.
    pub fn numeric(utc_time: DateTime<Utc>, numeric: f64, quality: Quality, units: &str) -> Self {
        Self {
            utc_time,
            numeric,
            text: None,
            quality,
            units: units.to_string(),
        }
    }

    /// Builds a text/state sample; `numeric` carries the state's integer
    /// value (or `NaN` for a plain `Text` tag).
    pub fn textual(
        utc_time: DateTime<Utc>,
        numeric: f64,
        text: impl Into<String>,
        quality: Quality,
        units: &str,
    ) -> Self {
        Self {
            utc_time,
            numeric,
            text: Some(text.into()),
            quality,
            units: units.to_string(),
        }
    }

    /// Bitwise equality of `numeric`, so NaN compares equal to NaN and
    /// distinct NaN payloads compare unequal, per spec.md §4.2's "compare by
    /// exact bit pattern" rule for non-finite operands.
    pub fn numeric_bits_eq(&self, other: &Sample) -> bool {
        self.numeric.to_bits() == other.numeric.to_bits()
    }

    /// Whether this sample's `numeric` is a finite IEEE-754 value.
    pub fn is_finite(&self) -> bool {
        self.numeric.is_finite()
    }
}

/// A named, ordered enumeration used by `State`-typed tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSet {
    /// Unique (case-sensitive) name of this state set.
    pub name: String,
    /// Ordered `(name, value)` pairs; values are unique within the set.
    pub members: Vec<(String, i64)>,
}

impl StateSet {
    /// Resolves a member name to its integer value.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, v)| *v)
    }

    /// Resolves an integer value to its member name.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }

    /// Validates that member values are unique within the set.
    pub fn validate(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.members.iter().all(|(_, v)| seen.insert(*v))
    }
}

/// How a filter's `limit` is interpreted against the prior retained value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviationKind {
    /// `limit` is an absolute value in the tag's units.
    Absolute,
    /// `limit` is a raw fraction of `|prior value|` (e.g. `0.05`).
    Fraction,
    /// `limit` is a percent of `|prior value|` (e.g. `5` means 5%).
    Percent,
}

/// Configuration shared by the exception and compression filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// When `false`, the filter passes/archives every sample unmodified.
    pub enabled: bool,
    /// How `limit` is interpreted.
    pub deviation_kind: DeviationKind,
    /// The deviation threshold, interpreted per `deviation_kind`. Must be `>= 0`.
    pub limit: f64,
    /// Maximum time a tag may go without a retained sample before one is
    /// forced through regardless of deviation (a "heartbeat").
    pub window: chrono::Duration,
}

impl FilterConfig {
    /// Computes the absolute deviation threshold for a given prior value,
    /// per spec.md §4.2 step 7.
    pub fn limit_abs(&self, prior_numeric: f64) -> f64 {
        match self.deviation_kind {
            DeviationKind::Absolute => self.limit,
            DeviationKind::Fraction => prior_numeric.abs() * self.limit,
            DeviationKind::Percent => prior_numeric.abs() * self.limit / 100.0,
        }
    }

    /// A disabled filter config with a zero window, used as a safe default
    /// before a tag's real configuration is known.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            deviation_kind: DeviationKind::Absolute,
            limit: 0.0,
            window: chrono::Duration::zero(),
        }
    }
}

/// Audit metadata attached to a tag definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the tag was created.
    pub created_at: DateTime<Utc>,
    /// Who created it.
    pub creator: String,
    /// When the tag was last mutated.
    pub modified_at: DateTime<Utc>,
    /// Who last mutated it.
    pub modifier: String,
}

/// Ownership and policy attachment for a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// The principal that owns the tag.
    pub owner: String,
    /// Opaque policy identifiers evaluated by the (out-of-scope) authorization hook.
    pub policies: Vec<String>,
}

/// A tag's full definition: identity, type, and filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    /// Globally unique identifier.
    pub id: TagId,
    /// Case-insensitively unique display name.
    pub name: String,
    /// The tag's value type.
    pub data_type: DataType,
    /// Engineering units.
    pub units: String,
    /// Free-text description.
    pub description: String,
    /// Name of the backing [`StateSet`], required iff `data_type == State`.
    pub state_set_name: Option<String>,
    /// Exception-filter configuration.
    pub exception_cfg: FilterConfig,
    /// Compression-filter configuration.
    pub compression_cfg: FilterConfig,
    /// Audit metadata.
    pub metadata: Metadata,
    /// Ownership and policy attachment.
    pub security: Security,
}

/// Caller-supplied fields when creating or updating a tag; the registry
/// fills in `id` and `metadata` timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSettings {
    /// Desired display name.
    pub name: String,
    /// Desired value type.
    pub data_type: DataType,
    /// Engineering units.
    pub units: String,
    /// Free-text description.
    pub description: String,
    /// Backing state set name, required iff `data_type == State`.
    pub state_set_name: Option<String>,
    /// Exception-filter configuration.
    pub exception_cfg: FilterConfig,
    /// Compression-filter configuration.
    pub compression_cfg: FilterConfig,
    /// Owning principal.
    pub owner: String,
    /// Policy identifiers.
    pub policies: Vec<String>,
}

/// Quality-folded, contributor-tracked scratch space used while building
/// derived (aggregated) samples. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct Contributors {
    /// Running worst quality across all contributing inputs.
    pub quality: Option<Quality>,
}

impl Contributors {
    /// Folds in one more contributing quality.
    pub fn observe(&mut self, q: Quality) {
        self.quality = Some(match self.quality {
            Some(existing) => existing.worst(q),
            None => q,
        });
    }

    /// Resolves the folded quality, defaulting to `Good` if nothing was observed.
    pub fn resolve(&self) -> Quality {
        self.quality.unwrap_or(Quality::Good)
    }
}

/// A filter clause over tag metadata, used by [`crate::registry::TagRegistry::list`].
#[derive(Debug, Clone, PartialEq)]
pub enum TagFilter {
    /// Matches any tag (no filtering).
    Any,
    /// A glob (`*`, `?`) match against one field.
    Glob {
        /// The field to match against.
        field: TagFilterField,
        /// The glob pattern.
        pattern: String,
    },
    /// All clauses must match.
    And(Vec<TagFilter>),
    /// Any clause must match.
    Or(Vec<TagFilter>),
}

/// Fields a [`TagFilter::Glob`] clause can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilterField {
    /// The tag's display name.
    Name,
    /// The tag's description.
    Description,
    /// The tag's units.
    Units,
}

/// Pagination parameters for [`crate::registry::TagRegistry::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Page size, in `[1, 100]`.
    pub page_size: usize,
    /// 1-based page number.
    pub page: usize,
}

/// A map of tag name to a simple property bag, used in doctest/CLI output;
/// kept generic rather than tied to any particular outer-layer DTO.
pub type PropertyBag = BTreeMap<String, String>;
