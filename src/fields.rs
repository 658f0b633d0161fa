//! Field classification tables for the stack and event tiers.
//!
//! Each table maps a lower-cased name (canonical or alias) to its canonical
//! field name, so lookups are case-insensitive and alias-aware.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::FieldConfig;

/// Fields stored only on stacks
const STACK_ONLY_FIELDS: &[(&str, &[&str])] = &[
    ("last_occurrence", &["last"]),
    ("references", &["links"]),
    ("status", &[]),
    ("snooze_until_utc", &["snooze_until"]),
    ("signature_hash", &["signature"]),
    ("title", &[]),
    ("description", &[]),
    ("first_occurrence", &["first"]),
    ("date_fixed", &["fixedon"]),
    ("fixed_in_version", &["fixed_in"]),
    ("occurrences_are_critical", &["critical"]),
    ("total_occurrences", &["occurrences"]),
];

/// Stack-only fields with no storage, expanded into `status` predicates
const STACK_ONLY_VIRTUAL_FIELDS: &[(&str, &[&str])] = &[
    ("is_fixed", &[]),
    ("is_regressed", &[]),
    ("is_hidden", &[]),
];

/// Shared fields whose truth value is the same for a stack and its events
const NON_INVERTIBLE_FIELDS: &[(&str, &[&str])] = &[
    ("organization_id", &["organization"]),
    ("project_id", &["project"]),
    ("stack_id", &["stack", "id"]),
    ("type", &[]),
];

/// Shared fields beyond the non-invertible ones
const EXTRA_SHARED_FIELDS: &[(&str, &[&str])] = &[("tags", &["tag"])];

/// A case-insensitive set of fields with aliases.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    names: HashMap<String, String>,
}

impl FieldSet {
    fn from_table(table: &[(&str, &[&str])]) -> Self {
        let mut set = Self::default();
        for (field, aliases) in table {
            set.insert(field, aliases.iter().copied());
        }
        set
    }

    /// Registers `field` under its own name and every alias.
    pub fn insert<'a>(&mut self, field: &str, aliases: impl IntoIterator<Item = &'a str>) {
        let canonical = field.to_ascii_lowercase();
        for alias in aliases {
            self.names.insert(alias.to_ascii_lowercase(), canonical.clone());
        }
        self.names.insert(canonical.clone(), canonical);
    }

    pub fn extend(&mut self, other: &FieldSet) {
        self.names
            .extend(other.names.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn contains(&self, field: &str) -> bool {
        self.names.contains_key(&field.to_ascii_lowercase())
    }

    /// Canonical name for `field`, if it belongs to this set.
    pub fn canonical(&self, field: &str) -> Option<&str> {
        self.names.get(&field.to_ascii_lowercase()).map(String::as_str)
    }
}

/// The four classification tables consulted by the rewriter.
#[derive(Debug, Clone)]
pub struct FieldTables {
    pub stack_only: FieldSet,
    pub stack_only_virtual: FieldSet,
    pub non_invertible: FieldSet,
    /// Always a superset of `non_invertible`
    pub shared: FieldSet,
}

impl Default for FieldTables {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

impl FieldTables {
    /// The built-in tables, built once per process.
    pub fn builtin() -> &'static FieldTables {
        static TABLES: OnceLock<FieldTables> = OnceLock::new();
        TABLES.get_or_init(|| {
            let non_invertible = FieldSet::from_table(NON_INVERTIBLE_FIELDS);
            let mut shared = FieldSet::from_table(EXTRA_SHARED_FIELDS);
            shared.extend(&non_invertible);
            FieldTables {
                stack_only: FieldSet::from_table(STACK_ONLY_FIELDS),
                stack_only_virtual: FieldSet::from_table(STACK_ONLY_VIRTUAL_FIELDS),
                non_invertible,
                shared,
            }
        })
    }

    /// The built-in tables extended with the entries of `config`.
    pub fn with_config(config: &FieldConfig) -> Self {
        let mut tables = Self::default();
        for (field, aliases) in &config.stack_only {
            tables.stack_only.insert(field, aliases.iter().map(String::as_str));
        }
        for (field, aliases) in &config.stack_only_virtual {
            tables
                .stack_only_virtual
                .insert(field, aliases.iter().map(String::as_str));
        }
        for (field, aliases) in &config.non_invertible {
            tables
                .non_invertible
                .insert(field, aliases.iter().map(String::as_str));
            tables.shared.insert(field, aliases.iter().map(String::as_str));
        }
        for (field, aliases) in &config.shared {
            tables.shared.insert(field, aliases.iter().map(String::as_str));
        }
        tables
    }

    pub fn is_shared(&self, field: &str) -> bool {
        self.shared.contains(field)
    }

    pub fn is_stack_only(&self, field: &str) -> bool {
        self.stack_only.contains(field)
    }

    pub fn is_stack_only_virtual(&self, field: &str) -> bool {
        self.stack_only_virtual.contains(field)
    }

    pub fn is_non_invertible(&self, field: &str) -> bool {
        self.non_invertible.contains(field)
    }

    /// Canonical name of `field` in whichever table knows it, or the
    /// lower-cased name for unclassified fields.
    pub fn canonical(&self, field: &str) -> String {
        [
            &self.shared,
            &self.stack_only,
            &self.stack_only_virtual,
            &self.non_invertible,
        ]
        .into_iter()
        .find_map(|set| set.canonical(field))
        .map(str::to_string)
        .unwrap_or_else(|| field.to_ascii_lowercase())
    }
}
