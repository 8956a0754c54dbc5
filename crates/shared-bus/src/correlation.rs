//! Correlation IDs.
//!
//! Correlation IDs tie related events together across components. A context
//! carries them sorted and deduplicated; every event created from it
//! snapshots the set.
//!
//! Subsystems register a prefix for the correlation IDs they mint, so that
//! `rpc:/svc.Method:01H...` can be traced back to the RPC layer.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use ulid::{Generator, Ulid};

use crate::context::Context;

lazy_static! {
    static ref GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());
    static ref PREFIXES: RwLock<PrefixRegistry> = RwLock::new(PrefixRegistry::default());
}

/// A fresh, globally unique ID whose text sorts by creation time.
pub fn new_correlation_id() -> String {
    let id = GENERATOR
        .lock()
        .generate()
        // Only fails when the random part overflows within one millisecond.
        .unwrap_or_else(|_| Ulid::new());
    id.to_string()
}

/// Merge two sorted, deduplicated lists into one.
pub(crate) fn merge_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                merged.push(a[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(b[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

/// Sort and deduplicate a list of IDs.
pub(crate) fn normalize<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Return a context carrying the union of the context's correlation IDs and
/// `ids`, sorted and deduplicated. The input is not modified.
pub fn context_with_correlation_id<S: AsRef<str>>(ctx: &Context, ids: &[S]) -> Context {
    if ids.is_empty() {
        return ctx.clone();
    }
    let merged = merge_sorted(ctx.correlation_ids(), &normalize(ids));
    ctx.with_sorted_correlation_ids(merged)
}

/// Correlation IDs carried by the context.
pub fn correlation_ids_from_context(ctx: &Context) -> Vec<String> {
    ctx.correlation_ids().to_vec()
}

#[derive(Default)]
struct PrefixRegistry {
    by_class: BTreeMap<String, BTreeSet<String>>,
    by_prefix: BTreeMap<String, String>,
}

/// Handle for minting correlation IDs under a registered prefix.
#[derive(Debug, Clone)]
pub struct CorrelationPrefix {
    prefix: String,
}

impl CorrelationPrefix {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build `"<prefix>:<suffix>:<suffix>..."`.
    pub fn format(&self, suffixes: &[&str]) -> String {
        let mut id = self.prefix.clone();
        for suffix in suffixes {
            id.push(':');
            id.push_str(suffix);
        }
        id
    }

    /// Whether `id` was minted under this prefix.
    pub fn owns(&self, id: &str) -> bool {
        id.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false)
    }

    /// Attach a correlation ID built from `suffixes` (or a fresh ID when
    /// there are none), unless the context already carries one with this
    /// prefix.
    pub fn attach(&self, ctx: &Context, suffixes: &[&str]) -> Context {
        if ctx.correlation_ids().iter().any(|id| self.owns(id)) {
            return ctx.clone();
        }
        let id = if suffixes.is_empty() {
            let fresh = new_correlation_id();
            self.format(&[fresh.as_str()])
        } else {
            self.format(suffixes)
        };
        context_with_correlation_id(ctx, &[id])
    }
}

/// Register `prefix` under `class`.
///
/// # Panics
///
/// Panics if the prefix is empty, contains `:`, or is already registered.
pub fn register_correlation_prefix(class: &str, prefix: &str) -> CorrelationPrefix {
    assert!(
        !prefix.is_empty() && !prefix.contains(':'),
        "invalid correlation prefix `{prefix}`"
    );
    let mut registry = PREFIXES.write();
    if let Some(owner) = registry.by_prefix.get(prefix) {
        panic!("correlation prefix `{prefix}` is already registered to class `{owner}`");
    }
    registry
        .by_prefix
        .insert(prefix.to_string(), class.to_string());
    registry
        .by_class
        .entry(class.to_string())
        .or_default()
        .insert(prefix.to_string());
    CorrelationPrefix {
        prefix: prefix.to_string(),
    }
}

/// The class a prefix was registered under.
pub fn correlation_class(prefix: &str) -> Option<String> {
    PREFIXES.read().by_prefix.get(prefix).cloned()
}

/// All prefixes registered under a class.
pub fn correlation_prefixes(class: &str) -> Vec<String> {
    PREFIXES
        .read()
        .by_class
        .get(class)
        .map(|prefixes| prefixes.iter().cloned().collect())
        .unwrap_or_default()
}
