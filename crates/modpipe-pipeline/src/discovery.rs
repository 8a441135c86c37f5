//! Stage discovery: turn a namespace snapshot into an ordered stage list.
//!
//! Filtering runs first (defined here, simple callable, not a helper, not
//! excluded), then the survivors are sequenced by source position. When the
//! namespace carries source text, entries without an explicit line are
//! located by scanning it for the first top-level line defining their name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use modpipe_types::{ModpipeError, Result};
use regex::RegexSet;

use crate::source::{Binding, Entry, Namespace, Origin};
use crate::stage::{Stage, StageKind};

/// Caller-supplied predicate; returning `true` excludes the entry.
pub type Exclusion = Arc<dyn Fn(&str, &Binding) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct DiscoveryOptions {
    /// Drop names with a leading underscore.
    pub elide_helpers: bool,
    pub exclusions: Vec<Exclusion>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            elide_helpers: true,
            exclusions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Only the entries defined directly in the namespace.
pub fn defined_in(entries: Vec<Entry>) -> Vec<Entry> {
    entries
        .into_iter()
        .filter(|e| e.origin == Origin::Defined)
        .collect()
}

/// Callable, but not a type.
pub fn is_simple_callable(binding: &Binding) -> bool {
    matches!(binding, Binding::Function { .. } | Binding::Instance { .. })
}

pub fn is_pseudo_private(name: &str) -> bool {
    name.starts_with('_')
}

/// Remove, in place, every entry the predicate matches. Returns how many went.
pub fn remove_matching<P>(entries: &mut Vec<Entry>, predicate: P) -> usize
where
    P: Fn(&str, &Binding) -> bool,
{
    let before = entries.len();
    entries.retain(|e| !predicate(&e.name, &e.binding));
    before - entries.len()
}

// ---------------------------------------------------------------------------
// Sequencing
// ---------------------------------------------------------------------------

/// Order entries by source position.
///
/// With source text, positions are text lines: an entry's explicit line, or
/// else the first top-level line that defines its name (`fn name(..)`,
/// `name = ..`, `struct name`). Registration ordinals are not comparable with
/// text lines and are ignored. Without source text, explicit lines and
/// ordinals share the builder's single counter. Entries left without a
/// position fail the whole call; ties keep the incoming order.
pub fn sequence(source: Option<&str>, entries: Vec<Entry>) -> Result<Vec<(usize, Entry)>> {
    let positions: Vec<Option<usize>> = match source {
        Some(text) => {
            let scanned = scan_definitions(
                text,
                entries
                    .iter()
                    .filter(|e| e.line.is_none())
                    .map(|e| e.name.as_str()),
            )?;
            entries
                .iter()
                .map(|e| e.line.or_else(|| scanned.get(e.name.as_str()).copied()))
                .collect()
        }
        None => entries.iter().map(|e| e.line.or(e.ordinal)).collect(),
    };

    let mut unresolved: Vec<String> = entries
        .iter()
        .zip(&positions)
        .filter(|(_, position)| position.is_none())
        .map(|(e, _)| e.name.clone())
        .collect();
    if !unresolved.is_empty() {
        unresolved.sort();
        unresolved.dedup();
        return Err(ModpipeError::Unresolved { names: unresolved });
    }

    let mut placed: Vec<(usize, Entry)> = positions
        .into_iter()
        .zip(entries)
        .filter_map(|(position, e)| position.map(|line| (line, e)))
        .collect();
    placed.sort_by_key(|(line, _)| *line);
    Ok(placed)
}

/// Matches a top-level line whose leading words end in `name`.
fn definition_pattern(name: &str) -> String {
    format!(r"^(?:\w+\s+)*{}\b", regex::escape(name))
}

/// First defining line (1-based) of each name found in `text`.
fn scan_definitions<'a>(
    text: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, usize>> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut found = HashMap::new();
    if names.is_empty() {
        return Ok(found);
    }

    let set = RegexSet::new(names.iter().map(|n| definition_pattern(n)))
        .map_err(|e| ModpipeError::Other(format!("Invalid name pattern: {e}")))?;
    for (idx, line) in text.lines().enumerate() {
        for m in set.matches(line).into_iter() {
            found.entry(names[m].to_string()).or_insert(idx + 1);
        }
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

/// Produce the ordered stage list for a namespace snapshot.
///
/// May return an empty list; rejecting empty pipelines is the engine's call.
pub fn discover(namespace: Namespace, options: &DiscoveryOptions) -> Result<Vec<Stage>> {
    let Namespace {
        name: ns_name,
        source,
        entries,
        ..
    } = namespace;

    let mut candidates = defined_in(entries);
    remove_matching(&mut candidates, |_, binding| !is_simple_callable(binding));
    if options.elide_helpers {
        remove_matching(&mut candidates, |name, _| is_pseudo_private(name));
    }
    for exclusion in &options.exclusions {
        let removed = remove_matching(&mut candidates, |name, binding| exclusion(name, binding));
        tracing::trace!(namespace = %ns_name, removed, "Exclusion applied");
    }

    let ordered = sequence(source.as_deref(), candidates)?;

    let mut seen = HashSet::new();
    let mut stages = Vec::with_capacity(ordered.len());
    for (line, entry) in ordered {
        if !seen.insert(entry.name.clone()) {
            return Err(ModpipeError::DuplicateStage { name: entry.name });
        }
        let (signature, callable, kind) = match entry.binding {
            Binding::Function {
                signature,
                callable,
            } => (signature, callable, StageKind::Function),
            Binding::Instance {
                signature,
                callable,
            } => (signature, callable, StageKind::Instance),
            Binding::Type | Binding::Constant(_) => continue,
        };
        stages.push(Stage::new(entry.name, signature, callable, kind, line));
    }

    tracing::debug!(namespace = %ns_name, stages = stages.len(), "Stages discovered");
    Ok(stages)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Emit;
    use crate::stage::StageCallable;
    use modpipe_types::{Args, Signature};
    use serde_json::json;

    fn passthrough(_args: Args) -> Result<Emit> {
        Ok(Emit::Nothing)
    }

    struct Scale;
    impl StageCallable for Scale {
        fn call(&self, args: Args) -> Result<Emit> {
            Ok(args.into_payload().into())
        }
    }

    fn xy() -> Signature {
        Signature::positional(["x", "y"])
    }

    const MATH_SOURCE: &str = "\
use modpipe::{done, skip_to};

fn _is_zero(x, y)
fn normed(x, y)
fn rot90(x, y)
struct ScaleAll { a }
times_ten = ScaleAll(10)
";

    fn math_namespace() -> Namespace {
        Namespace::builder("math_mod")
            .source(MATH_SOURCE)
            .import("done", Binding::Function {
                signature: Signature::positional(["x"]),
                callable: Arc::new(passthrough),
            })
            .entry(Entry::function("_is_zero", xy(), passthrough).at_line(3))
            .entry(Entry::function("normed", xy(), passthrough).at_line(4))
            .entry(Entry::function("rot90", xy(), passthrough).at_line(5))
            .entry(Entry::new("ScaleAll", Binding::Type).at_line(6))
            .unplaced_instance("times_ten", xy(), Scale)
            .build()
    }

    fn names(entries: &[Entry]) -> HashSet<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn defined_in_drops_imports() {
        let entries = defined_in(math_namespace().entries);
        assert_eq!(
            names(&entries),
            HashSet::from(["_is_zero", "normed", "rot90", "ScaleAll", "times_ten"])
        );
    }

    #[test]
    fn types_are_not_simple_callables() {
        assert!(!is_simple_callable(&Binding::Type));
        assert!(!is_simple_callable(&Binding::Constant(json!(1))));
        assert!(is_simple_callable(&Binding::Instance {
            signature: xy(),
            callable: Arc::new(Scale),
        }));
    }

    #[test]
    fn underscores_are_pseudo_private() {
        assert!(is_pseudo_private("_name"));
        assert!(!is_pseudo_private("name"));
    }

    #[test]
    fn remove_matching_drops_helpers() {
        let mut entries = defined_in(math_namespace().entries);
        remove_matching(&mut entries, |_, b| !is_simple_callable(b));
        let removed = remove_matching(&mut entries, |n, _| is_pseudo_private(n));
        assert_eq!(removed, 1);
        assert_eq!(names(&entries), HashSet::from(["normed", "rot90", "times_ten"]));
    }

    #[test]
    fn sequence_uses_lines_and_scans_source_for_the_rest() {
        let ns = math_namespace();
        let mut entries = defined_in(ns.entries);
        remove_matching(&mut entries, |_, b| !is_simple_callable(b));
        let ordered = sequence(ns.source.as_deref(), entries).unwrap();

        let order: Vec<_> = ordered.iter().map(|(l, e)| (*l, e.name.as_str())).collect();
        assert_eq!(
            order,
            vec![(3, "_is_zero"), (4, "normed"), (5, "rot90"), (7, "times_ten")]
        );
    }

    #[test]
    fn sequence_fails_naming_every_unresolved_entry() {
        let entries = vec![
            Entry::instance("zed", xy(), Scale),
            Entry::instance("alpha", xy(), Scale),
            Entry::function("placed", xy(), passthrough).at_line(1),
        ];
        let err = sequence(Some("placed = 1\n"), entries).unwrap_err();
        match err {
            ModpipeError::Unresolved { names } => assert_eq!(names, vec!["alpha", "zed"]),
            other => panic!("Expected Unresolved, got: {other:?}"),
        }
    }

    #[test]
    fn sequence_without_source_cannot_scan() {
        let entries = vec![Entry::instance("scale", xy(), Scale)];
        assert!(matches!(
            sequence(None, entries),
            Err(ModpipeError::Unresolved { .. })
        ));
    }

    #[test]
    fn scan_takes_the_first_matching_line() {
        let source = "a = 1\nscale = Scale(2)\nscale = Scale(3)\n";
        let entries = vec![Entry::instance("scale", xy(), Scale)];
        let ordered = sequence(Some(source), entries).unwrap();
        assert_eq!(ordered[0].0, 2);
    }

    #[test]
    fn scan_escapes_regex_metacharacters() {
        let source = "x = 1\nwe.ird = 2\n";
        let entries = vec![Entry::instance("we.ird", xy(), Scale)];
        let ordered = sequence(Some(source), entries).unwrap();
        assert_eq!(ordered[0].0, 2);

        let entries = vec![Entry::instance("we.ird", xy(), Scale)];
        assert!(sequence(Some("weXird = 2\n"), entries).is_err());
    }

    #[test]
    fn scan_matches_whole_names_after_keywords() {
        let source = "struct Scale\nscale_all = Scale(2)\npub fn scale(x, y)\n";
        let entries = vec![
            Entry::instance("scale_all", xy(), Scale),
            Entry::function("scale", xy(), passthrough),
        ];
        let ordered = sequence(Some(source), entries).unwrap();
        let order: Vec<_> = ordered.iter().map(|(l, e)| (*l, e.name.as_str())).collect();
        assert_eq!(order, vec![(2, "scale_all"), (3, "scale")]);
    }

    const INTERLEAVED_SOURCE: &str = "\
use stuff;

fn add_one(x)
times_ten = Scale()
fn minus_two(x)
";

    fn interleaved_namespace() -> Namespace {
        let x = || Signature::positional(["x"]);
        Namespace::builder("interleaved")
            .source(INTERLEAVED_SOURCE)
            .function("add_one", x(), passthrough)
            .unplaced_instance("times_ten", x(), Scale)
            .function("minus_two", x(), passthrough)
            .build()
    }

    #[test]
    fn scanned_instances_interleave_with_registered_functions() {
        let stages = discover(interleaved_namespace(), &DiscoveryOptions::default()).unwrap();
        let order: Vec<_> = stages.iter().map(|s| (s.line(), s.name())).collect();
        assert_eq!(
            order,
            vec![(3, "add_one"), (4, "times_ten"), (5, "minus_two")]
        );
    }

    #[test]
    fn registered_functions_missing_from_source_are_unresolved() {
        let ns = Namespace::builder("ns")
            .source("fn present(x)\n")
            .function("present", xy(), passthrough)
            .function("absent", xy(), passthrough)
            .build();
        match discover(ns, &DiscoveryOptions::default()).unwrap_err() {
            ModpipeError::Unresolved { names } => assert_eq!(names, vec!["absent"]),
            other => panic!("Expected Unresolved, got: {other:?}"),
        }
    }

    #[test]
    fn registration_order_applies_without_source() {
        let ns = Namespace::builder("ns")
            .function("first", xy(), passthrough)
            .entry(Entry::function("pinned", xy(), passthrough).at_line(5))
            .function("last", xy(), passthrough)
            .build();
        let stages = discover(ns, &DiscoveryOptions::default()).unwrap();
        let order: Vec<_> = stages.iter().map(|s| (s.line(), s.name())).collect();
        assert_eq!(order, vec![(1, "first"), (5, "pinned"), (6, "last")]);
    }

    #[test]
    fn discover_orders_and_filters() {
        let stages = discover(math_namespace(), &DiscoveryOptions::default()).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["normed", "rot90", "times_ten"]);
        assert_eq!(stages[2].kind(), StageKind::Instance);
        assert_eq!(stages[2].line(), 7);
    }

    #[test]
    fn discover_can_keep_helpers() {
        let options = DiscoveryOptions {
            elide_helpers: false,
            ..Default::default()
        };
        let stages = discover(math_namespace(), &options).unwrap();
        assert_eq!(stages[0].name(), "_is_zero");
    }

    #[test]
    fn discover_applies_exclusions() {
        let starts_with_rot: Exclusion =
            Arc::new(|name: &str, _: &Binding| name.starts_with("rot"));
        let options = DiscoveryOptions {
            elide_helpers: true,
            exclusions: vec![starts_with_rot],
        };
        let stages = discover(math_namespace(), &options).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["normed", "times_ten"]);
    }

    #[test]
    fn excluded_entries_never_need_resolving() {
        let ns = Namespace::builder("ns")
            .function("keep", xy(), passthrough)
            .unplaced_instance("_hidden", xy(), Scale)
            .build();
        let stages = discover(ns, &DiscoveryOptions::default()).unwrap();
        assert_eq!(stages.len(), 1);
    }

    #[test]
    fn discover_rejects_duplicate_names() {
        let ns = Namespace::builder("ns")
            .function("twice", xy(), passthrough)
            .function("twice", xy(), passthrough)
            .build();
        let err = discover(ns, &DiscoveryOptions::default()).unwrap_err();
        assert!(matches!(err, ModpipeError::DuplicateStage { ref name } if name == "twice"));
    }

    #[test]
    fn discover_empty_namespace_is_empty() {
        let stages = discover(Namespace::new("empty"), &DiscoveryOptions::default()).unwrap();
        assert!(stages.is_empty());
    }
}
