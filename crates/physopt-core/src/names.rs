//! # Unique Field Names
//!
//! A row type must not carry two fields whose names differ only by case. Rewrites that
//! rename or re-derive fields (projections adopting their input's names, joins
//! concatenating both inputs) funnel their candidate names through
//! [`make_unique_names`].
//!
//! Disambiguation appends an integer suffix. The suffix has to avoid the names that are
//! already assigned *and* every original candidate: for `[c1, c1, c10]` the second
//! `c1` may not become `c10`, because the third field is still going to claim it.

use std::collections::HashSet;

/// Return `names` with case-insensitive duplicates disambiguated.
///
/// Names are processed left to right. A name that collides with an already assigned
/// name becomes `name0`, `name1`, ... using the first suffix that collides neither
/// with an original candidate nor with an assigned name. All other names are returned
/// unchanged, so the function is idempotent.
pub fn make_unique_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let originals: HashSet<String> = names.iter().map(|n| fold(n.as_ref())).collect();
    let mut assigned: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let mut chosen = name.to_string();
        if assigned.contains(&fold(name)) {
            // Terminates: the two blocking sets are finite and every suffix yields a
            // distinct candidate.
            let mut suffix = 0usize;
            loop {
                let candidate = format!("{}{}", name, suffix);
                let key = fold(&candidate);
                if !originals.contains(&key) && !assigned.contains(&key) {
                    chosen = candidate;
                    break;
                }
                suffix += 1;
            }
        }
        assigned.insert(fold(&chosen));
        unique.push(chosen);
    }

    unique
}

/// Whether `names` is free of case-insensitive duplicates.
pub fn are_unique<S: AsRef<str>>(names: &[S]) -> bool {
    let mut seen = HashSet::with_capacity(names.len());
    names.iter().all(|n| seen.insert(fold(n.as_ref())))
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}
