//! Output file naming

use std::collections::HashSet;
use std::path::Path;

/// Base name of `filename` with its last extension removed
pub fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Return `stem.ext`, or `stem_N.ext` with the smallest N >= 2 not yet in
/// `taken`. The returned name is added to `taken`.
pub fn claim_unique(taken: &mut HashSet<String>, stem: &str, ext: &str) -> String {
    let join = |stem: &str| {
        if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{}.{}", stem, ext)
        }
    };

    let mut candidate = join(stem);
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = join(&format!("{}_{}", stem, n));
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Output names for a batch, in input order.
///
/// Inputs whose stems collide (`mix.wav`, `mix.flac`) get distinct names
/// (`mix.mp3`, `mix_2.mp3`) so no conversion overwrites another.
pub fn output_names<'a>(originals: impl IntoIterator<Item = &'a str>, ext: &str) -> Vec<String> {
    let mut taken = HashSet::new();
    originals
        .into_iter()
        .map(|name| claim_unique(&mut taken, file_stem(name), ext))
        .collect()
}

/// Split a filename into (stem, extension) for disambiguation
pub fn split_name(filename: &str) -> (&str, &str) {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    (file_stem(filename), ext)
}
