//! Filename conventions for the flower corpus.
//!
//! Corpus files follow a `{category}_{number}.{ext}` convention, e.g.
//! `Bellis_perennis_1042.jpg`. Category names may themselves contain
//! underscores; only the trailing `_{number}` part is positional.

/// Returns the first configured category whose `{category}_{number}.{ext}`
/// pattern matches `filename`, if any. Order matters: the first match wins.
pub fn category_for<'a>(filename: &str, categories: &'a [String]) -> Option<&'a str> {
    categories
        .iter()
        .find(|category| matches_category(filename, category))
        .map(String::as_str)
}

/// Whether `filename` is `{category}_{digits}.{anything}` for this category.
pub fn matches_category(filename: &str, category: &str) -> bool {
    let Some(rest) = filename
        .strip_prefix(category)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };
    match rest.find('.') {
        Some(dot) if dot > 0 => rest[..dot].bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}

/// Recovers the flower name from a corpus filename: everything before the
/// trailing `_{number}` part, extension stripped. Filenames without an
/// underscore are returned whole, as the best available guess.
pub fn flower_name(filename: &str) -> &str {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    match stem.rsplit_once('_') {
        Some((head, _)) => head,
        None => stem,
    }
}
