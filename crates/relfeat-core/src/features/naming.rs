//! Canonical feature names.
//!
//! A template such as `XX_lemma_N_gram` becomes `OW_lemma_2_gram_1` for the
//! bigrams of the first outer window: `XX` takes the family code, `_N_` the
//! n-gram size, and windows tied to one entity get its number appended.

use crate::features::window::WindowKind;

pub const FAMILY_PLACEHOLDER: &str = "XX";
pub const NGRAM_PLACEHOLDER: &str = "_N_";

/// Name of the features of `window` at size `n_gram`.
///
/// Templates are written per family (`XX` takes `OW`, not `OW1`), but the two
/// windows of a family share a template, so the entity number is appended
/// after substitution to keep OW1 and OW2 values under distinct names.
pub fn feature_name(template: &str, window: WindowKind, n_gram: usize) -> String {
    let with_family = template.replace(FAMILY_PLACEHOLDER, window.family().code());
    let mut name = if with_family.contains(NGRAM_PLACEHOLDER) {
        with_family.replacen(NGRAM_PLACEHOLDER, &format!("_{n_gram}_"), 1)
    } else {
        format!("{with_family}_{n_gram}")
    };
    if let Some(instance) = window.instance() {
        name.push('_');
        name.push_str(&instance.to_string());
    }
    name
}

/// `[a b c]`: the value part of an n-gram feature.
pub fn bracketed<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::from("[");
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            joined.push(' ');
        }
        joined.push_str(item);
    }
    joined.push(']');
    joined
}

/// Name of one n-gram group feature.
pub fn group_feature_name(base: &str, group: &str) -> String {
    format!("{base}_{group}")
}
