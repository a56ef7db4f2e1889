//! Naming conventions for tables, association names and foreign keys.

use heck::{ToLowerCamelCase, ToSnakeCase};

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("woman", "women"),
    ("man", "men"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
];

const UNCOUNTABLE: &[&str] = &["data", "equipment", "fish", "information", "news", "series", "sheep", "species"];

/// Plural form of a model name, keeping its case (`Person` -> `People`,
/// `Company` -> `Companies`, `Phone` -> `Phones`).
pub(crate) fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if UNCOUNTABLE.iter().any(|u| lower.ends_with(u) && at_word_start(word, word.len() - u.len())) {
        return word.to_string();
    }

    for (singular, plural) in IRREGULAR {
        if lower.ends_with(singular) {
            let start = word.len() - singular.len();
            if !at_word_start(word, start) {
                continue;
            }
            let original = &word[start..];
            let mut replaced = String::with_capacity(start + plural.len());
            replaced.push_str(&word[..start]);
            if original.starts_with(|c: char| c.is_ascii_uppercase()) {
                replaced.push_str(&plural[..1].to_ascii_uppercase());
                replaced.push_str(&plural[1..]);
            } else {
                replaced.push_str(plural);
            }
            return replaced;
        }
    }

    if lower.ends_with('y')
        && word.len() > 1
        && !matches!(
            lower.chars().nth(word.len() - 2),
            Some('a' | 'e' | 'i' | 'o' | 'u')
        )
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

// A suffix only counts when it begins a camel-case segment (`SalesPerson`, not `Human`).
fn at_word_start(word: &str, index: usize) -> bool {
    index == 0
        || word[index..].starts_with(|c: char| c.is_ascii_uppercase())
        || word[..index].ends_with('_')
}

/// Property name for an association or key (`Person` -> `person`).
pub(crate) fn property_name(name: &str) -> String {
    name.to_lower_camel_case()
}

/// Database column name for a property (`lastUpdated` -> `last_updated`).
pub(crate) fn column_name(property: &str) -> String {
    property.to_snake_case()
}

/// Foreign-key column pointing at `model` (`Person` -> `person_id`).
pub(crate) fn foreign_key_column(name: &str) -> String {
    format!("{}_id", name.to_snake_case())
}
