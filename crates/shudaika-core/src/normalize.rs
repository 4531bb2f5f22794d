//! Title normalization for search-result matching.
//!
//! Levels applied in order:
//! 1. Unicode NFKC + lowercase
//! 2. Special-character erasure (anything not a letter, digit or whitespace)
//! 3. Whitespace collapse

use unicode_normalization::UnicodeNormalization;

/// Normalize a title for comparison.
///
/// Special characters are replaced by a space rather than dropped, so that
/// "Black★Rock Shooter" and "Black Rock Shooter" normalize to the same string.
pub fn normalize(s: &str) -> String {
    let s = unicode_normalize(s);
    let s = erase_special_chars(&s);
    collapse_whitespace(&s)
}

// ── Level 1: Unicode NFKC + lowercase ─────────────────────────────────

/// Apply NFKC normalization (fullwidth → ASCII, compose diacritics) and lowercase.
fn unicode_normalize(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

// ── Level 2: Special-character erasure ────────────────────────────────

fn erase_special_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

// ── Level 3: Whitespace collapse ──────────────────────────────────────

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_characters_become_spaces() {
        assert_eq!(normalize("Black★Rock Shooter"), "black rock shooter");
        assert_eq!(normalize("Re:Zero"), "re zero");
        assert_eq!(normalize("Steins;Gate"), "steins gate");
    }

    #[test]
    fn test_whitespace_collapses_and_trims() {
        assert_eq!(normalize("  Sousou   no\tFrieren  "), "sousou no frieren");
        assert_eq!(normalize("K-On!!"), "k on");
    }

    #[test]
    fn test_unicode_letters_survive() {
        assert_eq!(normalize("葬送のフリーレン"), "葬送のフリーレン");
        assert_eq!(normalize("Pokémon"), "pokémon");
    }

    #[test]
    fn test_fullwidth_folds_to_ascii() {
        assert_eq!(normalize("ＢＬＡＣＫ ＲＯＣＫ"), "black rock");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("★☆!!"), "");
    }
}
