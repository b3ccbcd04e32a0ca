//! URL slug generation.
//!
//! Every property's slug is derived from its title by [`slugify`]. The
//! transform is deterministic so re-running an export produces the same
//! URLs for the same titles:
//!
//! - `"3BR Villa in Seminyak"` → `"3br-villa-in-seminyak"`
//! - `"Modern & Spacious"` → `"modern-and-spacious"`
//! - `"3 BR Townhouse"` → `"3br-townhouse"`
//!
//! ## Steps
//!
//! 1. Lowercase, `&` → ` and `
//! 2. Whitespace runs → `-`
//! 3. Strip anything that is not a word character or `-`
//! 4. Collapse repeated `-`, trim leading/trailing `-`
//! 5. Re-join a leading room count split from its unit (`3-br` → `3br`)

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w-]+").unwrap());
static HYPHEN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());
static LEADING_ROOM_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(br|bd|bed|beds|ba|bath)(-|$)").unwrap());

/// Derive a URL slug from a title.
///
/// May return an empty string for titles with no word characters; use
/// [`slug_or_fallback`] where a slug is mandatory.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase().replace('&', " and ");
    let hyphenated = WHITESPACE.replace_all(lower.trim(), "-");
    let stripped = NON_WORD.replace_all(&hyphenated, "");
    let collapsed = HYPHEN_RUN.replace_all(&stripped, "-");
    let trimmed = collapsed.trim_matches('-');
    LEADING_ROOM_COUNT
        .replace(trimmed, "${1}${2}${3}")
        .into_owned()
}

/// Slug for a record, falling back to `property-<id>` when the title has
/// nothing sluggable in it.
pub fn slug_or_fallback(title: &str, id: u64) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("property-{id}")
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_room_count_stays_joined() {
        assert_eq!(slugify("3BR Villa in Seminyak"), "3br-villa-in-seminyak");
    }

    #[test]
    fn ampersand_becomes_and() {
        assert_eq!(slugify("Modern & Spacious"), "modern-and-spacious");
    }

    #[test]
    fn spaced_room_count_is_rejoined() {
        assert_eq!(slugify("3 BR Townhouse"), "3br-townhouse");
        assert_eq!(slugify("2 Bed Apartment"), "2bed-apartment");
    }

    #[test]
    fn room_count_fixup_only_applies_to_units() {
        assert_eq!(slugify("2 in 1 Loft"), "2-in-1-loft");
        assert_eq!(slugify("10 Bali Retreats"), "10-bali-retreats");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(
            slugify("Ocean-View Villa, Canggu (New!)"),
            "ocean-view-villa-canggu-new"
        );
    }

    #[test]
    fn repeated_hyphens_collapse() {
        assert_eq!(slugify("Villa -- Uluwatu"), "villa-uluwatu");
        assert_eq!(slugify("  - Villa -  "), "villa");
    }

    #[test]
    fn non_ascii_word_characters_survive() {
        assert_eq!(slugify("Casa Señorial"), "casa-señorial");
    }

    #[test]
    fn empty_and_symbol_only_titles() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn fallback_uses_id() {
        assert_eq!(slug_or_fallback("???", 7), "property-7");
        assert_eq!(slug_or_fallback("Villa", 7), "villa");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify("3BR Villa in Seminyak & Spa");
        assert_eq!(slugify(&once), once);
    }
}
