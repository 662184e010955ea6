//! Pattern Registry: named Unicode character-class regexes used by the
//! column operator's regex-keep/extract rules and by the filename builder's
//! validator.
//!
//! The registry is static data; `lookup` and `combine` are pure functions
//! over it. Nothing here depends on a particular workflow or run.

/// A single `(key, regex_source, human_label)` entry.
struct PatternEntry {
    key: &'static str,
    regex: &'static str,
    label: &'static str,
}

/// The full set of named character classes, ported from the upstream
/// column-analyser's pattern table. Order is insertion order and is
/// preserved by `combine`.
const PATTERNS: &[PatternEntry] = &[
    PatternEntry { key: "kazakh_cyrillic", regex: r"[\u{4D8}\u{4D9}\u{406}\u{456}\u{4B0}\u{4B1}]", label: "Kazakh Cyrillic (Әә, Іі, Ұұ)" },
    PatternEntry { key: "uzbek_cyrillic", regex: r"[\u{40E}\u{45E}\u{4B2}\u{4B3}]", label: "Uzbek Cyrillic (Ўў, Ҳҳ)" },
    PatternEntry { key: "cyrillic_common", regex: r"[\u{410}-\u{44F}\u{401}\u{451}]", label: "Cyrillic (А-Я, а-я, Ёё)" },
    PatternEntry { key: "cyrillic_extended", regex: r"[\u{4E8}\u{4E9}\u{4AF}\u{4B1}\u{4A2}\u{4A3}\u{49A}\u{49B}\u{492}\u{493}]", label: "Cyrillic (Өө, Үү, Ңң, Ққ, Ғғ)" },
    PatternEntry { key: "latyn_kazakh", regex: r"[\u{E4}\u{C4}\u{11F}\u{11E}\u{131}\u{130}\u{F1}\u{D1}\u{15F}\u{15E}]", label: "Kazakh Latin (äÄ, ğĞ, ıİ, ñÑ, şŞ)" },
    PatternEntry { key: "latyn_uzbek", regex: r"[\u{2BB}\u{2BC}]", label: "Uzbek Latin (ʼ)" },
    PatternEntry { key: "latin_basic", regex: r"[A-Za-z]", label: "Latin (A-Z, a-z)" },
    PatternEntry { key: "latin_extended", regex: r"[\u{F6}\u{D6}\u{FC}\u{DC}]", label: "Latin (öÖ, üÜ)" },
    PatternEntry { key: "digits", regex: r"[0-9]", label: "Digits (0-9)" },
    PatternEntry { key: "space", regex: r"\u{0020}", label: "Space" },
    PatternEntry { key: "newline", regex: r"\u{000A}", label: "Newline" },
    PatternEntry { key: "literal_escaped_space", regex: r"\\u0020", label: "Escaped space (\\u0020)" },
    PatternEntry { key: "literal_escaped_newline", regex: r"\\u000A", label: "Escaped newline (\\u000A)" },
    PatternEntry { key: "colon", regex: r":", label: ":" },
    PatternEntry { key: "semicolon", regex: r";", label: ";" },
    PatternEntry { key: "hyphen", regex: r"-", label: "-" },
    PatternEntry { key: "underscore", regex: r"_", label: "_" },
    PatternEntry { key: "period", regex: r"\.", label: "." },
    PatternEntry { key: "comma", regex: r",", label: "," },
    PatternEntry { key: "backslash", regex: r"\\", label: "\\" },
    PatternEntry { key: "forward_slash", regex: r"/", label: "/" },
    PatternEntry { key: "vertical_bar", regex: r"\|", label: "|" },
    PatternEntry { key: "double_quote", regex: "\"", label: "\"" },
    PatternEntry { key: "single_quote", regex: "'", label: "'" },
    PatternEntry { key: "dollar", regex: r"\$", label: "$" },
    PatternEntry { key: "at", regex: r"@", label: "@" },
    PatternEntry { key: "hash", regex: r"#", label: "#" },
    PatternEntry { key: "asterisk", regex: r"\*", label: "*" },
];

/// Looks up the regex source for a pattern key.
pub fn lookup(key: &str) -> Option<&'static str> {
    PATTERNS.iter().find(|p| p.key == key).map(|p| p.regex)
}

/// Looks up the human-readable label for a pattern key.
pub fn label(key: &str) -> Option<&'static str> {
    PATTERNS.iter().find(|p| p.key == key).map(|p| p.label)
}

/// Builds the alternation `p1|p2|...|pn` for the given keys, preserving
/// input order. Unknown keys are silently skipped. Returns `None` when no
/// key resolves to a pattern.
pub fn combine(keys: &[String]) -> Option<String> {
    let parts: Vec<&str> = keys.iter().filter_map(|k| lookup(k)).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_key() {
        assert_eq!(lookup("digits"), Some("[0-9]"));
    }

    #[test]
    fn lookup_unknown_key() {
        assert_eq!(lookup("not_a_key"), None);
    }

    #[test]
    fn combine_preserves_order() {
        let combined = combine(&["digits".to_string(), "hyphen".to_string()]).unwrap();
        assert_eq!(combined, "[0-9]|-");
    }

    #[test]
    fn combine_skips_unknown_and_empty_on_all_unknown() {
        assert!(combine(&["bogus".to_string()]).is_none());
        let combined = combine(&["bogus".to_string(), "digits".to_string()]).unwrap();
        assert_eq!(combined, "[0-9]");
    }

    #[test]
    fn combine_empty_input() {
        assert!(combine(&[]).is_none());
    }
}
