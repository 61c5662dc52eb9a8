//! Scene affinity: which raw scene ids name the same map.
//!
//! Scene ids come from the game's loader and vary in casing, separators and
//! decorative suffixes ("Level_02_Night", "level-02", "Base_Main_copy").
//! [`canonical`] reduces them to a stable key and [`same_map`] compares keys.

/// Suffixes stripped (repeatedly) from the end of a canonical id.
const STRIPPED_SUFFIXES: &[&str] = &["_main", "_scene", "_day", "_night", "_copy", "_clone"];

/// Canonical form of a scene id. Idempotent.
pub fn canonical(raw: &str) -> String {
    // After the first pass the id is lower-case and every rule only shortens
    // it, so this reaches a fixpoint.
    let mut id = canonical_pass(raw);
    loop {
        let next = canonical_pass(&id);
        if next == id {
            return id;
        }
        id = next;
    }
}

fn canonical_pass(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    let mut last_sep = true;
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            '-' | ' ' | '_' => '_',
            c => c,
        };
        if ch == '_' {
            if last_sep {
                continue;
            }
            last_sep = true;
        } else {
            last_sep = false;
        }
        id.push(ch);
    }
    while id.ends_with('_') {
        id.pop();
    }

    loop {
        let stripped = STRIPPED_SUFFIXES.iter().find_map(|suffix| {
            id.strip_suffix(suffix)
                .filter(|rest| !rest.is_empty())
                .map(str::len)
        });
        match stripped {
            Some(len) => id.truncate(len),
            None => break,
        }
    }

    if id.starts_with("base") {
        return "base".to_string();
    }

    if id.starts_with("level_") {
        let mut parts = id.splitn(3, '_');
        if let (Some(level), Some(number)) = (parts.next(), parts.next()) {
            return format!("{level}_{number}");
        }
    }

    id
}

/// Whether two raw scene ids name the same map. Empty matches only empty.
pub fn same_map(a: &str, b: &str) -> bool {
    let (a, b) = (canonical(a), canonical(b));
    if a.is_empty() || b.is_empty() {
        return a.is_empty() && b.is_empty();
    }
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "   ",
        "Level_02_Night",
        "level-02",
        "LEVEL 02 main scene",
        "Level_02_Copy_Clone",
        "Base_Main",
        "BaseCamp",
        "base",
        "_main",
        "Forest__Edge--Day",
        "level_",
        "level_7_b_c",
        "Scene",
        "night_main",
        "level_main_x",
        "level_night",
    ];

    #[test]
    fn test_canonical_rules() {
        assert_eq!(canonical("Level_02_Night"), "level_02");
        assert_eq!(canonical("level-02"), "level_02");
        assert_eq!(canonical("LEVEL 02 main scene"), "level_02");
        assert_eq!(canonical("level_7_b_c"), "level_7");
        assert_eq!(canonical("BaseCamp"), "base");
        assert_eq!(canonical("Base_Main"), "base");
        assert_eq!(canonical("Forest__Edge--Day"), "forest_edge");
        assert_eq!(canonical("--Swamp--"), "swamp");
        assert_eq!(canonical("ÜBER_MAP"), "über_map");
    }

    #[test]
    fn test_suffix_only_id_is_kept() {
        // Stripping never empties the id.
        assert_eq!(canonical("_main"), "main");
        assert_eq!(canonical("night_main"), "night");
    }

    #[test]
    fn test_canonical_is_idempotent() {
        for raw in SAMPLES {
            let once = canonical(raw);
            assert_eq!(canonical(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_same_map_is_symmetric() {
        for a in SAMPLES {
            for b in SAMPLES {
                assert_eq!(same_map(a, b), same_map(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_same_map_examples() {
        assert!(same_map("Level_02_Night", "level-02"));
        assert!(same_map("Base_Main", "basecamp"));
        assert!(!same_map("level_02", "level_03"));
        assert!(same_map("", "  "));
        assert!(!same_map("", "base"));
        assert!(same_map("ÜBER_MAP_Night", "über-map"));
        assert!(same_map("ΣΚΗΝΗ", "σκηνη"));
    }
}
