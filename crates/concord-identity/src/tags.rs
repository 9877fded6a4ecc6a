use regex::Regex;
use std::sync::OnceLock;

/// Matches the `Beads Issue: <ID>` back-reference tag (§4.3 fallback #2).
/// Mirrors `concord_trackers::vibe::extract_huly_tag` but for the reverse
/// direction — a Huly or Beads description pointing at a Beads identifier.
fn beads_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Beads Issue:\s*(\S+)").expect("valid regex"))
}

pub fn extract_beads_tag(description: &str) -> Option<String> {
    beads_tag_pattern()
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
}

pub fn with_beads_tag(description: &str, beads_identifier: &str) -> String {
    if extract_beads_tag(description).is_some() {
        beads_tag_pattern()
            .replace(description, format!("Beads Issue: {beads_identifier}"))
            .into_owned()
    } else if description.is_empty() {
        format!("Beads Issue: {beads_identifier}")
    } else {
        format!("{description}\n\nBeads Issue: {beads_identifier}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_beads_tag() {
        assert_eq!(extract_beads_tag("notes\n\nBeads Issue: bd-17"), Some("bd-17".to_string()));
    }

    #[test]
    fn no_tag_returns_none() {
        assert_eq!(extract_beads_tag("plain description"), None);
    }

    #[test]
    fn with_beads_tag_replaces_existing() {
        let updated = with_beads_tag("x\n\nBeads Issue: bd-1", "bd-2");
        assert_eq!(extract_beads_tag(&updated), Some("bd-2".to_string()));
    }

    #[test]
    fn with_beads_tag_appends_to_nonempty() {
        assert_eq!(with_beads_tag("Fix the bug", "bd-9"), "Fix the bug\n\nBeads Issue: bd-9");
    }
}
