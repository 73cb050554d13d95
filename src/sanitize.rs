//! Reply sanitizer
//!
//! The boundary adapter between free-form model text and the engine.
//! Control tags (`[HAPPY]`), stage directions (`(laughs)`) and emphasis
//! asides (`*spits*`) are stripped here; raw tagged text never travels
//! further than this module.

use std::sync::LazyLock;

use regex::Regex;

use crate::emotion::Emotion;

/// Shown instead of a reply that was nothing but markup.
pub const PLACEHOLDER: &str = "...";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid tag regex"));
static ASIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid aside regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*]*\*").expect("valid emphasis regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static TAG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*([A-Za-z_]+)\s*\]").expect("valid tag name regex"));

/// Keyword groups in priority order.
static KEYWORDS: LazyLock<Vec<(Emotion, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Emotion::Happy,
            Regex::new(r"(?i)\b(happy|joy)\b").expect("valid happy regex"),
        ),
        (
            Emotion::Angry,
            Regex::new(r"(?i)\b(angry|anger)\b").expect("valid angry regex"),
        ),
        (
            Emotion::Thinking,
            Regex::new(r"(?i)\bthinking\b").expect("valid thinking regex"),
        ),
    ]
});

/// Result of sanitizing one reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub emotion: Emotion,
    pub clean_text: String,
}

/// Strip markup from a raw reply and detect the guardian's emotion.
pub fn sanitize(raw: &str) -> Sanitized {
    sanitize_with_hint(raw, None)
}

/// Like [`sanitize`], but a structured emotion supplied by the service
/// takes precedence over anything parsed from the text.
pub fn sanitize_with_hint(raw: &str, hint: Option<Emotion>) -> Sanitized {
    let clean_text = strip(raw);
    let emotion = hint
        .or_else(|| emotion_from_tags(raw))
        .unwrap_or_else(|| emotion_from_keywords(&clean_text));

    Sanitized {
        emotion,
        clean_text,
    }
}

/// True if `raw` carries the bracketed control tag `name` (case-insensitive).
pub fn contains_control_tag(raw: &str, name: &str) -> bool {
    TAG_NAME_RE
        .captures_iter(raw)
        .any(|cap| cap[1].eq_ignore_ascii_case(name))
}

fn strip(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, " ");
    let text = ASIDE_RE.replace_all(&text, " ");
    let text = EMPHASIS_RE.replace_all(&text, " ");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = text.trim();

    if text.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        text.to_string()
    }
}

/// Highest-priority emotion named by a control tag, if any tag names one.
fn emotion_from_tags(raw: &str) -> Option<Emotion> {
    let mut found: Option<Emotion> = None;
    for cap in TAG_NAME_RE.captures_iter(raw) {
        let tagged = match cap[1].to_ascii_uppercase().as_str() {
            "HAPPY" | "JOY" => Emotion::Happy,
            "ANGRY" | "ANGER" => Emotion::Angry,
            "THINKING" => Emotion::Thinking,
            "NEUTRAL" | "IDLE" => Emotion::Idle,
            _ => continue,
        };
        found = Some(match found {
            Some(current) if priority(current) <= priority(tagged) => current,
            _ => tagged,
        });
    }
    found
}

fn emotion_from_keywords(clean: &str) -> Emotion {
    KEYWORDS
        .iter()
        .find(|(_, re)| re.is_match(clean))
        .map(|(emotion, _)| *emotion)
        .unwrap_or_default()
}

fn priority(emotion: Emotion) -> u8 {
    match emotion {
        Emotion::Happy => 0,
        Emotion::Angry => 1,
        Emotion::Thinking => 2,
        Emotion::Idle => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_detects_emotion() {
        let out = sanitize("[HAPPY] Arr, ye flatter me, matey!");
        assert_eq!(out.emotion, Emotion::Happy);
        assert_eq!(out.clean_text, "Arr, ye flatter me, matey!");
    }

    #[test]
    fn test_case_insensitive_tags() {
        assert_eq!(sanitize("[angry] Begone!").emotion, Emotion::Angry);
        assert_eq!(sanitize("[Joy] Heh.").emotion, Emotion::Happy);
    }

    #[test]
    fn test_strips_asides_and_emphasis() {
        let out = sanitize("(laughs) Ye think *spits* I'd fall for that? [ANGRY]");
        assert_eq!(out.clean_text, "Ye think I'd fall for that?");
        assert_eq!(out.emotion, Emotion::Angry);
    }

    #[test]
    fn test_tag_beats_keyword() {
        let out = sanitize("[ANGRY] Ye think I'm happy about this?");
        assert_eq!(out.emotion, Emotion::Angry);
    }

    #[test]
    fn test_tag_priority() {
        assert_eq!(sanitize("[ANGRY][HAPPY] hm").emotion, Emotion::Happy);
        assert_eq!(sanitize("[NEUTRAL][THINKING] hm").emotion, Emotion::Thinking);
        assert_eq!(sanitize("[NEUTRAL] I am so happy").emotion, Emotion::Idle);
    }

    #[test]
    fn test_keyword_fallback_uses_word_boundaries() {
        assert_eq!(sanitize("What a joy to see ye").emotion, Emotion::Happy);
        assert_eq!(sanitize("Don't make me angry").emotion, Emotion::Angry);
        assert_eq!(sanitize("I be thinking on it").emotion, Emotion::Thinking);
        // "danger" and "enjoy" are not emotion keywords
        assert_eq!(sanitize("Danger lurks, enjoy the sea").emotion, Emotion::Idle);
    }

    #[test]
    fn test_default_idle() {
        assert_eq!(sanitize("The tide turns.").emotion, Emotion::Idle);
    }

    #[test]
    fn test_markup_only_yields_placeholder() {
        for raw in ["[HAPPY]", "(laughs)", "*grumbles*", "  [GIVE_MAP] (sighs)  ", ""] {
            assert_eq!(sanitize(raw).clean_text, PLACEHOLDER, "input {:?}", raw);
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "[HAPPY] Arr (grins) *winks* fine",
            "(a[b]c) tail",
            "[a(b]c) tail",
            "*a(b*c) tail",
            "unclosed [bracket and (paren",
            "   lots   of\n\nspace ",
            "[ANGRY]",
            "plain text",
        ];
        for raw in inputs {
            let once = sanitize(raw).clean_text;
            let twice = sanitize(&once).clean_text;
            assert_eq!(once, twice, "input {:?}", raw);
        }
    }

    #[test]
    fn test_hint_wins() {
        let out = sanitize_with_hint("[HAPPY] Fine.", Some(Emotion::Angry));
        assert_eq!(out.emotion, Emotion::Angry);
        assert_eq!(out.clean_text, "Fine.");
    }

    #[test]
    fn test_contains_control_tag() {
        assert!(contains_control_tag("Take it! [give_map]", "GIVE_MAP"));
        assert!(contains_control_tag("[ GIVE_MAP ]", "give_map"));
        assert!(!contains_control_tag("give map", "GIVE_MAP"));
    }
}
