//! Text preparation for speech synthesis.
//!
//! Chat replies arrive as markdown; engines read markup characters aloud, so
//! everything that is formatting rather than prose is removed before a
//! request reaches a backend. The cleaned string is also the cache key text.

/// Longest text accepted for one synthesis request, in characters.
pub const MAX_SPEECH_CHARS: usize = 5000;

/// Strip markdown and collapse whitespace.
pub fn clean_text_for_speech(text: &str) -> String {
    let mut lines = Vec::new();

    for line in text.lines() {
        let line = line.trim_start();
        if is_horizontal_rule(line) {
            continue;
        }
        let line = strip_heading(strip_blockquote(line));
        lines.push(strip_inline_markup(line));
    }

    let collapsed = lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    collapsed.chars().take(MAX_SPEECH_CHARS).collect()
}

fn is_horizontal_rule(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| line.chars().all(|c| c == *marker))
}

fn strip_blockquote(mut line: &str) -> &str {
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.strip_prefix(' ').unwrap_or(rest);
    }
    line
}

fn strip_heading(line: &str) -> &str {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if rest.starts_with(char::is_whitespace) {
            return rest.trim_start();
        }
    }
    line
}

/// Split `[label](target)` at the start of `s`, returning the label and the
/// number of bytes consumed.
fn parse_link(s: &str) -> Option<(&str, usize)> {
    let body = s.strip_prefix('[')?;
    let close = body.find(']')?;
    let label = &body[..close];
    let after = body[close + 1..].strip_prefix('(')?;
    let end = after.find(')')?;
    // '[' + label + ']' + '(' + target + ')'
    let consumed = 1 + close + 1 + 1 + end + 1;
    Some((label, consumed))
}

fn strip_inline_markup(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(c) = rest.chars().next() {
        if c == '!' {
            if let Some((_, consumed)) = parse_link(&rest[1..]) {
                rest = &rest[1 + consumed..];
                continue;
            }
        }
        if c == '[' {
            if let Some((label, consumed)) = parse_link(rest) {
                out.push_str(label);
                rest = &rest[consumed..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out.replace("~~", "")
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_emphasis_and_headings() {
        let text = "## Your plan\n\nThis is **really** _important_ and `code`.";
        assert_eq!(
            clean_text_for_speech(text),
            "Your plan This is really important and code."
        );
    }

    #[test]
    fn test_links_keep_label_and_images_vanish() {
        let text = "See [the guide](https://example.com/guide) ![diagram](img.png) now.";
        assert_eq!(clean_text_for_speech(text), "See the guide now.");
    }

    #[test]
    fn test_blockquotes_and_rules() {
        let text = "> Breathe in.\n> > Breathe out.\n---\nDone ~~not~~.";
        assert_eq!(clean_text_for_speech(text), "Breathe in. Breathe out. Done not.");
    }

    #[test]
    fn test_hash_without_space_is_kept() {
        assert_eq!(clean_text_for_speech("#1 priority"), "#1 priority");
    }

    #[test]
    fn test_empty_after_cleaning() {
        assert_eq!(clean_text_for_speech("***\n\n   "), "");
    }

    #[test]
    fn test_long_text_is_capped() {
        let text = "a".repeat(MAX_SPEECH_CHARS + 10);
        assert_eq!(clean_text_for_speech(&text).chars().count(), MAX_SPEECH_CHARS);
    }

    #[test]
    fn test_unbalanced_brackets_pass_through() {
        assert_eq!(clean_text_for_speech("array[0] is (maybe) set"), "array[0] is (maybe) set");
    }
}
