//! Text cleaning for provider-supplied strings
//!
//! Provider text carries cross-reference markup (`[a=Artist]`, `[l123]`,
//! `[url=…]…[/url]`, `[b]`), stray control characters and uneven
//! whitespace. [`clean_text`] turns it into plain display text and is
//! idempotent: `clean_text(clean_text(x, n), n) == clean_text(x, n)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of titles and names, in characters
pub const TITLE_MAX_CHARS: usize = 300;

/// Maximum length of descriptions, in characters
pub const DESCRIPTION_MAX_CHARS: usize = 2000;

static URL_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\[url=[^\]]*\](.*?)\[/url\]").expect("URL_MARKUP is a valid regex pattern")
});

static NAMED_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[[al]=([^\]]+)\]").expect("NAMED_REFERENCE is a valid regex pattern")
});

static NUMERIC_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[[alrm]=?\d+\]").expect("NUMERIC_REFERENCE is a valid regex pattern")
});

static FORMATTING_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[/?[biu]\]").expect("FORMATTING_TAG is a valid regex pattern")
});

static DISAMBIGUATION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\s*\(\d+\))+$").expect("DISAMBIGUATION_SUFFIX is a valid regex pattern")
});

fn is_disallowed(c: char) -> bool {
    (c.is_control() && !c.is_whitespace())
        || matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '<' | '>')
}

/// Resolve markup until none is left
///
/// Every replacement shortens the string, so the loop terminates.
fn resolve_markup(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = {
            let text = URL_MARKUP.replace_all(&current, "$1");
            let text = NAMED_REFERENCE.replace_all(&text, "$1");
            let text = NUMERIC_REFERENCE.replace_all(&text, "");
            FORMATTING_TAG.replace_all(&text, "").into_owned()
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Clean one provider string and cap it at `max_chars` characters
pub fn clean_text(input: &str, max_chars: usize) -> String {
    let stripped: String = input.chars().filter(|c| !is_disallowed(*c)).collect();
    let resolved = resolve_markup(&stripped);
    let collapsed = resolved.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Clean an artist name and drop the provider's "(2)" disambiguation suffix
pub fn clean_artist_name(name: &str) -> String {
    let cleaned = clean_text(name, TITLE_MAX_CHARS);
    DISAMBIGUATION_SUFFIX
        .replace(&cleaned, "")
        .trim_end()
        .to_string()
}

/// `m:ss` for a duration in seconds
pub fn format_duration(total_secs: u32) -> String {
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
