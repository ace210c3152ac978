use {once_cell::sync::Lazy, regex::Regex};

/// Symbolic emoji plus the joiners/selectors that glue them together.
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Emoji_Presentation}\p{Extended_Pictographic}\u{FE0F}\u{200D}]").unwrap()
});

/// Strip presentation-only glyphs from a message body.
///
/// Whitespace runs left behind by removed glyphs are collapsed to single
/// spaces so coalesced fragments always join cleanly.
pub fn clean_text(body: &str) -> String {
    let stripped = EMOJI.replace_all(body, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
