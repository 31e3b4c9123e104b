//! Shared field-extraction helpers for panel line grammars
//!
//! Panels in this family print fields either pipe-delimited
//! (`ID|TIME DATE DETAILS`) or column-aligned with runs of whitespace
//! (`ID    TIME DATE DETAILS`). The helpers here split those shapes and
//! recognize the trailing clock/date token pair that terminates a message.

/// Split a line at the first run of two or more whitespace characters.
///
/// Returns the trimmed text on each side. Single spaces inside the left
/// part are preserved, which is what lets multi-word event identifiers
/// like `ACTIVA SLENC.REMOTO SILENCIO PANEL` survive the split.
pub fn split_wide_gap(line: &str) -> Option<(&str, &str)> {
    let mut chars = line.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !c.is_whitespace() {
            continue;
        }
        let run_has_second = matches!(chars.peek(), Some((_, next)) if next.is_whitespace());
        if !run_has_second {
            continue;
        }
        let left = line[..idx].trim();
        let right = line[idx..].trim_start();
        if !left.is_empty() && !right.is_empty() {
            return Some((left, right));
        }
    }
    None
}

/// Split a metadata field into the panel timestamp (first two tokens,
/// joined with a single space) and the remaining detail tokens.
pub fn split_timestamp(metadata: &str) -> Option<(String, Vec<&str>)> {
    let mut tokens = metadata.split_whitespace();
    let time = tokens.next()?;
    let date = tokens.next()?;
    Some((format!("{time} {date}"), tokens.collect()))
}

/// True if a token ends with a panel clock field: `H:MM` or `HH:MM`
/// followed by `A` or `P`.
pub fn is_clock_token(token: &str) -> bool {
    let b = token.as_bytes();
    let n = b.len();
    if n < 5 {
        return false;
    }
    (b[n - 1] == b'A' || b[n - 1] == b'P')
        && b[n - 2].is_ascii_digit()
        && b[n - 3].is_ascii_digit()
        && b[n - 4] == b':'
        && b[n - 5].is_ascii_digit()
}

/// True if a token is a six-digit panel date field (`DDMMYY`).
pub fn is_date_token(token: &str) -> bool {
    token.len() == 6 && token.bytes().all(|b| b.is_ascii_digit())
}

/// True if a line ends with the panel's message terminator:
/// `HH:MM[AP] DDMMYY WORD` (e.g. `08:57A 102925 Mie`).
pub fn ends_with_panel_timestamp(line: &str) -> bool {
    let mut rev = line.trim_end().split_whitespace().rev();
    let (Some(trailer), Some(date), Some(clock)) = (rev.next(), rev.next(), rev.next()) else {
        return false;
    };
    trailer.chars().all(|c| c.is_alphanumeric() || c == '_')
        && is_date_token(date)
        && is_clock_token(clock)
}
