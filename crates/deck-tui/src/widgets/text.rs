//! Column fitting by display width (wide glyphs count as two cells).

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Cut `s` to at most `width` cells, ending in `…` when shortened.
pub fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// `truncate`, then pad with spaces to exactly `width` cells.
pub fn fit(s: &str, width: usize) -> String {
    let mut out = truncate(s, width);
    let pad = width.saturating_sub(out.width());
    out.extend(std::iter::repeat(' ').take(pad));
    out
}
