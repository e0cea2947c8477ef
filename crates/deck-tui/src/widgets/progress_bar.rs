//! Smooth Unicode progress bar widget.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::clock::Progress;
use crate::theme::{C_MUTED, C_PAUSED, C_PLAYING, C_SECONDARY};

/// Render `elapsed / duration` as `m:ss ████▍    m:ss` in `area`.
pub fn draw_progress(frame: &mut Frame, area: Rect, progress: Option<Progress>) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let (left_label, right_label) = match progress {
        Some(p) => (fmt_ms(p.elapsed_ms), fmt_ms(p.duration_ms)),
        None => ("-:--".to_string(), "-:--".to_string()),
    };
    let label_w = (left_label.len() + right_label.len() + 2) as u16;
    let bar_w = area.width.saturating_sub(label_w).max(4) as usize;

    let bar = fill_bar(progress.map_or(0.0, ratio), bar_w);
    let bar_color = match progress {
        Some(p) if p.is_playing => C_PLAYING,
        Some(_) => C_PAUSED,
        None => C_MUTED,
    };

    let spans = vec![
        Span::styled(format!("{} ", left_label), Style::default().fg(C_SECONDARY)),
        Span::styled(bar, Style::default().fg(bar_color)),
        Span::styled(format!(" {}", right_label), Style::default().fg(C_MUTED)),
    ];

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Fraction of the track played, clamped to 0..=1.
pub fn ratio(p: Progress) -> f64 {
    if p.duration_ms == 0 {
        return 0.0;
    }
    (p.elapsed_ms as f64 / p.duration_ms as f64).clamp(0.0, 1.0)
}

/// `width` cells of eighth-block fill.
fn fill_bar(fraction: f64, width: usize) -> String {
    const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

    let eighths = (fraction.clamp(0.0, 1.0) * width as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks.min(width) {
        bar.push('█');
    }
    if full_blocks < width {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..width {
            bar.push(' ');
        }
    }
    bar
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn fmt_ms(ms: u64) -> String {
    let s = ms / 1000;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    let s = s % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
