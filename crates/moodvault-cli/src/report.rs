use std::fmt::Write as _;

use moodvault_core::store::CorpusView;

const BAR_WIDTH: usize = 40;

/// Render decrypted rows followed by a text bar chart of the label distribution.
pub fn render(view: &CorpusView) -> String {
    let mut out = String::new();
    if view.rows.is_empty() {
        out.push_str("No entries stored yet.\n");
        return out;
    }

    let _ = writeln!(out, "{:>4}  {:<9} Text", "#", "Emotion");
    for (index, row) in view.rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:<9} {}",
            index + 1,
            row.label.as_str(),
            single_line(row.plaintext.display())
        );
    }

    let failed = view.failed_rows();
    if failed > 0 {
        let _ = writeln!(
            out,
            "\n{failed} of {} entries could not be decrypted with the current key.",
            view.rows.len()
        );
    }

    out.push_str("\nEmotion distribution\n");
    let max = view.tally.iter().map(|(_, count)| count).max().unwrap_or(0);
    for (label, count) in view.tally.iter() {
        let width = (count * BAR_WIDTH).div_ceil(max.max(1));
        let _ = writeln!(
            out,
            "  {:<9} {:<bar_width$} {count}",
            label.as_str(),
            "#".repeat(width),
            bar_width = BAR_WIDTH
        );
    }
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
