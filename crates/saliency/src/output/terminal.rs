//! Terminal output with colors and box drawing.

use colored::Colorize;

use saliency_core::StreamName;

use crate::masking::AccuracyAtQ;
use crate::runner::Explanation;

/// Format an explanation run for the terminal.
pub fn format_explanation(explanation: &Explanation) -> String {
    let config = &explanation.config;
    let reason = explanation.reason();
    let mut output = String::new();

    let header = if reason.is_converged() {
        format!("{} {}", "\u{2713}".green().bold(), "CONVERGED".green().bold())
    } else {
        format!(
            "{} {}",
            "\u{26A0}".yellow().bold(),
            "BUDGET EXHAUSTED".yellow().bold()
        )
    };

    output.push_str(&format_box_top());
    output.push_str(&format_box_line(&header));
    output.push_str(&format_box_separator());

    output.push_str(&format_box_line(&format!(
        "Method: {} (image {}, label {})",
        config.method.to_string().bold(),
        config.image_index,
        explanation.label
    )));
    output.push_str(&format_box_line(&format!(
        "Batches: {} / {} ({} samples)",
        explanation.batches(),
        config.max_batches,
        explanation.samples()
    )));

    let delta_str = format!(
        "Delta: {:.3e} (min change {:.1e})",
        reason.delta(),
        config.min_change
    );
    let delta_colored = if reason.is_converged() {
        delta_str.green()
    } else {
        delta_str.yellow()
    };
    output.push_str(&format_box_line(&delta_colored.to_string()));
    output.push_str(&format_box_separator());

    if let Some(saliency) = explanation.saliency() {
        output.push_str(&format_box_line(&"Saliency:".bold().to_string()));
        output.push_str(&format_box_line(&format!(
            "  {}: {:?}",
            config.monitored_source(),
            saliency.shape()
        )));
        let max = saliency.iter().fold(0.0_f32, |m, &x| m.max(x.abs()));
        output.push_str(&format_box_line(&format!(
            "  mean {:.4e}, max |x| {:.4e}",
            saliency.mean().unwrap_or(f32::NAN),
            max
        )));
    }
    if let Some(at_label) = explanation.mean(&StreamName::RESULTS_AT_PROJECTION) {
        output.push_str(&format_box_line(&format!(
            "  mean output at label: {:.4}",
            at_label.iter().next().copied().unwrap_or(f32::NAN)
        )));
    }

    output.push_str(&format_box_bottom());
    output
}

/// Format an accuracy curve as a compact table.
pub fn format_accuracy(curve: &[AccuracyAtQ]) -> String {
    let mut output = String::new();
    output.push_str(&format_box_top());
    output.push_str(&format_box_line(&"Accuracy at q".bold().to_string()));
    output.push_str(&format_box_separator());
    for point in curve {
        let mark = if point.correct {
            "\u{2713}".green().to_string()
        } else {
            "\u{2717}".red().to_string()
        };
        output.push_str(&format_box_line(&format!(
            "{} {:>9} q={:>5.1}  kept {:>5.1}%  predicted {}",
            mark,
            point.direction.to_string(),
            point.remove_q,
            point.actual_q * 100.0,
            point.predicted
        )));
    }
    output.push_str(&format_box_bottom());
    output
}

// Box drawing helpers

const BOX_WIDTH: usize = 62;

fn format_box_top() -> String {
    format!("\u{250C}{}\u{2510}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_bottom() -> String {
    format!("\u{2514}{}\u{2518}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_separator() -> String {
    format!("\u{251C}{}\u{2524}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_line(content: &str) -> String {
    let visible_len = strip_ansi_codes(content).chars().count();
    let padding = (BOX_WIDTH - 2).saturating_sub(visible_len);
    format!("\u{2502} {}{} \u{2502}\n", content, " ".repeat(padding))
}

fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // skip to the terminating 'm'
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
