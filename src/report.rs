use std::fmt::Write;
use std::time::Duration;

use crate::top_k::RankedEntry;

const RED: &str = "\x1b[31m";
const BOLD_GREEN: &str = "\x1b[32m\x1b[1m";
const RESET: &str = "\x1b[0m";

struct Paint {
    color: bool,
}

impl Paint {
    fn wrap(&self, out: &mut String, style: &str, value: impl std::fmt::Display) {
        if self.color {
            let _ = write!(out, "{}{}{}", style, value, RESET);
        } else {
            let _ = write!(out, "{}", value);
        }
    }
}

/// Ranked list, 1-based, identifiers quoted.
pub fn render_ranking(ranked: &[RankedEntry], top_k: usize, color: bool) -> String {
    let paint = Paint { color };
    let mut out = String::with_capacity(64 + ranked.len() * 48);

    out.push_str("Here is the ");
    paint.wrap(&mut out, RED, format_args!("TOP {}", top_k));
    out.push_str(" artists:\n\n");
    for (i, entry) in ranked.iter().enumerate() {
        let _ = write!(out, "{}. {:?} with ", i + 1, entry.identifier);
        paint.wrap(&mut out, BOLD_GREEN, entry.count);
        out.push_str(" appearances\n");
    }
    out
}

pub fn render_elapsed(elapsed: Duration, color: bool) -> String {
    let paint = Paint { color };
    let mut out = String::from("Time taken: ");
    paint.wrap(&mut out, BOLD_GREEN, elapsed.as_secs());
    out.push_str(" seconds and ");
    paint.wrap(&mut out, BOLD_GREEN, elapsed.subsec_millis());
    out.push_str(" milliseconds");
    out
}
