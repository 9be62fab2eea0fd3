#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use similar::{Algorithm, ChangeTag, utils::diff_unicode_words};
use snailquote::escape;

use crate::rubric::Comparison;

/// Longest preview of a line shown in a mismatch explanation.
const PREVIEW_CHARS: usize = 80;

/// Longest mismatch explanation.
const DETAIL_LIMIT: usize = 400;

/// Compares program output against the expected output.
///
/// Returns `Err` with a short explanation of the first difference.
pub fn compare(expected: &str, actual: &str, comparison: Comparison) -> Result<(), String> {
    match comparison {
        Comparison::Exact => compare_exact(expected, actual),
        Comparison::NumericTolerance { epsilon } => compare_numeric(expected, actual, epsilon),
    }
}

/// Drops a single trailing `\n` or `\r\n`.
fn strip_one_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Byte equality after stripping one trailing newline from each side.
fn compare_exact(expected: &str, actual: &str) -> Result<(), String> {
    let expected = strip_one_newline(expected);
    let actual = strip_one_newline(actual);
    if expected == actual {
        return Ok(());
    }

    let mut expected_lines = expected.split('\n');
    let mut actual_lines = actual.split('\n');
    let mut line = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(want), Some(got)) if want == got => line += 1,
            (Some(want), Some(got)) => {
                return Err(truncate_with_notice(
                    &format!(
                        "line {line}: expected {}, got {} ({})",
                        preview(want),
                        preview(got),
                        word_diff(want, got)
                    ),
                    DETAIL_LIMIT,
                ));
            }
            (Some(want), None) => {
                return Err(format!("output ended early; line {line} should be {}", preview(want)));
            }
            (None, Some(got)) => {
                return Err(format!("unexpected extra output at line {line}: {}", preview(got)));
            }
            (None, None) => return Err("output differs only in line endings".to_string()),
        }
    }
}

/// Token-wise comparison: every token must be a number and each pair must
/// agree within `epsilon`.
fn compare_numeric(expected: &str, actual: &str, epsilon: f64) -> Result<(), String> {
    let want: Vec<&str> = expected.split_whitespace().collect();
    let got: Vec<&str> = actual.split_whitespace().collect();
    if want.len() != got.len() {
        return Err(format!(
            "expected {} token(s), got {}: {}",
            want.len(),
            got.len(),
            preview(actual.trim())
        ));
    }

    for (position, (w, g)) in want.iter().zip(&got).enumerate() {
        let (Ok(a), Ok(b)) = (w.parse::<f64>(), g.parse::<f64>()) else {
            return Err(format!(
                "token {}: expected {}, got {}; both must be numbers",
                position + 1,
                preview(w),
                preview(g)
            ));
        };
        if !(a.is_finite() && b.is_finite()) {
            // NaN never matches; an infinity only matches itself
            if a == b {
                continue;
            }
            return Err(format!(
                "token {}: expected {}, got {}; not a finite number",
                position + 1,
                preview(w),
                preview(g)
            ));
        }
        if (a - b).abs() > epsilon {
            return Err(format!(
                "token {}: expected {}, got {} (tolerance {epsilon})",
                position + 1,
                preview(w),
                preview(g)
            ));
        }
    }

    Ok(())
}

/// Inline word diff, deletions as `[-x-]` and insertions as `{+y+}`.
fn word_diff(expected: &str, actual: &str) -> String {
    diff_unicode_words(Algorithm::Patience, expected, actual)
        .into_iter()
        .map(|(tag, value)| match tag {
            ChangeTag::Equal => value.to_string(),
            ChangeTag::Delete => format!("[-{value}-]"),
            ChangeTag::Insert => format!("{{+{value}+}}"),
        })
        .collect()
}

/// Quoted, escaped and shortened rendering of one line.
fn preview(text: &str) -> String {
    let mut head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        head.push('…');
    }
    if head.is_empty() {
        return "[empty]".to_string();
    }
    let escaped = escape(&head);
    if escaped.starts_with(['"', '\'']) {
        escaped.into_owned()
    } else {
        format!("\"{escaped}\"")
    }
}

/// Truncates `content` to `limit` bytes, appending a notice.
fn truncate_with_notice(content: &str, limit: usize) -> String {
    if content.len() <= limit {
        return content.to_string();
    }

    let mut end = limit;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }

    let mut truncated = content[..end].to_string();
    truncated.push_str("...[TRUNCATED]");
    truncated
}
