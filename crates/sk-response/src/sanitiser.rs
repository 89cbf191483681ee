//! Stage 1 of the pipeline: deterministically strip terminal/agent
//! artifacts from raw subprocess output before classification.
//!
//! Rules run in a fixed order and are collectively idempotent: applying
//! [`sanitise`] twice is equivalent to applying it once (§8 property 7).

const BOX_DRAWING_CHARS: &[char] = &['─', '│', '┌', '┐', '└', '┘', '├', '┤', '┬', '┴', '┼', '═', '║'];
const TOOL_MARKER_PREFIXES: &[&str] = &["●", "⎿", "⏺", "⚙"];
const BULLET_GLYPHS: &[&str] = &["•", "◦", "▪"];
const PERMISSION_PROMPT_NEEDLES: &[&str] = &[
    "allow this action",
    "do you want to proceed",
    "(y/n)",
    "permission to run",
];
const COST_NEEDLES: &[&str] = &["tokens used", "input tokens", "output tokens", "cost:", "$0."];

/// Strips ANSI CSI escape sequences (`ESC [ ... <final byte>`).
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for c2 in chars.by_ref() {
                if c2.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn is_box_drawing_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| BOX_DRAWING_CHARS.contains(&c) || c.is_whitespace())
}

fn is_tool_marker_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    TOOL_MARKER_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn is_permission_prompt_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    PERMISSION_PROMPT_NEEDLES.iter().any(|n| lower.contains(n))
}

fn is_cost_accounting_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    COST_NEEDLES.iter().any(|n| lower.contains(n))
}

fn strip_bullet_glyph(line: &str) -> String {
    let trimmed = line.trim_start();
    for glyph in BULLET_GLYPHS {
        if let Some(rest) = trimmed.strip_prefix(glyph) {
            let indent = &line[..line.len() - trimmed.len()];
            return format!("{indent}-{}", rest);
        }
    }
    line.to_string()
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out_lines: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out_lines.push("");
            }
        } else {
            blank_run = 0;
            out_lines.push(line);
        }
    }
    out_lines.join("\n")
}

/// Runs the full sanitiser rule chain. When `raw` is true the chain is
/// bypassed entirely and the body is wrapped in a single code fence instead.
pub fn sanitise(input: &str, raw: bool) -> String {
    if raw {
        return format!("```\n{}\n```", input.trim());
    }

    let mut text = strip_ansi(input);

    let mut kept_lines: Vec<String> = Vec::new();
    for line in text.lines() {
        if is_box_drawing_line(line) {
            continue;
        }
        if is_tool_marker_line(line) {
            continue;
        }
        if is_permission_prompt_line(line) {
            continue;
        }
        if is_cost_accounting_line(line) {
            continue;
        }
        kept_lines.push(strip_bullet_glyph(line));
    }
    text = kept_lines.join("\n");
    text = collapse_blank_runs(&text);
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_is_idempotent() {
        let input = "\u{1b}[31m● Running tool: search\u{1b}[0m\n\
                     Here is your answer.\n\n\n\n\
                     • first point\n\
                     tokens used: 1234 cost: $0.02\n\
                     Do you want to proceed? (y/n)\n\
                     ──────────────\n\
                     done.";
        let once = sanitise(input, false);
        let twice = sanitise(&once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_ansi_escapes() {
        let input = "\u{1b}[1;32mgreen bold\u{1b}[0m plain";
        assert_eq!(sanitise(input, false), "green bold plain");
    }

    #[test]
    fn collapses_three_plus_blank_lines_to_two() {
        let input = "a\n\n\n\n\nb";
        assert_eq!(sanitise(input, false), "a\n\n\nb".trim());
    }

    #[test]
    fn strips_tool_marker_and_permission_lines() {
        let input = "● calling search tool\nreal content\nAllow this action? (y/n)";
        assert_eq!(sanitise(input, false), "real content");
    }

    #[test]
    fn raw_mode_wraps_in_fence_and_skips_rules() {
        let input = "● not stripped\ntokens used: 1";
        let out = sanitise(input, true);
        assert!(out.starts_with("```\n"));
        assert!(out.contains("● not stripped"));
        assert!(out.contains("tokens used: 1"));
    }
}
