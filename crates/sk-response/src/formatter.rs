//! Stage 3: class-specific rendering of a sanitised body into a
//! [`Formatted`] value — either plain text, or plain text plus an atomic
//! [`Embed`].

use crate::classifier::Class;

#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: String,
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formatted {
    pub class: Class,
    pub text: String,
    pub embed: Option<Embed>,
}

const MAX_CODE_LINES: usize = 30;
const MAX_EMBED_FIELDS: usize = 25;
const MAX_SNIPPET_CHARS: usize = 100;
const MAX_SEARCH_ITEMS: usize = 10;

fn strip_markdown_headers(text: &str) -> String {
    text.lines()
        .map(|l| {
            let trimmed = l.trim_start();
            if let Some(rest) = trimmed.strip_prefix("## ") {
                rest.to_string()
            } else if let Some(rest) = trimmed.strip_prefix("# ") {
                rest.to_string()
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_pipe_table(text: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut lines = text.lines().filter(|l| l.trim_start().starts_with('|'));
    let header = lines
        .next()
        .map(|l| split_row(l))
        .unwrap_or_default();
    let mut rows = Vec::new();
    for line in lines {
        // skip markdown separator rows like | --- | --- |
        if line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ')) {
            continue;
        }
        rows.push(split_row(line));
    }
    (header, rows)
}

fn split_row(line: &str) -> Vec<String> {
    line.trim().trim_matches('|').split('|').map(|c| c.trim().to_string()).collect()
}

/// Indicates whether the user's own turn contained a cue asking to see code.
pub fn user_requested_raw_code(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    ["show me", "raw", "paste", "full code", "source code"]
        .iter()
        .any(|n| lower.contains(n))
}

pub fn format(class: Class, text: &str, user_text: &str) -> Formatted {
    match class {
        Class::Conversational => {
            let stripped = strip_markdown_headers(text);
            Formatted { class, text: stripped, embed: None }
        }

        Class::DataTable => format_data_table(class, text),

        Class::Code => format_code(class, text, user_text),

        Class::SearchResults | Class::NewsResults | Class::LocalResults | Class::ImageResults => {
            format_results(class, text)
        }

        Class::Schedule => {
            // Relative/native timestamp rendering is delegated to the
            // renderer stage, which has the target platform's syntax.
            Formatted { class, text: text.to_string(), embed: None }
        }

        Class::Error => format_error(class, text),

        Class::List | Class::Mixed | Class::LongRunningAck | Class::Proactive => {
            Formatted { class, text: text.to_string(), embed: None }
        }
    }
}

fn format_data_table(class: Class, text: &str) -> Formatted {
    let (header, rows) = parse_pipe_table(text);
    let cols = header.len();
    let row_count = rows.len();

    if cols <= 4 && row_count <= 6 && cols > 0 {
        let mut fields = Vec::new();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(col_name) = header.get(i) {
                    fields.push((col_name.clone(), cell.clone(), cols <= 2));
                }
            }
        }
        fields.truncate(MAX_EMBED_FIELDS);
        return Formatted {
            class,
            text: String::new(),
            embed: Some(Embed { title: None, description: String::new(), fields, footer: None }),
        };
    }

    if (2..=3).contains(&cols) && row_count > 0 {
        let mut prose = String::new();
        for row in &rows {
            let line = header
                .iter()
                .zip(row.iter())
                .map(|(h, v)| format!("{h}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            prose.push_str(&line);
            prose.push('\n');
        }
        return Formatted { class, text: prose.trim_end().to_string(), embed: None };
    }

    // Wider than a comparison table: fixed-width monospaced block.
    let mut block = String::from("```\n");
    block.push_str(&header.join(" | "));
    block.push('\n');
    for row in &rows {
        block.push_str(&row.join(" | "));
        block.push('\n');
    }
    block.push_str("```");
    Formatted { class, text: block, embed: None }
}

fn format_code(class: Class, text: &str, user_text: &str) -> Formatted {
    if !user_requested_raw_code(user_text) {
        let summary = text
            .lines()
            .filter(|l| !l.trim_start().starts_with("```"))
            .take(2)
            .collect::<Vec<_>>()
            .join(" ");
        return Formatted {
            class,
            text: format!("{summary}\n\n_(code omitted — ask to \"show me\" for the raw block)_"),
            embed: None,
        };
    }

    let mut out_lines = Vec::new();
    let mut truncated = false;
    let mut in_fence = false;
    let mut code_lines = 0usize;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out_lines.push(line.to_string());
            continue;
        }
        if in_fence {
            if code_lines >= MAX_CODE_LINES {
                truncated = true;
                continue;
            }
            code_lines += 1;
        }
        out_lines.push(line.to_string());
    }
    let mut body = out_lines.join("\n");
    if truncated {
        body.push_str(&format!("\n… truncated after {MAX_CODE_LINES} lines"));
    }
    Formatted { class, text: body, embed: None }
}

fn format_results(class: Class, text: &str) -> Formatted {
    let summary = text.lines().take(2).collect::<Vec<_>>().join(" ");
    let mut seen_hosts = std::collections::HashSet::new();
    let mut fields = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.starts_with("- ") || trimmed.starts_with("* ")) {
            continue;
        }
        if fields.len() >= MAX_SEARCH_ITEMS {
            break;
        }
        let item = trimmed.trim_start_matches("- ").trim_start_matches("* ");
        let host = extract_host(item);
        if let Some(h) = &host {
            if !seen_hosts.insert(h.clone()) {
                continue;
            }
        }
        let mut snippet = item.to_string();
        if snippet.len() > MAX_SNIPPET_CHARS {
            snippet.truncate(MAX_SNIPPET_CHARS);
            snippet.push('…');
        }
        fields.push((host.unwrap_or_default(), snippet, false));
    }

    Formatted {
        class,
        text: String::new(),
        embed: Some(Embed { title: None, description: summary, fields, footer: None }),
    }
}

fn extract_host(item: &str) -> Option<String> {
    let idx = item.find("http")?;
    let rest = &item[idx..];
    let rest = rest.strip_prefix("https://").or_else(|| rest.strip_prefix("http://"))?;
    let host_end = rest.find(['/', ' ']).unwrap_or(rest.len());
    Some(rest[..host_end].to_string())
}

fn format_error(class: Class, text: &str) -> Formatted {
    let summary = text.lines().next().unwrap_or("An error occurred.").to_string();
    let mut diagnostic: String = text.lines().skip(1).collect::<Vec<_>>().join("\n");
    if diagnostic.len() > 800 {
        diagnostic.truncate(800);
        diagnostic.push('…');
    }
    let body = if diagnostic.trim().is_empty() {
        summary
    } else {
        format!("{summary}\n```\n{diagnostic}\n```")
    };
    Formatted { class, text: body, embed: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_table_never_emitted_verbatim() {
        let input = "| a | b |\n| - | - |\n| 1 | 2 |";
        let out = format(Class::DataTable, input, "");
        assert!(!out.text.contains('|') || out.embed.is_some());
        if out.embed.is_none() {
            assert!(out.text.starts_with("```"));
        }
    }

    #[test]
    fn small_table_becomes_embed() {
        let input = "| name | age |\n| - | - |\n| bob | 30 |";
        let out = format(Class::DataTable, input, "");
        assert!(out.embed.is_some());
        assert!(out.text.is_empty());
    }

    #[test]
    fn code_hidden_without_explicit_cue() {
        let input = "```rust\nfn f() {}\n```";
        let out = format(Class::Code, input, "what does this do");
        assert!(!out.text.contains("fn f()"));
    }

    #[test]
    fn code_shown_with_explicit_cue() {
        let input = "```rust\nfn f() {}\n```";
        let out = format(Class::Code, input, "show me the raw code");
        assert!(out.text.contains("fn f()"));
    }

    #[test]
    fn error_diagnostic_capped_at_800_chars() {
        let long = "x".repeat(2000);
        let input = format!("Something broke\n{long}");
        let out = format(Class::Error, &input, "");
        assert!(out.text.len() <= 820);
    }
}
