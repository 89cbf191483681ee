//! Stage 4: split a formatted body into platform-safe message chunks.
//!
//! Adapted from the fence-aware chunking idiom used for chat-platform
//! message splitting: accumulate by line, track open code fences so a
//! split never breaks one, then run a force-split safety net over any
//! chunk that still exceeds the limit (an unbreakable token longer than
//! the limit).

pub const CHUNK_MAX: usize = 2000;
const MAX_VISIBLE_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(String),
    /// An embed is atomic — it is never split, and occupies exactly one chunk.
    EmbedPlaceholder,
}

/// Splits `text` into chunks of at most [`CHUNK_MAX`] characters, never
/// breaking a fenced code block, reopening the fence (with its language
/// tag) at the top of the next chunk when a fence must be carried across a
/// split.
pub fn split_chunks_smart(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    let mut fence_lang: Option<String> = None;

    for line in text.split('\n') {
        if let Some(lang) = fence_language_toggle(line, &fence_lang) {
            fence_lang = lang;
        }

        let cost = line.len() + 1;
        let would_overflow =
            !current.is_empty() && (current_len + cost > CHUNK_MAX || current.len() >= MAX_VISIBLE_LINES);

        if would_overflow {
            if fence_lang.is_some() {
                current.push("```".to_string());
            }
            chunks.push(current.join("\n"));
            current = Vec::new();
            current_len = 0;
            if let Some(lang) = &fence_lang {
                let reopen = format!("```{lang}");
                current_len += reopen.len() + 1;
                current.push(reopen);
            }
        }

        current_len += line.len() + 1;
        current.push(line.to_string());
    }
    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    force_split_oversized(&chunks)
}

/// Tracks code-fence open/close state. Returns `Some(new_state)` when the
/// line toggles fence state, `None` when it doesn't touch it.
fn fence_language_toggle(line: &str, current: &Option<String>) -> Option<Option<String>> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("```") {
        return None;
    }
    if current.is_some() {
        Some(None)
    } else {
        let lang = trimmed.trim_start_matches("```").trim();
        Some(Some(lang.to_string()))
    }
}

/// Safety net: force-splits any chunk still over [`CHUNK_MAX`] (an
/// unbreakable single line/token longer than the limit), preferring a
/// newline, then a space, else a hard cut.
fn force_split_oversized(chunks: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in chunks {
        if chunk.len() <= CHUNK_MAX {
            out.push(chunk.clone());
            continue;
        }
        let mut rest = chunk.as_str();
        while rest.len() > CHUNK_MAX {
            let mut boundary = CHUNK_MAX;
            while !rest.is_char_boundary(boundary) {
                boundary -= 1;
            }
            let window = &rest[..boundary];
            let split_at = window
                .rfind('\n')
                .or_else(|| window.rfind(' '))
                .filter(|&i| i > 0)
                .unwrap_or(boundary);
            out.push(rest[..split_at].to_string());
            rest = rest[split_at..].trim_start_matches(['\n', ' ']);
        }
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
    }
    out
}

/// Applies `(1/N) … (N/N)` numbering when there are 3 or more chunks.
pub fn number_chunks(chunks: Vec<String>) -> Vec<String> {
    let n = chunks.len();
    if n < 3 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, c)| format!("{c}\n\n_({}/{n})_", i + 1))
        .collect()
}
