//! `sk-response` — C2 Response Pipeline: sanitise, classify, format,
//! chunk, and render agent output into platform-safe messages.

pub mod chunker;
pub mod classifier;
pub mod formatter;
pub mod renderer;
pub mod sanitiser;

pub use chunker::{number_chunks, split_chunks_smart, Chunk, CHUNK_MAX};
pub use classifier::{classify, Class};
pub use formatter::{format, Embed, Formatted};
pub use renderer::{render_embed, Payload, RenderedEmbed};
pub use sanitiser::sanitise;

/// Sentinel the agent emits to request the pipeline post nothing (§4.2
/// "Suppression"). Checked verbatim against the *trimmed* raw output before
/// any other stage runs, so the agent can't accidentally trigger it by
/// including the word in a longer reply.
pub const NO_REPLY_SENTINEL: &str = "NO_REPLY";

/// Run the full pipeline (stages 1-5) over raw agent output, producing the
/// ordered list of platform payloads ready for egress (§4.2). `user_text`
/// is the originating user turn, consulted only to detect a "show me the
/// raw code" cue for the `Code` class.
pub fn process(raw_output: &str, raw_mode: bool, user_text: &str) -> Vec<Payload> {
    if raw_output.trim() == NO_REPLY_SENTINEL {
        tracing::info!("response pipeline: NO_REPLY sentinel, suppressing output");
        return Vec::new();
    }

    let sanitised = sanitise(raw_output, raw_mode);
    let class = classify(&sanitised);
    let formatted = format(class, &sanitised, user_text);

    match formatted.embed {
        Some(embed) => vec![Payload::Embed(render_embed(class, embed))],
        None => {
            let chunks = number_chunks(chunker::split_chunks_smart(&formatted.text));
            chunks.into_iter().map(Payload::Text).collect()
        }
    }
}
