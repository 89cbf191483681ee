//! C4 — Context Assembler.
//!
//! Builds the opaque envelope handed to C1 on stdin. Grounded on
//! `skynet-agent/src/pipeline/process.rs`'s `format_envelope()` (timestamp
//! envelope for buffered messages) and its section-marker assembly; every
//! optional upstream source is best-effort and degrades to an empty section
//! on failure or timeout (§4.4 failure policy), logged at `warn!`.

use chrono::Utc;
use tracing::warn;

use crate::memory::KnowledgeSource;
use crate::memory::MemorySource;

/// The active skill's instructions and pre-fetched data, when the request
/// originated from a skill trigger or a scheduled job.
pub struct SkillBlock {
    pub name: String,
    pub instructions: String,
    /// Opaque JSON blob from the skill's `DataFetcher`, if any.
    pub prefetched_data: Option<serde_json::Value>,
}

pub struct AssembleInput<'a> {
    pub channel_id: &'a str,
    pub system_identity: &'a str,
    /// Oldest-first recent buffer, per `ChannelSession.message_buffer`.
    pub recent_buffer: &'a [String],
    pub user_text: &'a str,
    pub skill: Option<SkillBlock>,
}

/// Section markers resolved per DESIGN.md's answer to Open Question #2 —
/// plain `## <n>. <title>` lines; the exact byte format of the agent's own
/// operating document is out of the core's contract, only ordering is.
pub struct ContextAssembler {
    memory: Option<Box<dyn MemorySource>>,
    knowledge: Option<Box<dyn KnowledgeSource>>,
}

impl ContextAssembler {
    pub fn new(
        memory: Option<Box<dyn MemorySource>>,
        knowledge: Option<Box<dyn KnowledgeSource>>,
    ) -> Self {
        Self { memory, knowledge }
    }

    /// Build the envelope. Never fails — any optional source that errors or
    /// times out is replaced by an empty section.
    pub async fn assemble(&self, input: AssembleInput<'_>) -> String {
        let memory_snippet = match &self.memory {
            Some(m) => m.query(input.user_text).await.unwrap_or_else(|| {
                warn!(channel_id = %input.channel_id, "memory query degraded to empty section");
                String::new()
            }),
            None => String::new(),
        };

        let knowledge_snippet = match &self.knowledge {
            Some(k) => k.query(input.user_text).await.unwrap_or_else(|| {
                warn!(channel_id = %input.channel_id, "knowledge query degraded to empty section");
                String::new()
            }),
            None => String::new(),
        };

        let mut out = String::new();

        out.push_str("## 1. System\n");
        out.push_str(input.system_identity);
        out.push_str("\n\n");

        out.push_str("## 2. Recent buffer\n");
        if input.recent_buffer.is_empty() {
            out.push_str("(none)\n");
        } else {
            for msg in input.recent_buffer {
                out.push_str("- ");
                out.push_str(msg);
                out.push('\n');
            }
        }
        out.push('\n');

        out.push_str("## 3. Memory\n");
        out.push_str(if memory_snippet.is_empty() { "(none)" } else { &memory_snippet });
        out.push_str("\n\n");

        out.push_str("## 4. Knowledge\n");
        out.push_str(if knowledge_snippet.is_empty() { "(none)" } else { &knowledge_snippet });
        out.push_str("\n\n");

        out.push_str("## 5. Skill\n");
        match &input.skill {
            Some(skill) => {
                out.push_str(&format!("### {}\n", skill.name));
                out.push_str(&skill.instructions);
                out.push('\n');
                if let Some(data) = &skill.prefetched_data {
                    out.push_str("\n#### Pre-fetched data\n```json\n");
                    out.push_str(&serde_json::to_string_pretty(data).unwrap_or_default());
                    out.push_str("\n```\n");
                }
            }
            None => out.push_str("(none)\n"),
        }
        out.push('\n');

        out.push_str("## 6. Request\n");
        out.push_str(&format!(
            "[{} {}] {}",
            input.channel_id,
            Utc::now().format("%Y-%m-%d %H:%M UTC"),
            input.user_text
        ));

        out
    }

    /// Fire-and-forget capture of a completed turn's final text into the
    /// memory store (§2 dataflow). A no-op when no memory source is
    /// configured.
    pub async fn capture(&self, channel_id: &str, request_id: &str, text: &str) {
        if let Some(memory) = &self.memory {
            memory.capture(channel_id, request_id, text).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assembles_sections_in_order_with_no_optional_sources() {
        let assembler = ContextAssembler::new(None, None);
        let envelope = assembler
            .assemble(AssembleInput {
                channel_id: "c1",
                system_identity: "You are a helpful assistant.",
                recent_buffer: &["hi".to_string(), "how are you".to_string()],
                user_text: "what's the weather",
                skill: None,
            })
            .await;

        let order = [
            "## 1. System",
            "## 2. Recent buffer",
            "## 3. Memory",
            "## 4. Knowledge",
            "## 5. Skill",
            "## 6. Request",
        ];
        let mut last_idx = 0;
        for marker in order {
            let idx = envelope.find(marker).expect("marker present");
            assert!(idx >= last_idx, "{marker} out of order");
            last_idx = idx;
        }
        assert!(envelope.contains("what's the weather"));
    }

    #[tokio::test]
    async fn skill_block_renders_instructions_and_prefetched_data() {
        let assembler = ContextAssembler::new(None, None);
        let envelope = assembler
            .assemble(AssembleInput {
                channel_id: "c1",
                system_identity: "identity",
                recent_buffer: &[],
                user_text: "run hydration",
                skill: Some(SkillBlock {
                    name: "hydration".to_string(),
                    instructions: "Remind the user to drink water.".to_string(),
                    prefetched_data: Some(serde_json::json!({"last_glass_minutes_ago": 45})),
                }),
            })
            .await;

        assert!(envelope.contains("### hydration"));
        assert!(envelope.contains("Remind the user to drink water."));
        assert!(envelope.contains("last_glass_minutes_ago"));
    }
}
