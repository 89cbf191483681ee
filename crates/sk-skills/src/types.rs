use serde::Deserialize;

/// YAML frontmatter of a SKILL.md document (§6 Skill document ingress:
/// `name`, `triggers`, `scheduled`, `conversational`, `channel`).
///
/// Unlike the teacher's `SkillMeta`/`SkillRequirements` (bins/env/os
/// gating, tags), this crate's fields follow §3's `Skill` entity exactly —
/// the requirements gate has no spec counterpart and is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillFrontmatter {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub data_fetcher_ref: Option<String>,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default)]
    pub conversational: bool,
    #[serde(default)]
    pub channel: Option<String>,
}

/// §3 `Skill` — declarative capability, read-only during a process run.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub triggers: Vec<String>,
    pub instructions: String,
    pub data_fetcher_ref: Option<String>,
    pub scheduled: bool,
    pub conversational: bool,
    pub default_channel: Option<String>,
}

impl Skill {
    pub fn from_document(frontmatter: SkillFrontmatter, body: String) -> Self {
        Self {
            name: frontmatter.name,
            triggers: frontmatter.triggers,
            instructions: body,
            data_fetcher_ref: frontmatter.data_fetcher_ref,
            scheduled: frontmatter.scheduled,
            conversational: frontmatter.conversational,
            default_channel: frontmatter.channel,
        }
    }
}
