//! SKILL.md frontmatter parsing and directory loading.
//!
//! Grounded on `skynet-agent/src/tools/skill.rs`'s `parse_skill_md()`
//! (YAML between `---` delimiters) and `load_skills()` (user-overrides-
//! workspace directory scan, dedup by name) — the requirement-gating half
//! of that file (`SkillRequirements{bins,env,os}`, `which()`) has no
//! counterpart in §3's `Skill` entity and is not carried over.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, SkillError};
use crate::types::{Skill, SkillFrontmatter};

/// Parse one SKILL.md document: YAML frontmatter between `---` delimiters,
/// followed by free-form instruction body.
pub fn parse_skill_md(content: &str) -> Result<(SkillFrontmatter, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err(SkillError::InvalidFrontmatter {
            path: String::new(),
            reason: "document does not start with a `---` frontmatter fence".to_string(),
        });
    }

    let after_first = &trimmed[3..];
    let closing_idx = after_first.find("\n---").ok_or_else(|| SkillError::InvalidFrontmatter {
        path: String::new(),
        reason: "no closing `---` fence found".to_string(),
    })?;
    let yaml_block = &after_first[..closing_idx];
    let body_start = closing_idx + 4;
    let body = if body_start < after_first.len() {
        after_first[body_start..].trim_start_matches('\n').to_string()
    } else {
        String::new()
    };

    let frontmatter: SkillFrontmatter = serde_yaml::from_str(yaml_block).map_err(|e| SkillError::InvalidFrontmatter {
        path: String::new(),
        reason: e.to_string(),
    })?;

    Ok((frontmatter, body))
}

/// Load all `SKILL.md` documents directly under `dir` (one subdirectory per
/// skill, mirroring the teacher's layout), deduplicating by name — first
/// wins, matching the teacher's user-overrides-workspace precedence when
/// `dirs` is ordered highest-priority first.
pub fn load_from_dirs(dirs: &[&Path]) -> Vec<Skill> {
    let mut seen = HashSet::new();
    let mut skills = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let skill_file = path.join("SKILL.md");
            if !skill_file.is_file() {
                continue;
            }
            let raw = match std::fs::read_to_string(&skill_file) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let (frontmatter, body) = match parse_skill_md(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(path = %skill_file.display(), error = %e, "skipping skill: invalid frontmatter");
                    continue;
                }
            };
            if seen.contains(&frontmatter.name) {
                continue;
            }
            seen.insert(frontmatter.name.clone());
            skills.push(Skill::from_document(frontmatter, body));
        }
    }

    skills
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_body() {
        let doc = "---\nname: hydration\ntriggers:\n  - drink water\n  - hydrate\nscheduled: true\nconversational: false\nchannel: \"#food-log\"\n---\nRemind the user to drink water.\n";
        let (fm, body) = parse_skill_md(doc).unwrap();
        assert_eq!(fm.name, "hydration");
        assert_eq!(fm.triggers, vec!["drink water", "hydrate"]);
        assert!(fm.scheduled);
        assert!(!fm.conversational);
        assert_eq!(fm.channel.as_deref(), Some("#food-log"));
        assert_eq!(body.trim(), "Remind the user to drink water.");
    }

    #[test]
    fn missing_opening_fence_is_rejected() {
        let doc = "name: hydration\n---\nbody";
        assert!(parse_skill_md(doc).is_err());
    }

    #[test]
    fn missing_closing_fence_is_rejected() {
        let doc = "---\nname: hydration\n";
        assert!(parse_skill_md(doc).is_err());
    }

    #[test]
    fn load_from_dirs_dedupes_by_name_first_wins() {
        let user_dir = tempfile::tempdir().unwrap();
        let ws_dir = tempfile::tempdir().unwrap();

        let user_skill = user_dir.path().join("hydration");
        std::fs::create_dir_all(&user_skill).unwrap();
        std::fs::write(
            user_skill.join("SKILL.md"),
            "---\nname: hydration\ntriggers: [drink water]\n---\nuser version\n",
        )
        .unwrap();

        let ws_skill = ws_dir.path().join("hydration");
        std::fs::create_dir_all(&ws_skill).unwrap();
        std::fs::write(
            ws_skill.join("SKILL.md"),
            "---\nname: hydration\ntriggers: [drink water]\n---\nworkspace version\n",
        )
        .unwrap();

        let skills = load_from_dirs(&[user_dir.path(), ws_dir.path()]);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].instructions.trim(), "user version");
    }
}
