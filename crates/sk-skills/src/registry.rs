//! Skill indexing, trigger resolution, and data-fetcher dispatch (C7).
//!
//! Grounded on `skynet-agent/src/tools/skill.rs`'s in-memory `Vec<SkillEntry>`
//! lookup shape, generalised into an index keyed by both name and trigger
//! phrase per §4.7.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SkillError};
use crate::types::Skill;

/// Runs a skill's registered pre-fetch before the envelope is assembled.
/// §4.4/§4.7: "run the skill's registered data fetcher (if any) before
/// assembling the envelope." Best-effort failures degrade the envelope
/// rather than failing the Request (the `TransientUpstream` kind, §7).
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn fetch(&self, skill: &Skill) -> std::result::Result<Value, String>;
}

/// Read-only index over the loaded skill set, reloaded wholesale on
/// `/reload-schedule` (§3: "Read-only during a process run; reloaded on
/// explicit `/reload-schedule`").
pub struct SkillRegistry {
    skills: Vec<Skill>,
    by_name: HashMap<String, usize>,
    fetchers: HashMap<String, Arc<dyn DataFetcher>>,
}

impl SkillRegistry {
    pub fn new(skills: Vec<Skill>) -> Self {
        let by_name = skills.iter().enumerate().map(|(i, s)| (s.name.clone(), i)).collect();
        Self {
            skills,
            by_name,
            fetchers: HashMap::new(),
        }
    }

    pub fn register_fetcher(&mut self, fetcher_ref: impl Into<String>, fetcher: Arc<dyn DataFetcher>) {
        self.fetchers.insert(fetcher_ref.into(), fetcher);
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.by_name.get(name).map(|&i| &self.skills[i])
    }

    pub fn all(&self) -> &[Skill] {
        &self.skills
    }

    /// Resolve incoming text to a skill. A leading `/skillname` always
    /// binds to that skill, bypassing trigger matching. Otherwise:
    /// case-insensitive substring match against the union of trigger
    /// phrases; an ambiguous match (multiple skills' triggers match)
    /// resolves to the first declared (§4.7).
    pub fn resolve(&self, text: &str) -> Option<&Skill> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let name = rest.split_whitespace().next().unwrap_or(rest);
            if let Some(skill) = self.get(name) {
                return Some(skill);
            }
        }

        let lowered = trimmed.to_lowercase();
        self.skills.iter().find(|skill| {
            skill
                .triggers
                .iter()
                .any(|trigger| lowered.contains(&trigger.to_lowercase()))
        })
    }

    /// Run the skill's registered data fetcher, if any. Returns `Ok(None)`
    /// when the skill declares no fetcher. §4.7: "on failure the skill
    /// still runs with a sentinel placeholder in its data slot" — so a
    /// fetcher error degrades to `Ok(Some(sentinel))` rather than failing
    /// the skill invocation; only a dangling `fetcher_ref` (a registry
    /// wiring bug, not a runtime condition) is a hard error.
    pub async fn prefetch(&self, skill: &Skill) -> Result<Option<Value>> {
        let Some(fetcher_ref) = &skill.data_fetcher_ref else {
            return Ok(None);
        };
        let fetcher = self.fetchers.get(fetcher_ref).ok_or_else(|| SkillError::NoSuchFetcher {
            fetcher_ref: fetcher_ref.clone(),
        })?;
        match fetcher.fetch(skill).await {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                debug!(skill = %skill.name, fetcher_ref, error = %e, "data fetcher failed, using sentinel placeholder");
                Ok(Some(serde_json::json!({ "_fetch_failed": true, "fetcher_ref": fetcher_ref })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_skill(name: &str, triggers: &[&str]) -> Skill {
        Skill {
            name: name.to_string(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            instructions: "do the thing".to_string(),
            data_fetcher_ref: None,
            scheduled: false,
            conversational: true,
            default_channel: None,
        }
    }

    #[test]
    fn case_insensitive_substring_trigger_match() {
        let registry = SkillRegistry::new(vec![make_skill("hydration", &["drink water", "hydrate"])]);
        assert_eq!(registry.resolve("please DRINK WATER now").unwrap().name, "hydration");
    }

    #[test]
    fn slash_prefix_bypasses_triggers() {
        let registry = SkillRegistry::new(vec![make_skill("hydration", &["drink water"])]);
        assert_eq!(registry.resolve("/hydration").unwrap().name, "hydration");
        assert_eq!(registry.resolve("/hydration now please").unwrap().name, "hydration");
    }

    #[test]
    fn ambiguous_match_resolves_to_first_declared() {
        let registry = SkillRegistry::new(vec![
            make_skill("hydration", &["water"]),
            make_skill("weather", &["water"]),
        ]);
        assert_eq!(registry.resolve("how much water today").unwrap().name, "hydration");
    }

    #[test]
    fn no_match_returns_none() {
        let registry = SkillRegistry::new(vec![make_skill("hydration", &["drink water"])]);
        assert!(registry.resolve("what time is it").is_none());
    }

    #[tokio::test]
    async fn prefetch_returns_none_without_a_fetcher_ref() {
        let registry = SkillRegistry::new(vec![make_skill("hydration", &["drink water"])]);
        let skill = registry.get("hydration").unwrap();
        assert!(registry.prefetch(skill).await.unwrap().is_none());
    }

    struct FailingFetcher;

    #[async_trait]
    impl DataFetcher for FailingFetcher {
        async fn fetch(&self, _skill: &Skill) -> std::result::Result<Value, String> {
            Err("upstream unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn prefetch_failure_degrades_to_sentinel_placeholder() {
        let mut skill = make_skill("weather", &["forecast"]);
        skill.data_fetcher_ref = Some("weather-api".to_string());
        let mut registry = SkillRegistry::new(vec![skill]);
        registry.register_fetcher("weather-api", Arc::new(FailingFetcher));

        let skill = registry.get("weather").unwrap();
        let data = registry.prefetch(skill).await.unwrap();
        assert!(data.unwrap().get("_fetch_failed").is_some());
    }

    #[tokio::test]
    async fn prefetch_with_dangling_fetcher_ref_is_an_error() {
        let mut skill = make_skill("weather", &["forecast"]);
        skill.data_fetcher_ref = Some("no-such-fetcher".to_string());
        let registry = SkillRegistry::new(vec![skill]);

        let skill = registry.get("weather").unwrap();
        assert!(registry.prefetch(skill).await.is_err());
    }
}
