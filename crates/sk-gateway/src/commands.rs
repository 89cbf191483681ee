//! Command surface: `/reload-schedule`, `/status`, `/skill <name>` (§6).
//!
//! Grounded on `skynet-agent/src/pipeline/slash.rs`'s literal-match
//! dispatcher — `eq_ignore_ascii_case`/`strip_prefix` checks returning
//! `Option<...>`, `None` meaning "not a recognised command, forward on".

use std::sync::Arc;

use sk_core::Origin;
use sk_response::Payload;
use sk_scheduler::SchedulerEngine;
use sk_skills::SkillRegistry;

use crate::wiring::{now_stamp, Core, GatewayJobExecutor};

/// Attempt to dispatch `text` as a known command. Returns `None` if it
/// isn't one, in which case the caller should forward it to the agent
/// pipeline (or, for a bare `/skillname`, to [`SkillRegistry::resolve`]'s
/// own slash-bypass).
pub async fn dispatch(
    text: &str,
    channel_id: &str,
    core: &Arc<Core>,
    scheduler: &Arc<SchedulerEngine<GatewayJobExecutor>>,
    schedule_path: &str,
    skills_dir: &str,
) -> Option<Vec<Payload>> {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("/status") {
        let registry = core.skills_snapshot();
        return Some(vec![Payload::Text(format!(
            "Skynet status ({})\n- bound jobs: {}\n- loaded skills: {}",
            now_stamp(),
            scheduler.bound_job_count(),
            registry.all().len(),
        ))]);
    }

    if trimmed.eq_ignore_ascii_case("/reload-schedule") {
        return Some(vec![Payload::Text(reload(core, scheduler, schedule_path, skills_dir))]);
    }

    if let Some(name) = trimmed.strip_prefix("/skill ") {
        let name = name.trim();
        let registry = core.skills_snapshot();
        let Some(skill) = registry.get(name).cloned() else {
            return Some(vec![Payload::Text(format!("No such skill: `{name}`."))]);
        };
        let user_text = format!("/skill {name}");
        let payloads = core.run_request(Origin::User, channel_id, &user_text, Some(&skill), false).await;
        return Some(payloads);
    }

    None
}

/// Reload the skill index from disk, then reload the schedule document.
/// Per §3, the Skill entity is "reloaded on explicit `/reload-schedule`" —
/// one command drives both, in that order, since a reloaded schedule row
/// may reference a skill that only just appeared on disk.
fn reload(core: &Arc<Core>, scheduler: &Arc<SchedulerEngine<GatewayJobExecutor>>, schedule_path: &str, skills_dir: &str) -> String {
    let skills = sk_skills::load_from_dirs(&[std::path::Path::new(skills_dir)]);
    let skill_count = skills.len();
    core.reload_skills(SkillRegistry::new(skills));

    let doc = match std::fs::read_to_string(schedule_path) {
        Ok(doc) => doc,
        Err(e) => return format!("Skills reloaded ({skill_count}). Failed to read schedule document: {e}"),
    };
    let report = scheduler.reload(&doc);
    format!(
        "Reloaded. Skills: {skill_count}. Schedule — added {}, removed {}, kept {}, duplicates dropped {}, rejected {}.",
        report.added,
        report.removed,
        report.kept,
        report.duplicates_dropped,
        report.rejected_rows.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_agent::{ContextAssembler, Invoker};
    use sk_channels::{ChannelStatus, OutboundMessage, Serialiser};
    use sk_core::config::AgentConfig;
    use sk_scheduler::QuietHours;
    use std::sync::RwLock;

    struct NullChannel;

    #[async_trait::async_trait]
    impl sk_channels::Channel for NullChannel {
        fn name(&self) -> &str {
            "null"
        }
        async fn connect(&self) -> sk_channels::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> sk_channels::Result<()> {
            Ok(())
        }
        async fn send(&self, _msg: &OutboundMessage) -> sk_channels::Result<()> {
            Ok(())
        }
        fn status(&self) -> ChannelStatus {
            ChannelStatus::Connected
        }
    }

    struct NullExecutor;

    #[async_trait::async_trait]
    impl sk_scheduler::JobExecutor for NullExecutor {
        async fn execute(&self, _job: &sk_scheduler::ScheduledJob) -> std::result::Result<String, String> {
            Ok("ok".to_string())
        }
    }

    fn make_core() -> Arc<Core> {
        Arc::new(Core {
            serialiser: Arc::new(Serialiser::new()),
            assembler: Arc::new(ContextAssembler::new(None, None)),
            invoker: Arc::new(Invoker::new(&AgentConfig::default())),
            skills: RwLock::new(Arc::new(SkillRegistry::new(Vec::new()))),
            channel: Arc::new(NullChannel),
            model: "test-model".to_string(),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn status_reports_bound_jobs_and_skill_count() {
        let core = make_core();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let scheduler = Arc::new(sk_scheduler::SchedulerEngine::new(conn, Arc::new(NullExecutor), QuietHours::default()).unwrap());
        let payloads = dispatch("/status", "c1", &core, &scheduler, "/nonexistent", "/nonexistent")
            .await
            .expect("status is a known command");
        match &payloads[0] {
            Payload::Text(t) => {
                assert!(t.contains("bound jobs: 0"));
                assert!(t.contains("loaded skills: 0"));
            }
            other => panic!("expected text payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_skill_command_reports_not_found() {
        let core = make_core();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let scheduler = Arc::new(sk_scheduler::SchedulerEngine::new(conn, Arc::new(NullExecutor), QuietHours::default()).unwrap());
        let payloads = dispatch("/skill nosuchskill", "c1", &core, &scheduler, "/nonexistent", "/nonexistent")
            .await
            .expect("skill command recognised");
        match &payloads[0] {
            Payload::Text(t) => assert!(t.contains("No such skill")),
            other => panic!("expected text payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_command_text_is_not_dispatched() {
        let core = make_core();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let scheduler = Arc::new(sk_scheduler::SchedulerEngine::new(conn, Arc::new(NullExecutor), QuietHours::default()).unwrap());
        assert!(dispatch("how's the weather", "c1", &core, &scheduler, "/nonexistent", "/nonexistent")
            .await
            .is_none());
    }
}
