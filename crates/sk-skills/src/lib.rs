//! `sk-skills` — C7 Skill Registry: trigger resolution and data fetchers.

pub mod document;
pub mod error;
pub mod registry;
pub mod types;

pub use document::{load_from_dirs, parse_skill_md};
pub use error::{Result, SkillError};
pub use registry::{DataFetcher, SkillRegistry};
pub use types::{Skill, SkillFrontmatter};
