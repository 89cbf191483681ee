//! `sk-agent` — C1 Agent Invoker and C4 Context Assembler.

pub mod assembler;
pub mod error;
pub mod invoker;
pub mod memory;
pub mod types;

pub use assembler::{AssembleInput, ContextAssembler, SkillBlock};
pub use error::{AgentError, Result};
pub use invoker::Invoker;
pub use memory::{HttpKnowledgeClient, HttpMemoryClient, KnowledgeSource, MemorySource};
pub use types::{AgentInvocation, FinalStatus, InterimNotifier, InvokeRequest};
