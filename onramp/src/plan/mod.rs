//! Plan synthesis: prompt assembly and lenient response parsing
//!
//! Both halves share the `Step N: Title` header convention.

pub mod parser;
pub mod prompt;

pub use parser::{parse_plan, ContributionStep, ParsedPlan, FALLBACK_TITLE, STEP_HEADER_WORD};
pub use prompt::{assemble_plan_prompt, render_tree};
