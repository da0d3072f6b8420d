//! Persona prompts bundled at compile time.

/// Researcher - gathers facts and sources
pub const RESEARCHER: &str = include_str!("defaults/researcher.md");

/// Coder - writes and explains code
pub const CODER: &str = include_str!("defaults/coder.md");

/// Critic - finds weaknesses and risks
pub const CRITIC: &str = include_str!("defaults/critic.md");

/// Writer - turns material into clear prose
pub const WRITER: &str = include_str!("defaults/writer.md");

/// Analyst - weighs data and trade-offs
pub const ANALYST: &str = include_str!("defaults/analyst.md");

/// Planner - breaks goals into steps and delegates
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// All bundled prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("researcher", RESEARCHER),
        ("coder", CODER),
        ("critic", CRITIC),
        ("writer", WRITER),
        ("analyst", ANALYST),
        ("planner", PLANNER),
    ]
}
