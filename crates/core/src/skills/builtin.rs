use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{ExecutionContext, Skill, SkillDescriptor, SkillOutcome};

/// Reports the current UTC time
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimeSkill;

#[async_trait]
impl Skill for CurrentTimeSkill {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor {
            id: "current_time".to_string(),
            description: "Get the current date and time in UTC (RFC 3339)".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _args: Value, _context: &ExecutionContext) -> Result<SkillOutcome> {
        let now = Utc::now();
        Ok(SkillOutcome::ok(now.to_rfc3339()).with_data(json!({ "unix": now.timestamp() })))
    }
}
