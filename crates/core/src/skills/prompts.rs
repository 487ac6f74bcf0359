//! Default role prompts bundled at compile time.

/// Interviewer - elicits stakeholder needs
pub const INTERVIEWER: &str = include_str!("defaults/interviewer.md");

/// End user - simulated stakeholder
pub const ENDUSER: &str = include_str!("defaults/enduser.md");

/// Deployment interviewer - criteria-checklist interview
pub const DEPLOYER_INTERVIEWER: &str = include_str!("defaults/deployer_interviewer.md");

/// Deployer - operations stakeholder
pub const DEPLOYER: &str = include_str!("defaults/deployer.md");

/// Analyst - system requirements and requirement model
pub const ANALYST: &str = include_str!("defaults/analyst.md");

/// Archivist - assembles the SRS
pub const ARCHIVIST: &str = include_str!("defaults/archivist.md");

/// Reviewer - quality review of the SRS
pub const REVIEWER: &str = include_str!("defaults/reviewer.md");

/// All default prompts with their role slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("interviewer", INTERVIEWER),
        ("end_user", ENDUSER),
        ("deployer_interviewer", DEPLOYER_INTERVIEWER),
        ("deployer", DEPLOYER),
        ("analyst", ANALYST),
        ("archivist", ARCHIVIST),
        ("reviewer", REVIEWER),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::pipeline::AgentRole;

    #[test]
    fn test_all_prompts_non_empty() {
        for (slug, content) in all_defaults() {
            assert!(content.len() > 50, "Prompt '{}' seems too short", slug);
        }
    }

    #[test]
    fn test_one_prompt_per_role() {
        let slugs: Vec<&str> = all_defaults().into_iter().map(|(slug, _)| slug).collect();
        for role in AgentRole::all() {
            assert!(slugs.contains(&role.as_str()), "missing prompt for {}", role);
        }
    }
}
