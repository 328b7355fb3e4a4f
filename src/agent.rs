//! Agent definitions (§4.6 step 1, §GLOSSARY "Agent — a markdown file
//! describing an AI agent's role/instructions"). An agent file is markdown
//! with an optional YAML front matter block (`---\n...\n---`) followed by
//! the system prompt body, the same `---`-delimited shape the teacher's own
//! docs and pipeline templates use for metadata-plus-body files.

use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Optional metadata an agent file may declare in its front matter. Unknown
/// keys are preserved in `extra` rather than rejected, so agent authors can
/// add fields the engine doesn't interpret without breaking parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentFrontMatter {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A loaded, parsed agent definition (§4.6 step 1).
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub front_matter: AgentFrontMatter,
    pub system_prompt: String,
}

/// Resolve `agent` (as declared on an `AgentStage`) against the worktree
/// root, the same way the teacher resolves user-supplied paths in its own
/// CLI argument handling.
pub fn resolve_agent_path(worktree: &Path, agent: &Path) -> PathBuf {
    agent
        .absolutize_from(worktree)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| worktree.join(agent))
}

/// Read and parse an agent definition file at `path`.
pub async fn load_agent_definition(path: &Path) -> Result<AgentDefinition, ConfigError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_agent_definition(&content).map_err(|message| ConfigError::InvalidAgentDefinition {
        path: path.display().to_string(),
        message,
    })
}

/// Split `content` into an optional YAML front matter block and the
/// remaining markdown body, which becomes the stage's system prompt.
pub fn parse_agent_definition(content: &str) -> Result<AgentDefinition, String> {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("---") {
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        let end = rest
            .find("\n---")
            .ok_or_else(|| "unterminated front matter block".to_string())?;
        let (yaml, remainder) = rest.split_at(end);
        let body = remainder
            .strip_prefix("\n---")
            .unwrap_or(remainder)
            .trim_start_matches(['\n', '\r'])
            .to_string();
        let front_matter: AgentFrontMatter =
            serde_yaml::from_str(yaml).map_err(|e| format!("invalid front matter: {e}"))?;
        Ok(AgentDefinition {
            front_matter,
            system_prompt: body,
        })
    } else {
        Ok(AgentDefinition {
            front_matter: AgentFrontMatter::default(),
            system_prompt: content.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_front_matter_and_body() {
        let content = "---\nname: planner\ndescription: plans the change\n---\nYou are a planner.\n";
        let def = parse_agent_definition(content).unwrap();
        assert_eq!(def.front_matter.name.as_deref(), Some("planner"));
        assert_eq!(def.front_matter.description.as_deref(), Some("plans the change"));
        assert_eq!(def.system_prompt.trim(), "You are a planner.");
    }

    #[test]
    fn body_only_file_has_no_front_matter() {
        let def = parse_agent_definition("Just do the thing.\n").unwrap();
        assert!(def.front_matter.name.is_none());
        assert_eq!(def.system_prompt.trim(), "Just do the thing.");
    }

    #[test]
    fn unterminated_front_matter_is_an_error() {
        let err = parse_agent_definition("---\nname: x\nno closing fence").unwrap_err();
        assert!(err.contains("unterminated"));
    }

    #[test]
    fn resolve_agent_path_joins_relative_paths_under_worktree() {
        let worktree = Path::new("/repo/.agent-pipeline/worktrees/demo-abc12345");
        let resolved = resolve_agent_path(worktree, Path::new("agents/plan.md"));
        assert_eq!(
            resolved,
            PathBuf::from("/repo/.agent-pipeline/worktrees/demo-abc12345/agents/plan.md")
        );
    }
}
