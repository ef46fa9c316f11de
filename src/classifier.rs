// File classifier: maps a path to a file-type tag used for registry
// grouping and downstream weighting. Metadata only; never gates detection.
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    ClaudeMd,
    CommandFile,
    ToolDocumentation,
    ProjectDocumentation,
    Instruction,
}

impl FileType {
    pub fn name(&self) -> &'static str {
        match self {
            FileType::ClaudeMd => "claude_md",
            FileType::CommandFile => "command_file",
            FileType::ToolDocumentation => "tool_documentation",
            FileType::ProjectDocumentation => "project_documentation",
            FileType::Instruction => "instruction",
        }
    }
}

/// Classify a file path. Rules are evaluated in priority order; the first
/// match wins.
pub fn classify(path: &Path) -> FileType {
    let lower = path.to_string_lossy().to_lowercase();

    if lower.ends_with("claude.md") {
        FileType::ClaudeMd
    } else if lower.contains("/.claude/commands/") {
        FileType::CommandFile
    } else if lower.contains("/knowledge-vault/knowledge/") || lower.contains("/tools/") {
        FileType::ToolDocumentation
    } else if lower.contains("/docs/") || lower.ends_with("readme.md") {
        FileType::ProjectDocumentation
    } else {
        FileType::Instruction
    }
}
