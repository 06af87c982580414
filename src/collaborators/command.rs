/*!
 * External Command Collaborators
 *
 * Lookups delegated to user-configured programs. Arguments may contain
 * `{protein}` and `{variant}`; the program answers on stdout.
 */

use super::{
    ClinicalRecord, ClinicalSource, CollabError, CollabResult, LiteratureSource, Paper,
    SequenceLookup,
};
use crate::config::CommandSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs one configured command and returns its stdout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    name: String,
    spec: CommandSpec,
}

impl CommandRunner {
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments with placeholders substituted
    pub fn render_args(&self, protein: &str, variant: Option<&str>) -> Vec<String> {
        self.spec
            .args
            .iter()
            .map(|arg| {
                arg.replace("{protein}", protein)
                    .replace("{variant}", variant.unwrap_or(""))
            })
            .collect()
    }

    pub async fn run(&self, protein: &str, variant: Option<&str>) -> CollabResult<String> {
        let args = self.render_args(protein, variant);
        debug!(collaborator = %self.name, command = %self.spec.command, ?args, "Running collaborator");

        // Dropping the future on a stage timeout kills the child.
        let output = Command::new(&self.spec.command)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CollabError::Unavailable {
                collaborator: self.name.clone(),
                reason: format!("{}: {}", self.spec.command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(CollabError::failed(
                self.name.clone(),
                format!("exited with {}: {}", output.status, detail),
            ));
        }
        String::from_utf8(output.stdout).map_err(|e| CollabError::invalid(self.name.clone(), e))
    }

    async fn run_json(&self, protein: &str, variant: Option<&str>) -> CollabResult<Value> {
        let stdout = self.run(protein, variant).await?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed).map_err(|e| CollabError::invalid(self.name.clone(), e))
    }
}

/// Prints FASTA for a protein identifier
pub struct CommandSequenceLookup {
    runner: CommandRunner,
}

impl CommandSequenceLookup {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            runner: CommandRunner::new("sequence lookup", spec),
        }
    }
}

#[async_trait]
impl SequenceLookup for CommandSequenceLookup {
    async fn fetch_fasta(&self, protein: &str) -> CollabResult<String> {
        let fasta = self.runner.run(protein, None).await?;
        if !fasta.trim_start().starts_with('>') {
            return Err(CollabError::invalid(
                self.runner.name(),
                "output is not FASTA (no '>' header)",
            ));
        }
        Ok(fasta)
    }
}

/// Prints a JSON object (or `null` for "no entry")
pub struct CommandClinicalSource {
    runner: CommandRunner,
}

impl CommandClinicalSource {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            runner: CommandRunner::new("clinical lookup", spec),
        }
    }
}

#[async_trait]
impl ClinicalSource for CommandClinicalSource {
    async fn lookup(&self, protein: &str, variant: &str) -> CollabResult<Option<ClinicalRecord>> {
        match self.runner.run_json(protein, Some(variant)).await? {
            Value::Null => Ok(None),
            value @ Value::Object(_) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CollabError::invalid(self.runner.name(), e)),
            _ => Err(CollabError::invalid(
                self.runner.name(),
                "expected a JSON object",
            )),
        }
    }
}

/// Prints a JSON array of papers, or `{"papers": [...]}`
pub struct CommandLiterature {
    runner: CommandRunner,
    max_papers: usize,
}

impl CommandLiterature {
    pub fn new(spec: CommandSpec, max_papers: usize) -> Self {
        Self {
            runner: CommandRunner::new("literature search", spec),
            max_papers,
        }
    }
}

#[async_trait]
impl LiteratureSource for CommandLiterature {
    async fn search(&self, protein: &str, variant: Option<&str>) -> CollabResult<Vec<Paper>> {
        let value = match self.runner.run_json(protein, variant).await? {
            Value::Null => return Ok(Vec::new()),
            Value::Object(mut map) => map.remove("papers").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        let mut papers: Vec<Paper> = serde_json::from_value(value)
            .map_err(|e| CollabError::invalid(self.runner.name(), e))?;
        papers.truncate(self.max_papers);
        Ok(papers)
    }
}
