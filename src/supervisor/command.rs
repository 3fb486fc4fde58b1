use super::runner::BuildInvocation;
use crate::constants::DEFAULT_BUILD_COMMAND;
use crate::error::{BuildcastError, Result};
use std::path::PathBuf;

/// Turns a client-supplied Gradle task list into a shell invocation
#[derive(Debug, Clone)]
pub struct CommandResolver {
    pub project_dir: PathBuf,
    pub gradle_wrapper: String,
    /// Script that builds every module; used for `build` and `clean build`
    pub build_all_script: Option<String>,
    pub java_home: Option<String>,
}

impl CommandResolver {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            gradle_wrapper: "./gradlew".to_string(),
            build_all_script: None,
            java_home: None,
        }
    }

    /// Collapse whitespace and reject anything that is not a Gradle task token.
    /// An empty command becomes the default full build.
    pub fn normalize(command: Option<&str>) -> Result<String> {
        let raw = command.unwrap_or("").trim();
        if raw.is_empty() {
            return Ok(DEFAULT_BUILD_COMMAND.to_string());
        }
        let mut tokens = Vec::new();
        for token in raw.split_whitespace() {
            if let Some(bad) = token.chars().find(|c| !is_task_char(*c)) {
                return Err(BuildcastError::InvalidCommand {
                    command: raw.to_string(),
                    reason: format!("unexpected character {:?} in {:?}", bad, token),
                });
            }
            tokens.push(token);
        }
        Ok(tokens.join(" "))
    }

    pub fn resolve(&self, normalized: &str) -> BuildInvocation {
        let uses_script = matches!(normalized, "clean build" | "build");
        let command_line = match (&self.build_all_script, uses_script) {
            (Some(script), true) => script.clone(),
            _ => format!("{} {} --console=plain", self.gradle_wrapper, normalized),
        };

        let mut env = Vec::new();
        if let Some(java_home) = &self.java_home {
            env.push(("JAVA_HOME".to_string(), java_home.clone()));
        }

        BuildInvocation {
            command_line,
            working_dir: Some(self.project_dir.clone()),
            env,
        }
    }
}

fn is_task_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '=' | '-')
}
