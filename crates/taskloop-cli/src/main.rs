//! taskloop command line
//!
//! Runs one task described as JSON against a local Ollama instance and
//! prints the run result as JSON on stdout. Logs go to stderr.
//!
//! ```text
//! taskloop task.json
//! echo '{"prompt": "What is 17 * 23?", "tools": ["calculate"]}' | taskloop -
//! taskloop --prompt "Hello" --pretty
//! ```

mod tools;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskloop_core::{EngineConfig, LlmProvider, TaskSpec};
use taskloop_runtime::OllamaProvider;

use crate::tools::{BUILTIN_TOOLS, builtin_registry};

#[derive(Debug, Parser)]
#[command(name = "taskloop", version, about = "Run an LLM task or agent loop")]
struct Args {
    /// Task description as JSON (`-` reads stdin)
    task: Option<PathBuf>,

    /// Prompt to use instead of (or on top of) the task file's
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model name (overrides TASKLOOP_MODEL and OLLAMA_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Run as an agent with this goal
    #[arg(short, long)]
    goal: Option<String>,

    /// Turn budget for agent runs
    #[arg(long)]
    max_turns: Option<usize>,

    /// Built-in tool to attach (repeatable)
    #[arg(short, long = "tool")]
    tools: Vec<String>,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,

    /// List built-in tools and exit
    #[arg(long)]
    list_tools: bool,
}

impl Args {
    /// Load the task file (if any) and apply command-line overrides
    fn task_spec(&self) -> anyhow::Result<TaskSpec> {
        let mut spec = match &self.task {
            Some(path) => {
                let text = read_source(path)?;
                serde_json::from_str::<TaskSpec>(&text)
                    .with_context(|| format!("invalid task description in {}", path.display()))?
            }
            None => TaskSpec::default(),
        };

        if let Some(prompt) = &self.prompt {
            spec.prompt = Some(prompt.clone());
        }
        if let Some(model) = &self.model {
            spec.model = Some(model.clone());
        }
        if let Some(goal) = &self.goal {
            spec.goal = Some(goal.clone());
        }
        if let Some(max_turns) = self.max_turns {
            spec.max_turns = Some(max_turns);
        }
        spec.tools.extend(self.tools.iter().cloned());

        if spec.prompt.is_none() && spec.messages.is_empty() {
            anyhow::bail!("nothing to run: give a task file or --prompt");
        }
        Ok(spec)
    }
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read task from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,reqwest=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.list_tools {
        for name in BUILTIN_TOOLS {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = EngineConfig::from_env()?;
    let spec = args.task_spec()?;
    let registry = builtin_registry(&spec.tools)?;
    if !registry.is_empty() {
        tracing::info!("Registered {} tools: {}", registry.len(), registry.names().join(", "));
    }

    let provider = OllamaProvider::from_env();
    if !provider.health_check().await? {
        tracing::warn!("⚠ Ollama not available - the run will fail");
        tracing::warn!("  Make sure Ollama is running: ollama serve");
    }

    let task = spec.into_task(config).tools_from(registry);
    let result = match task.run(&provider).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "Run failed");
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_only_invocation() {
        let args = Args::try_parse_from([
            "taskloop", "--prompt", "What is 2 + 2?", "-t", "calculate", "--max-turns", "3",
        ])
        .unwrap();
        let spec = args.task_spec().unwrap();
        assert_eq!(spec.prompt.as_deref(), Some("What is 2 + 2?"));
        assert_eq!(spec.tools, vec!["calculate"]);
        assert_eq!(spec.max_turns, Some(3));
    }

    #[test]
    fn test_task_file_with_overrides() {
        let path = std::env::temp_dir().join(format!("taskloop-cli-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"prompt": "Summarise", "schema": ["title"], "tools": ["datetime"]}"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "taskloop".into(),
            path.display().to_string(),
            "--model".into(),
            "mistral".into(),
            "--tool".into(),
            "calculate".into(),
        ])
        .unwrap();
        let spec = args.task_spec().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(spec.prompt.as_deref(), Some("Summarise"));
        assert_eq!(spec.model.as_deref(), Some("mistral"));
        assert_eq!(spec.tools, vec!["datetime", "calculate"]);
        assert!(spec.schema.is_some());
    }

    #[test]
    fn test_nothing_to_run() {
        let args = Args::try_parse_from(["taskloop"]).unwrap();
        assert!(args.task_spec().is_err());
    }
}
