//! Command dispatch.
//!
//! Maps each parsed subcommand to the matching engine operation and
//! renders its output in the requested format.

use crate::cli::output::{OutputFormat, format_output};
use crate::cli::parser::{Cli, Commands};
use crate::core::SourceKind;
use crate::error::{CommandError, Result};
use crate::ops::{Engine, GuardrailKind};
use crate::rank::Filters;
use std::io::Read;

fn filters_from(
    source: Option<&str>,
    tag: Option<String>,
    file: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<Filters> {
    let source = match source {
        Some(name) => Some(SourceKind::parse(name).ok_or_else(|| {
            CommandError::InvalidArgument(format!("unknown source kind: {name}"))
        })?),
        None => None,
    };
    Ok(Filters {
        source,
        tag,
        file,
        date_from: from,
        date_to: to,
    })
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .map_err(|e| CommandError::ExecutionFailed(format!("reading stdin: {e}")))?;
    Ok(content)
}

/// Executes a parsed CLI invocation.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let engine = Engine::open(cli.workspace_root())?;

    let output = match &cli.command {
        Commands::Init => {
            engine.paths().ensure_layout()?;
            format!(
                "initialized {} (workspace {})",
                engine.paths().rl4_dir().display(),
                engine.paths().workspace_id(),
            )
        }
        Commands::Evidence => engine.get_evidence()?,
        Commands::Timeline { from, to } => {
            engine.get_timeline(from.as_deref(), to.as_deref())?
        }
        Commands::IntentGraph => engine.get_intent_graph()?,
        Commands::Search {
            query,
            source,
            tag,
            file,
            from,
            to,
            limit,
        } => {
            let filters = filters_from(
                source.as_deref(),
                tag.clone(),
                file.clone(),
                from.clone(),
                to.clone(),
            )?;
            engine.search_context(query, &filters, *limit)?
        }
        Commands::SearchChats { query, limit } => engine.search_chats(query, *limit)?,
        Commands::SearchCli { query, limit } => engine.search_cli(query, *limit)?,
        Commands::Ask {
            query,
            source,
            tag,
            file,
            from,
            to,
            limit,
        } => {
            let filters = filters_from(
                source.as_deref(),
                tag.clone(),
                file.clone(),
                from.clone(),
                to.clone(),
            )?;
            engine.ask(query, &filters, *limit)?
        }
        Commands::SuggestEdit { file, intent } => {
            engine.suggest_edit(file, intent.as_deref())?
        }
        Commands::ApplyEdit {
            file,
            content,
            description,
        } => {
            let content = match content {
                Some(content) => content.clone(),
                None => read_stdin()?,
            };
            engine.apply_edit(file, &content, description)?
        }
        Commands::ResolveOutcomes => {
            let resolved = engine.resolve_outcomes()?;
            format!("{resolved} intervention(s) resolved")
        }
        Commands::Run {
            command,
            args,
            timeout_ms,
        } => {
            let (code, stdout, stderr) = engine.run_command(command, args, *timeout_ms)?;
            let mut out = format!("exit {code}\n");
            if !stdout.is_empty() {
                out.push_str(&stdout);
            }
            if !stderr.is_empty() {
                out.push_str("--- stderr ---\n");
                out.push_str(&stderr);
            }
            out
        }
        Commands::Workspaces => engine.list_workspaces()?,
        Commands::UseWorkspace { id } => engine.set_workspace(id)?,
        Commands::Snapshot => engine.run_snapshot()?,
        Commands::FinalizeSnapshot => engine.finalize_snapshot()?,
        Commands::Guardrail { text, kind, file } => {
            let kind = match kind.to_lowercase().as_str() {
                "query" => GuardrailKind::Query,
                "response" => GuardrailKind::Response,
                other => {
                    return Err(CommandError::InvalidArgument(format!(
                        "unknown guardrail kind: {other}"
                    ))
                    .into());
                }
            };
            let verdict = engine.guardrail(text, kind, file.as_deref());
            serde_json::to_string_pretty(&verdict)
                .map_err(|e| CommandError::OutputFormat(e.to_string()))?
        }
        Commands::Dashboards => engine.rebuild_dashboards()?,
    };

    Ok(format_output(&output, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn run(workspace: &std::path::Path, args: &[&str]) -> Result<String> {
        let ws = workspace.to_string_lossy().to_string();
        let mut full = vec!["rl4-rs", "--workspace", ws.as_str()];
        full.extend(args);
        let cli = Cli::parse_from(full.iter().copied());
        execute(&cli)
    }

    #[test]
    fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let output = run(tmp.path(), &["init"]).unwrap();
        assert!(output.contains("initialized"));
        assert!(tmp.path().join(".rl4/evidence").is_dir());
    }

    #[test]
    fn test_evidence_command() {
        let tmp = TempDir::new().unwrap();
        let output = run(tmp.path(), &["evidence"]).unwrap();
        assert!(output.contains("ACTIVITY OVERVIEW"));
    }

    #[test]
    fn test_search_rejects_unknown_source() {
        let tmp = TempDir::new().unwrap();
        let err = run(tmp.path(), &["search", "q", "--source", "bogus"]).unwrap_err();
        assert!(err.to_string().contains("unknown source kind"));
    }

    #[test]
    fn test_guardrail_command_json_verdict() {
        let tmp = TempDir::new().unwrap();
        let output = run(tmp.path(), &["guardrail", "", "--kind", "query"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["allowed"], false);
    }

    #[test]
    fn test_guardrail_rejects_unknown_kind() {
        let tmp = TempDir::new().unwrap();
        let err = run(tmp.path(), &["guardrail", "x", "--kind", "bogus"]).unwrap_err();
        assert!(err.to_string().contains("unknown guardrail kind"));
    }

    #[test]
    fn test_json_format_wraps_output() {
        let tmp = TempDir::new().unwrap();
        let output = run(tmp.path(), &["--format", "json", "dashboards"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_apply_edit_with_inline_content() {
        let tmp = TempDir::new().unwrap();
        let output = run(
            tmp.path(),
            &["apply-edit", "notes.md", "--content", "hello\n", "-d", "new note"],
        )
        .unwrap();
        assert!(output.contains("applied: notes.md"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("notes.md")).unwrap(),
            "hello\n"
        );
    }
}
