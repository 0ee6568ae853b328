//! Command-line argument parsing.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use toolrelay_core::ActionType;

pub const USAGE: &str = "\
Usage:
  toolrelay list
  toolrelay run <tool-id> [--test] [--payload <json>] [--stream] [--timeout-ms <n>]

Environment:
  TOOLRELAY_CONFIG           catalog path (default: toolrelay.yaml)
  TOOLRELAY_SECRET_<ID>      secret for credential <id>
  RUST_LOG                   log filter (default: info)";

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub tool_id: String,
    pub action: ActionType,
    pub payload: Option<Value>,
    pub stream: bool,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Run(RunOptions),
    Help,
}

/// Parse arguments, excluding the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "list" => Ok(Command::List),
        "help" | "--help" | "-h" => Ok(Command::Help),
        "run" => parse_run(&args[1..]).map(Command::Run),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn parse_run(args: &[String]) -> Result<RunOptions> {
    let mut iter = args.iter();
    let tool_id = iter
        .next()
        .filter(|id| !id.starts_with("--"))
        .ok_or_else(|| anyhow!("run requires a tool id\n\n{}", USAGE))?
        .clone();

    let mut options = RunOptions {
        tool_id,
        action: ActionType::Run,
        payload: None,
        stream: false,
        timeout_ms: None,
    };

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--test" => options.action = ActionType::Test,
            "--stream" => options.stream = true,
            "--payload" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--payload requires a value"))?;
                // Anything that is not JSON is sent as a plain string.
                options.payload = Some(
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
                );
            }
            "--timeout-ms" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--timeout-ms requires a value"))?;
                let ms = raw
                    .parse::<u64>()
                    .with_context(|| format!("Invalid --timeout-ms: {}", raw))?;
                options.timeout_ms = Some(ms);
            }
            other => bail!("Unknown option: {}", other),
        }
    }

    Ok(options)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_args_prints_help() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn test_run_with_flags() {
        let command = parse_args(&args(&[
            "run", "weather", "--stream", "--payload", r#"{"city":"Oslo"}"#, "--timeout-ms", "1500",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Run(RunOptions {
                tool_id: "weather".into(),
                action: ActionType::Run,
                payload: Some(json!({"city": "Oslo"})),
                stream: true,
                timeout_ms: Some(1500),
            })
        );
    }

    #[test]
    fn test_plain_text_payload() {
        let Command::Run(options) = parse_args(&args(&["run", "chat", "--payload", "hello"])).unwrap() else {
            panic!("expected run");
        };
        assert_eq!(options.payload, Some(json!("hello")));
    }

    #[test]
    fn test_test_action() {
        let Command::Run(options) = parse_args(&args(&["run", "chat", "--test"])).unwrap() else {
            panic!("expected run");
        };
        assert_eq!(options.action, ActionType::Test);
    }

    #[test]
    fn test_errors() {
        assert!(parse_args(&args(&["run"])).is_err());
        assert!(parse_args(&args(&["run", "--stream"])).is_err());
        assert!(parse_args(&args(&["run", "t", "--timeout-ms", "soon"])).is_err());
        assert!(parse_args(&args(&["run", "t", "--verbose"])).is_err());
        assert!(parse_args(&args(&["deploy"])).is_err());
    }
}
