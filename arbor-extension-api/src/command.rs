//! CLI command types for extension registration

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ExtensionError;

/// Specification for a CLI command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command name, e.g. "report" -> `<host> <extension> report`
    pub name: String,
    /// Short description for help text
    pub description: String,
    /// Argument specifications
    pub args: Vec<ArgSpec>,
}

impl CommandSpec {
    /// Create a command spec with no arguments
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
        }
    }
}

/// Specification for a command argument
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Argument name
    pub name: String,
    /// Description for help text
    pub description: String,
    /// Whether this argument is required
    pub required: bool,
}

/// Arguments passed to a command handler
#[derive(Debug, Default)]
pub struct CommandArgs {
    /// Positional arguments
    pub args: Vec<String>,
    /// Named flags (--flag=value or --flag value)
    pub flags: HashMap<String, String>,
}

/// Output from a command handler
#[derive(Debug)]
pub enum CommandOutput {
    /// Plain text output (printed as-is)
    Text(String),
    /// Structured data (can be formatted as table, JSON, etc.)
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Success with no output
    Success,
    /// Exit with specific code
    Exit(i32),
}

/// Boxed future returned by command handlers
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<CommandOutput, ExtensionError>> + Send>>;

/// Async handler invoked when a registered command runs
pub type CommandHandler = Arc<dyn Fn(CommandArgs) -> CommandFuture + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`]
pub fn command_fn<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CommandOutput, ExtensionError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// A command spec together with its handler
#[derive(Clone)]
pub struct CommandRegistration {
    /// Name, description, and argument specs
    pub spec: CommandSpec,
    /// Handler invoked on dispatch
    pub handler: CommandHandler,
}

impl std::fmt::Debug for CommandRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistration")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_new() {
        let spec = CommandSpec::new("report", "Show the analytics report");
        assert_eq!(spec.name, "report");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_arg_spec_required() {
        let arg = ArgSpec {
            name: "window".into(),
            description: "Time window in minutes".into(),
            required: true,
        };
        assert!(arg.required);
    }

    #[test]
    fn test_command_args() {
        let mut args = CommandArgs::default();
        args.args.push("arg1".to_string());
        args.flags.insert("verbose".to_string(), "true".to_string());

        assert_eq!(args.args.len(), 1);
        assert_eq!(args.flags.get("verbose"), Some(&"true".to_string()));
    }

    #[test]
    fn test_command_output_table() {
        let output = CommandOutput::Table {
            headers: vec!["Name".into(), "Value".into()],
            rows: vec![vec!["foo".into(), "bar".into()]],
        };
        match output {
            CommandOutput::Table { headers, rows } => {
                assert_eq!(headers.len(), 2);
                assert_eq!(rows.len(), 1);
            }
            _ => panic!("Expected Table variant"),
        }
    }

    #[tokio::test]
    async fn test_command_fn_invokes_handler() {
        let handler = command_fn(|args: CommandArgs| async move {
            Ok(CommandOutput::Text(format!("{} args", args.args.len())))
        });

        let output = handler(CommandArgs::default()).await.unwrap();
        match output {
            CommandOutput::Text(s) => assert_eq!(s, "0 args"),
            _ => panic!("Expected Text variant"),
        }
    }
}
