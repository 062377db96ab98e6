//! Commands round-tripped through the client.
//!
//! Code actions are returned as commands; when the user picks one the client
//! sends it back through `workspace/executeCommand` with the arguments we
//! attached. This module owns both ends of that wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_lsp::lsp_types::ExecuteCommandParams;

use tsbridge_lsp_core::NormalizedPath;
use tsbridge_lsp_core::model::{FileTextChanges, PositionOrRange};

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    CodeFix,
    Refactor,
}

impl CommandName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeFix => "codeFix",
            Self::Refactor => "refactor",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "codeFix" => Some(Self::CodeFix),
            "refactor" => Some(Self::Refactor),
            _ => None,
        }
    }
}

/// Argument of a `refactor` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorCommand {
    pub file_name: NormalizedPath,
    pub position_or_range: PositionOrRange,
    pub refactor_name: String,
    pub action_name: String,
}

/// A `codeFix` argument: one file's changes, or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum CodeFixArgument {
    One(FileTextChanges),
    Many(Vec<FileTextChanges>),
}

/// A decoded `workspace/executeCommand` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteCommand {
    CodeFix(Vec<FileTextChanges>),
    Refactor(RefactorCommand),
}

impl ExecuteCommand {
    pub fn parse(params: ExecuteCommandParams) -> SessionResult<Self> {
        let ExecuteCommandParams {
            command, arguments, ..
        } = params;

        let name =
            CommandName::parse(&command).ok_or_else(|| SessionError::UnknownCommand(command.clone()))?;
        if arguments.is_empty() {
            return Err(SessionError::MissingArguments(command));
        }

        match name {
            CommandName::CodeFix => {
                let mut changes = Vec::new();
                for argument in arguments {
                    match decode::<CodeFixArgument>(&command, argument)? {
                        CodeFixArgument::One(change) => changes.push(change),
                        CodeFixArgument::Many(many) => changes.extend(many),
                    }
                }
                if changes.is_empty() {
                    return Err(SessionError::NoChanges);
                }
                Ok(Self::CodeFix(changes))
            }
            CommandName::Refactor => {
                if arguments.len() != 1 {
                    return Err(SessionError::TooManyRefactors);
                }
                let mut arguments = arguments;
                let argument = arguments.remove(0);
                Ok(Self::Refactor(decode(&command, argument)?))
            }
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(command: &str, argument: Value) -> SessionResult<T> {
    serde_json::from_value(argument).map_err(|source| SessionError::InvalidArguments {
        command: command.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(command: &str, arguments: Vec<Value>) -> ExecuteCommandParams {
        ExecuteCommandParams {
            command: command.to_string(),
            arguments,
            work_done_progress_params: Default::default(),
        }
    }

    fn change_json() -> Value {
        json!({
            "fileName": "/src/a.ts",
            "textChanges": [{ "span": { "start": 0, "length": 3 }, "newText": "const" }]
        })
    }

    #[test]
    fn test_unknown_command() {
        let err = ExecuteCommand::parse(params("organizeImports", vec![json!(1)])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command organizeImports");
    }

    #[test]
    fn test_missing_arguments() {
        let err = ExecuteCommand::parse(params("refactor", Vec::new())).unwrap_err();
        assert_eq!(err.to_string(), "Command refactor requires arguments");
    }

    #[test]
    fn test_code_fix_arguments() {
        let command = ExecuteCommand::parse(params("codeFix", vec![change_json(), change_json()])).unwrap();
        let ExecuteCommand::CodeFix(changes) = command else {
            panic!("expected a code fix");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].text_changes[0].new_text, "const");
    }

    #[test]
    fn test_code_fix_without_changes() {
        let err = ExecuteCommand::parse(params("codeFix", vec![json!([])])).unwrap_err();
        assert_eq!(err.to_string(), "No changes supplied for code fix command");
    }

    #[test]
    fn test_only_one_refactor() {
        let argument = json!({
            "fileName": "/src/a.ts",
            "positionOrRange": 4,
            "refactorName": "Convert",
            "actionName": "convert"
        });
        let err = ExecuteCommand::parse(params("refactor", vec![argument.clone(), argument.clone()]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Only 1 refactor can be supplied with a command");

        let command = ExecuteCommand::parse(params("refactor", vec![argument])).unwrap();
        assert_eq!(
            command,
            ExecuteCommand::Refactor(RefactorCommand {
                file_name: NormalizedPath::new("/src/a.ts"),
                position_or_range: PositionOrRange::Position(4),
                refactor_name: "Convert".to_string(),
                action_name: "convert".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_argument() {
        let err = ExecuteCommand::parse(params("refactor", vec![json!("nope")])).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArguments { .. }));
    }
}
