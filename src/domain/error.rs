//! Domain error types.

use crate::domain::value::SlotType;

/// A parse error with position information for binding and precondition text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for stratforge.
#[derive(Debug, thiserror::Error)]
pub enum StratforgeError {
    #[error("{operation} (position {position}): invalid pipe reference to ${target}: {reason}")]
    InvalidPipeReference {
        operation: String,
        position: usize,
        target: usize,
        reason: String,
    },

    #[error("{operation}: sub-slot '{name}' is not declared by the strategy")]
    UndeclaredSubSlot { operation: String, name: String },

    #[error("type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: SlotType,
        found: SlotType,
    },

    #[error("missing value for sub-slot '{name}'")]
    MissingSubSlotValue { name: String },

    #[error("{operation}: missing value for variable '%{placeholder}'")]
    MissingVariableValue {
        operation: String,
        placeholder: String,
    },

    #[error("unknown subscription {id}")]
    UnknownSubscription { id: u64 },

    #[error("subscription {id} is deactivated")]
    InactiveSubscription { id: u64 },

    #[error("subscription {id} is not owned by the caller")]
    NotSubscriptionOwner { id: u64 },

    #[error("subscription {id} does not target {expected}")]
    SubscriptionMismatch { id: u64, expected: String },

    #[error("no eligible strategy in bundle '{bundle}'")]
    NoEligibleStrategy { bundle: String },

    #[error("missing snapshot value '@{key}'")]
    MissingSnapshotValue { key: String },

    #[error("unknown operation '{name}'")]
    UnknownOperation { name: String },

    #[error("{operation}: expected {expected} parameters, found {found}")]
    ArityMismatch {
        operation: String,
        expected: usize,
        found: usize,
    },

    #[error("{operation}: variable '%{placeholder}' appears more than once")]
    DuplicateVariable {
        operation: String,
        placeholder: String,
    },

    #[error("duplicate sub-slot '{name}'")]
    DuplicateSubSlot { name: String },

    #[error("{trigger}: parameter {position} does not accept caller-supplied input")]
    UnverifiedTriggerInput { trigger: String, position: usize },

    #[error("too many {what}: limit is {max}")]
    LimitExceeded { what: String, max: usize },

    #[error("invalid strategy '{name}': {reason}")]
    StrategyInvalid { name: String, reason: String },

    #[error("unknown strategy {id}")]
    UnknownStrategy { id: String },

    #[error("unknown bundle {id}")]
    UnknownBundle { id: u64 },

    #[error("incompatible bundle '{name}': {reason}")]
    IncompatibleBundle { name: String, reason: String },

    #[error("decode error at byte {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratforgeError {
    /// Errors that mean the strategy author wrote a broken dataflow graph.
    /// A strategy failing with one of these must never be published.
    pub fn is_authoring_defect(&self) -> bool {
        matches!(
            self,
            StratforgeError::InvalidPipeReference { .. }
                | StratforgeError::UndeclaredSubSlot { .. }
                | StratforgeError::UnknownOperation { .. }
                | StratforgeError::ArityMismatch { .. }
                | StratforgeError::DuplicateVariable { .. }
                | StratforgeError::DuplicateSubSlot { .. }
                | StratforgeError::UnverifiedTriggerInput { .. }
                | StratforgeError::StrategyInvalid { .. }
        )
    }
}

impl From<&StratforgeError> for std::process::ExitCode {
    fn from(err: &StratforgeError) -> Self {
        let code: u8 = match err {
            StratforgeError::Io(_) => 1,
            StratforgeError::ConfigParse { .. }
            | StratforgeError::ConfigMissing { .. }
            | StratforgeError::ConfigInvalid { .. } => 2,
            StratforgeError::Database { .. } | StratforgeError::DatabaseQuery { .. } => 3,
            StratforgeError::Parse(_)
            | StratforgeError::InvalidPipeReference { .. }
            | StratforgeError::UndeclaredSubSlot { .. }
            | StratforgeError::TypeMismatch { .. }
            | StratforgeError::UnknownOperation { .. }
            | StratforgeError::ArityMismatch { .. }
            | StratforgeError::DuplicateVariable { .. }
            | StratforgeError::DuplicateSubSlot { .. }
            | StratforgeError::UnverifiedTriggerInput { .. }
            | StratforgeError::LimitExceeded { .. }
            | StratforgeError::StrategyInvalid { .. }
            | StratforgeError::Decode { .. } => 4,
            StratforgeError::MissingSubSlotValue { .. }
            | StratforgeError::UnknownSubscription { .. }
            | StratforgeError::InactiveSubscription { .. }
            | StratforgeError::NotSubscriptionOwner { .. }
            | StratforgeError::SubscriptionMismatch { .. } => 5,
            StratforgeError::MissingVariableValue { .. }
            | StratforgeError::NoEligibleStrategy { .. }
            | StratforgeError::MissingSnapshotValue { .. }
            | StratforgeError::UnknownStrategy { .. }
            | StratforgeError::UnknownBundle { .. }
            | StratforgeError::IncompatibleBundle { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_renders_caret() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("AND(ALWAYS");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "AND(ALWAYS");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn pipe_and_sub_slot_errors_block_publishing() {
        let pipe = StratforgeError::InvalidPipeReference {
            operation: "Sell".into(),
            position: 2,
            target: 2,
            reason: "self reference".into(),
        };
        let slot = StratforgeError::UndeclaredSubSlot {
            operation: "MakerWithdraw".into(),
            name: "vaultId".into(),
        };
        assert!(pipe.is_authoring_defect());
        assert!(slot.is_authoring_defect());
    }

    #[test]
    fn runtime_errors_are_recoverable() {
        let missing = StratforgeError::MissingVariableValue {
            operation: "MakerWithdraw".into(),
            placeholder: "amount".into(),
        };
        let none = StratforgeError::NoEligibleStrategy {
            bundle: "repay".into(),
        };
        assert!(!missing.is_authoring_defect());
        assert!(!none.is_authoring_defect());
    }

    #[test]
    fn display_mentions_operation_and_placeholder() {
        let err = StratforgeError::MissingVariableValue {
            operation: "MakerWithdraw".into(),
            placeholder: "withdrawAmount".into(),
        };
        assert_eq!(
            err.to_string(),
            "MakerWithdraw: missing value for variable '%withdrawAmount'"
        );
    }
}
