//! Command descriptor handed to a connection for execution.

use std::time::Duration;

use super::parameter::{ParameterDirection, SqlParameter, SqlValue};

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Raw SQL. Parameters bind to `@name` placeholders, or positionally to
    /// `$1..$n` when the text has no named placeholders.
    Text,
    /// The text is a (optionally schema-qualified) routine name.
    StoredProcedure,
}

/// An ephemeral, per-call command.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    pub kind: CommandKind,
    pub text: String,
    pub parameters: Vec<SqlParameter>,
    /// `None` runs without a client-side timeout.
    pub timeout: Option<Duration>,
}

impl SqlCommand {
    /// Build a command with an unbounded timeout, attaching the parameters.
    pub fn new(kind: CommandKind, text: impl Into<String>, parameters: Vec<SqlParameter>) -> Self {
        let mut command = Self {
            kind,
            text: text.into(),
            parameters: Vec::with_capacity(parameters.len()),
            timeout: None,
        };
        command.attach_parameters(parameters);
        command
    }

    /// Attach parameters, giving in-out parameters without a value the explicit
    /// null marker so a stale default is never sent.
    pub fn attach_parameters(&mut self, parameters: Vec<SqlParameter>) {
        for mut p in parameters {
            if p.direction == ParameterDirection::InputOutput && p.value.is_none() {
                p.value = Some(SqlValue::Null);
            }
            self.parameters.push(p);
        }
    }

    /// Output and in-out parameters, in declaration order.
    pub fn output_parameters(&self) -> Vec<SqlParameter> {
        self.parameters
            .iter()
            .filter(|p| p.direction.is_output())
            .cloned()
            .collect()
    }
}
