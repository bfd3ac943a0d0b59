use std::fmt;
use std::time::Duration;

/// Wall-clock bound for a streaming invocation.
pub const STREAM_DEADLINE: Duration = Duration::from_secs(120);

/// `(command, first argument)` pairs that stream their output line by line.
const STREAMING_COMMANDS: &[(&str, &str)] = &[
    ("flake", "validate"),
    ("flake", "check"),
    ("build", "watch"),
];

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InvocationId(u64);

impl InvocationId {
    #[cfg(test)]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[cfg(test)]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecMode {
    Buffered,
    Streaming,
}

impl ExecMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Streaming => "streaming",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecRequest {
    pub command: String,
    pub subcommand: Option<String>,
    pub args: Vec<String>,
}

impl ExecRequest {
    pub fn new(command: &str, subcommand: Option<&str>, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            subcommand: subcommand.map(str::to_string),
            args,
        }
    }

    /// Arguments handed to the executor after the command name.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        if let Some(subcommand) = &self.subcommand {
            argv.push(subcommand.clone());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    pub fn command_line(&self) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.argv());
        parts.join(" ")
    }

    pub fn mode(&self) -> ExecMode {
        let argv = self.argv();
        let Some(first) = argv.first() else {
            return ExecMode::Buffered;
        };

        if STREAMING_COMMANDS
            .iter()
            .any(|(command, arg)| *command == self.command && arg == first)
        {
            ExecMode::Streaming
        } else {
            ExecMode::Buffered
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecOutcome {
    Output(String),
    NotHandled,
}

/// Messages produced by one dispatched invocation, always tagged with its id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecMessage {
    Started {
        invocation: InvocationId,
        command_line: String,
    },
    Chunk {
        invocation: InvocationId,
        line: String,
    },
    StreamEnd {
        invocation: InvocationId,
        error: Option<String>,
    },
    Finished {
        invocation: InvocationId,
        result: Result<ExecOutcome, String>,
    },
}

impl ExecMessage {
    pub fn invocation(&self) -> InvocationId {
        match self {
            Self::Started { invocation, .. }
            | Self::Chunk { invocation, .. }
            | Self::StreamEnd { invocation, .. }
            | Self::Finished { invocation, .. } => *invocation,
        }
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamEnd { .. } | Self::Finished { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommand_leads_the_argument_vector() {
        let request = ExecRequest::new(
            "doctor",
            Some("system"),
            vec!["--verbose".to_string()],
        );
        assert_eq!(request.argv(), vec!["system", "--verbose"]);
        assert_eq!(request.command_line(), "doctor system --verbose");
    }

    #[test]
    fn bare_command_line_has_no_trailing_space() {
        let request = ExecRequest::new("config", None, Vec::new());
        assert_eq!(request.command_line(), "config");
    }

    #[test]
    fn streaming_is_decided_by_command_and_first_argument() {
        assert_eq!(
            ExecRequest::new("flake", Some("validate"), Vec::new()).mode(),
            ExecMode::Streaming
        );
        assert_eq!(
            ExecRequest::new("flake", None, vec!["check".to_string()]).mode(),
            ExecMode::Streaming
        );
        assert_eq!(
            ExecRequest::new("flake", Some("show"), Vec::new()).mode(),
            ExecMode::Buffered
        );
        assert_eq!(
            ExecRequest::new("doctor", None, Vec::new()).mode(),
            ExecMode::Buffered
        );
    }

    #[test]
    fn invocation_ids_increase() {
        let first = InvocationId::new(1);
        assert!(first.next() > first);
        assert_eq!(first.next().get(), 2);
    }
}
