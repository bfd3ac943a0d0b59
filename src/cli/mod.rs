use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PROGRAM: &str = "nixai";
pub const DEFAULT_SNAPSHOT_SIZE: (u16, u16) = (100, 30);

pub const PROGRAM_ENV: &str = "NIXAI_TUI_PROGRAM";
pub const CATALOG_ENV: &str = "NIXAI_TUI_CATALOG";
pub const LOG_FILE_ENV: &str = "NIXAI_TUI_LOG_FILE";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Run(TuiConfig),
}

/// Command dispatched at startup, with its arguments passed through verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitialCommand {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TuiConfig {
    pub program: PathBuf,
    pub catalog: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub snapshot: Option<(u16, u16)>,
    pub initial: Option<InitialCommand>,
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    parse_invocation_with_env(args, |name| std::env::var_os(name))
}

fn parse_invocation_with_env(
    args: &[String],
    env: impl Fn(&str) -> Option<OsString>,
) -> Result<CliInvocation, CliParseError> {
    let env_path = |name: &str| {
        env(name)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    };

    let mut program: Option<PathBuf> = None;
    let mut catalog: Option<PathBuf> = None;
    let mut log_file: Option<PathBuf> = None;
    let mut snapshot: Option<(u16, u16)> = None;
    let mut initial: Option<InitialCommand> = None;

    // Flags are only read up to the first positional; the rest belongs to the
    // initial command.
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (arg.as_str(), None),
        };

        match flag {
            "--help" | "-h" => return Ok(CliInvocation::PrintHelp),
            "--version" | "-V" => return Ok(CliInvocation::PrintVersion),
            "--program" => {
                program = Some(PathBuf::from(flag_value(flag, inline_value, &mut iter)?));
            }
            "--catalog" => {
                catalog = Some(PathBuf::from(flag_value(flag, inline_value, &mut iter)?));
            }
            "--log-file" => {
                log_file = Some(PathBuf::from(flag_value(flag, inline_value, &mut iter)?));
            }
            "--snapshot" => {
                snapshot = Some(match inline_value {
                    Some(value) => parse_size_flag(flag, value)?,
                    None => DEFAULT_SNAPSHOT_SIZE,
                });
            }
            "--" => {
                initial = initial_command(&mut iter);
                break;
            }
            _ if flag.starts_with('-') => {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
            _ => {
                initial = Some(InitialCommand {
                    name: arg.to_string(),
                    args: iter.cloned().collect(),
                });
                break;
            }
        }
    }

    Ok(CliInvocation::Run(TuiConfig {
        program: program
            .or_else(|| env_path(PROGRAM_ENV))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
        catalog: catalog.or_else(|| env_path(CATALOG_ENV)),
        log_file: log_file.or_else(|| env_path(LOG_FILE_ENV)),
        snapshot,
        initial,
    }))
}

fn initial_command<'a>(iter: &mut impl Iterator<Item = &'a String>) -> Option<InitialCommand> {
    let name = iter.next()?;
    Some(InitialCommand {
        name: name.to_string(),
        args: iter.cloned().collect(),
    })
}

fn flag_value<'a>(
    flag: &str,
    inline_value: Option<&'a str>,
    iter: &mut impl Iterator<Item = &'a String>,
) -> Result<&'a str, CliParseError> {
    let value = match inline_value {
        Some(value) => Some(value),
        None => iter.next().map(String::as_str),
    };
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))
}

fn parse_size_flag(flag: &str, value: &str) -> Result<(u16, u16), CliParseError> {
    let invalid = || CliParseError::InvalidFlagValue {
        flag: flag.to_string(),
        value: value.to_string(),
    };

    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let width = width.trim().parse::<u16>().map_err(|_| invalid())?;
    let height = height.trim().parse::<u16>().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

pub fn help_text() -> String {
    format!(
        "{name} - terminal dashboard for the nixai command-line assistant\n\nUSAGE:\n  {name} [FLAGS] [COMMAND [ARGS...]]\n\n  With COMMAND, that command is dispatched immediately with ARGS passed through\n  verbatim. Without it, the command list opens.\n\nFLAGS:\n  --program PATH      Program that runs commands (default: {program})\n  --catalog PATH      JSON command catalog (default: built-in)\n  --log-file PATH     Append logs to PATH (default: discarded)\n  --snapshot[=WxH]    Render one frame to stdout and exit (default size: {width}x{height})\n  -h, --help          Print this help\n  -V, --version       Print the version\n\nENV:\n  {program_env}   Same as --program\n  {catalog_env}   Same as --catalog\n  {log_file_env}  Same as --log-file\n  NIXAI_TUI_LOG       Log filter (default: info)\n",
        name = env!("CARGO_PKG_NAME"),
        program = DEFAULT_PROGRAM,
        width = DEFAULT_SNAPSHOT_SIZE.0,
        height = DEFAULT_SNAPSHOT_SIZE.1,
        program_env = PROGRAM_ENV,
        catalog_env = CATALOG_ENV,
        log_file_env = LOG_FILE_ENV,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        std::iter::once("nixai-tui")
            .chain(items.iter().copied())
            .map(str::to_string)
            .collect()
    }

    fn no_env(_: &str) -> Option<OsString> {
        None
    }

    fn parse(items: &[&str]) -> Result<CliInvocation, CliParseError> {
        parse_invocation_with_env(&args(items), no_env)
    }

    fn config(items: &[&str]) -> TuiConfig {
        match parse(items).expect("parse") {
            CliInvocation::Run(config) => config,
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn no_arguments_use_defaults() {
        let config = config(&[]);
        assert_eq!(config.program, PathBuf::from("nixai"));
        assert_eq!(config.catalog, None);
        assert_eq!(config.log_file, None);
        assert_eq!(config.snapshot, None);
        assert_eq!(config.initial, None);
    }

    #[test]
    fn help_and_version_flags() {
        assert_eq!(parse(&["-h"]).expect("parse"), CliInvocation::PrintHelp);
        assert_eq!(parse(&["--help"]).expect("parse"), CliInvocation::PrintHelp);
        assert_eq!(parse(&["-V"]).expect("parse"), CliInvocation::PrintVersion);
    }

    #[test]
    fn path_flags_accept_separate_and_inline_values() {
        let config = config(&[
            "--program",
            "/run/current-system/sw/bin/nixai",
            "--catalog=/etc/nixai/catalog.json",
            "--log-file",
            "/tmp/tui.log",
        ]);
        assert_eq!(
            config.program,
            PathBuf::from("/run/current-system/sw/bin/nixai")
        );
        assert_eq!(config.catalog, Some(PathBuf::from("/etc/nixai/catalog.json")));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/tui.log")));
    }

    #[test]
    fn env_fills_in_missing_flags_and_flags_win() {
        let env = |name: &str| match name {
            PROGRAM_ENV => Some(OsString::from("/opt/nixai")),
            CATALOG_ENV => Some(OsString::from("/env/catalog.json")),
            LOG_FILE_ENV => Some(OsString::new()),
            _ => None,
        };
        let invocation =
            parse_invocation_with_env(&args(&["--catalog", "/flag/catalog.json"]), env)
                .expect("parse");
        let CliInvocation::Run(config) = invocation else {
            panic!("expected Run");
        };
        assert_eq!(config.program, PathBuf::from("/opt/nixai"));
        assert_eq!(config.catalog, Some(PathBuf::from("/flag/catalog.json")));
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn snapshot_defaults_and_custom_size() {
        assert_eq!(config(&["--snapshot"]).snapshot, Some((100, 30)));
        assert_eq!(config(&["--snapshot=80x24"]).snapshot, Some((80, 24)));
    }

    #[test]
    fn invalid_snapshot_sizes_are_rejected() {
        for value in ["--snapshot=80", "--snapshot=0x24", "--snapshot=wide x tall"] {
            assert!(
                matches!(parse(&[value]), Err(CliParseError::InvalidFlagValue { .. })),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn unknown_and_incomplete_flags_fail() {
        assert!(matches!(
            parse(&["--verbose"]),
            Err(CliParseError::UnknownFlag(flag)) if flag == "--verbose"
        ));
        assert!(matches!(
            parse(&["--program"]),
            Err(CliParseError::MissingFlagValue(flag)) if flag == "--program"
        ));
        assert!(matches!(
            parse(&["--catalog="]),
            Err(CliParseError::MissingFlagValue(_))
        ));
    }

    #[test]
    fn initial_command_keeps_its_arguments_verbatim() {
        let config = config(&["--snapshot", "flake", "validate", "--path", "/etc/nixos", "-h"]);
        assert_eq!(config.snapshot, Some((100, 30)));
        assert_eq!(
            config.initial,
            Some(InitialCommand {
                name: "flake".to_string(),
                args: vec![
                    "validate".to_string(),
                    "--path".to_string(),
                    "/etc/nixos".to_string(),
                    "-h".to_string(),
                ],
            })
        );
    }

    #[test]
    fn double_dash_ends_flag_parsing() {
        let initial = config(&["--", "--weird-name", "x"])
            .initial
            .expect("initial command");
        assert_eq!(initial.name, "--weird-name");
        assert_eq!(initial.args, vec!["x".to_string()]);

        assert_eq!(config(&["--"]).initial, None);
    }

    #[test]
    fn help_text_mentions_every_flag() {
        let text = help_text();
        for flag in ["--program", "--catalog", "--log-file", "--snapshot", "--version"] {
            assert!(text.contains(flag), "missing {flag}");
        }
    }
}
