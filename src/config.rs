//! Runtime-wide tunables and CLI flag parsing.
//!
//! The transport layer (binding an HTTP listener, auth-token headers) is out
//! of scope for this runtime -- the binary serves over MCP stdio instead --
//! so `host`/`port`/`auth_token` below are parsed and logged for operator
//! visibility but never used to bind a socket.

/// Safety ceiling applied to any caller-supplied timeout across the runtime.
pub const MAX_TIMEOUT_SECONDS: f64 = crate::bash::session::MAX_TIMEOUT_SECONDS;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Parsed command-line flags.
#[derive(Debug, Clone)]
pub struct Cli {
    pub host: String,
    pub port: u16,
    /// Required on every invocation; an empty string disables auth. Not
    /// required when `-v`/`--version` is passed, since the process exits
    /// before serving anything.
    pub auth_token: String,
    pub show_version: bool,
}

impl Default for Cli {
    fn default() -> Self {
        Cli {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_token: String::new(),
            show_version: false,
        }
    }
}

impl Cli {
    /// Parse flags by hand (no argv-parsing crate in the teacher's
    /// dependency stack): `--host`, `--port`, `--auth-token`, `-v`/`--version`.
    /// `--auth-token` is required -- pass `--auth-token ""` to disable auth --
    /// except when `-v`/`--version` is also given.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut cli = Cli::default();
        let mut auth_token = None;
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" => {
                    cli.host = iter.next().ok_or("--host requires a value")?;
                }
                "--port" => {
                    let value = iter.next().ok_or("--port requires a value")?;
                    cli.port = value
                        .parse()
                        .map_err(|_| format!("invalid --port value: {value}"))?;
                }
                "--auth-token" => {
                    auth_token = Some(iter.next().ok_or("--auth-token requires a value")?);
                }
                "-v" | "--version" => {
                    cli.show_version = true;
                }
                other => {
                    return Err(format!("unrecognized argument: {other}"));
                }
            }
        }

        match auth_token {
            Some(token) => cli.auth_token = token,
            None if cli.show_version => {}
            None => {
                return Err(
                    "--auth-token is required (pass --auth-token \"\" to disable auth)".to_string(),
                );
            }
        }

        Ok(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_auth_token_is_rejected() {
        let err = Cli::parse(Vec::<String>::new()).unwrap_err();
        assert!(err.contains("--auth-token"));
    }

    #[test]
    fn empty_auth_token_disables_auth() {
        let cli = Cli::parse(["--auth-token", ""].into_iter().map(String::from)).unwrap();
        assert_eq!(cli.host, DEFAULT_HOST);
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.auth_token, "");
        assert!(!cli.show_version);
    }

    #[test]
    fn parses_host_port_and_token() {
        let cli = Cli::parse(
            ["--host", "127.0.0.1", "--port", "9001", "--auth-token", "secret"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 9001);
        assert_eq!(cli.auth_token, "secret");
    }

    #[test]
    fn version_flag_does_not_require_auth_token() {
        let cli = Cli::parse(["-v"].into_iter().map(String::from)).unwrap();
        assert!(cli.show_version);
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(Cli::parse(["--bogus"].into_iter().map(String::from)).is_err());
    }
}
