use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

// All main errors that can happen talking to the cluster CLI

// New failure error type
#[derive(Debug)]
struct OcError {
    inner: Context<OcErrKind>,
}
// its associated enum
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
enum OcErrKind {
    #[fail(display = "'{}' exited {} - {}", _0, _1, _2)]
    MutatorFailure(String, i32, String),

    #[fail(display = "could not execute '{}'", _0)]
    MissingExecutable(String),
}
use failure::{Backtrace, Context, Error, Fail, ResultExt};
use std::fmt::{self, Display};

// boilerplate error wrapping (might go away)
impl Fail for OcError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for OcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<OcErrKind> for OcError {
    fn from(kind: OcErrKind) -> OcError {
        OcError { inner: Context::new(kind) }
    }
}
impl From<Context<OcErrKind>> for OcError {
    fn from(inner: Context<OcErrKind>) -> OcError {
        OcError { inner: inner }
    }
}
type Result<T> = std::result::Result<T, Error>;

/// Connection options for the delegated CLI
///
/// These parameterize every invocation and never take part in resource
/// comparison.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Connection {
    /// Executable to delegate to, `oc` by default; may carry embedded
    /// arguments (`oc --context=prod`)
    pub oc_cmd: Option<String>,
    pub server: Option<String>,
    pub certificate_authority: Option<String>,
    pub token: Option<String>,
    pub insecure_skip_tls_verify: Option<String>,
}

/// A configured handle on the external mutator
pub struct Oc {
    argv: Vec<String>,
    token: Option<String>,
}

impl Oc {
    pub fn new(conn: &Connection) -> Oc {
        let mut argv: Vec<String> = conn
            .oc_cmd
            .as_ref()
            .map(|cmd| cmd.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        if argv.is_empty() {
            argv.push("oc".to_string());
        }
        if let Some(ref server) = conn.server {
            argv.push(format!("--server={}", server));
        }
        if let Some(ref ca) = conn.certificate_authority {
            argv.push(format!("--certificate-authority={}", ca));
        }
        if let Some(ref token) = conn.token {
            argv.push(format!("--token={}", token));
        }
        if let Some(ref insecure) = conn.insecure_skip_tls_verify {
            argv.push(format!("--insecure-skip-tls-verify={}", insecure));
        }
        Oc { argv, token: conn.token.clone() }
    }

    /// The base argument vector (executable plus connection options)
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    // loggable command line; the token never reaches the log
    fn display(&self, args: &[String]) -> String {
        self.argv
            .iter()
            .chain(args.iter())
            .map(|a| match self.token {
                Some(ref token) if a.contains(token.as_str()) => "--token=<hidden>".to_string(),
                _ => a.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the CLI with the given action arguments, piping `stdin` in
    pub fn run(&self, args: &[String], stdin: Option<&str>) -> Result<(i32, String, String)> {
        debug!("running {}", self.display(args));
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        let mut child = cmd
            .spawn()
            .context(OcErrKind::MissingExecutable(self.argv[0].clone()))?;
        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle.write_all(input.as_bytes())?;
            }
        }
        let output = child.wait_with_output()?;
        let rc = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        trace!("{} exited {}", self.argv[0], rc);
        Ok((rc, stdout, stderr))
    }

    /// Like `run`, but a non-zero exit is a failure carrying stderr verbatim
    pub fn run_checked(&self, args: &[String], stdin: Option<&str>) -> Result<String> {
        let (rc, stdout, stderr) = self.run(args, stdin)?;
        if rc != 0 {
            return Err(OcErrKind::MutatorFailure(self.display(args), rc, stderr))?;
        }
        Ok(stdout)
    }

    /// Fetch the observed state of a resource; `None` when not present
    pub fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<Option<Value>> {
        let mut args: Vec<String> = vec![
            "get".into(),
            kind.into(),
            name.into(),
            "-o".into(),
            "json".into(),
        ];
        if let Some(ns) = namespace {
            args.push("-n".into());
            args.push(ns.into());
        }
        let (rc, stdout, stderr) = self.run(&args, None)?;
        if rc != 0 {
            debug!("no {} named {} found: {}", kind, name, stderr.trim());
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&stdout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{Connection, Oc};

    #[test]
    fn argv_defaults_to_oc() {
        let oc = Oc::new(&Connection::default());
        assert_eq!(oc.argv(), &["oc".to_string()]);
    }

    #[test]
    fn argv_carries_connection_options() {
        let conn = Connection {
            oc_cmd: Some("kubectl --context=prod".to_string()),
            server: Some("https://api.example.com:6443".to_string()),
            certificate_authority: Some("/etc/ca.crt".to_string()),
            token: Some("sekrit".to_string()),
            insecure_skip_tls_verify: Some("true".to_string()),
        };
        let oc = Oc::new(&conn);
        assert_eq!(
            oc.argv(),
            &[
                "kubectl".to_string(),
                "--context=prod".to_string(),
                "--server=https://api.example.com:6443".to_string(),
                "--certificate-authority=/etc/ca.crt".to_string(),
                "--token=sekrit".to_string(),
                "--insecure-skip-tls-verify=true".to_string(),
            ]
        );
    }

    #[test]
    fn displayed_commands_hide_the_token() {
        let conn = Connection {
            token: Some("sekrit".to_string()),
            ..Default::default()
        };
        let oc = Oc::new(&conn);
        let shown = oc.display(&["apply".to_string(), "-f".to_string(), "-".to_string()]);
        assert!(!shown.contains("sekrit"));
        assert!(shown.contains("--token=<hidden>"));
    }
}
