//! Private key and CSR generation through an external tool.
//!
//! The tool is a black box: it reads a config file, writes a key and a CSR,
//! and exits 0, or exits nonzero with diagnostics on stdout/stderr.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::GeneratorError;
use crate::job::JobPaths;

/// Upper bound on a single tool run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Inputs for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub key_size: u32,
    pub config_path: PathBuf,
    pub key_path: PathBuf,
    pub csr_path: PathBuf,
}

impl GenerationRequest {
    pub fn for_job(paths: &JobPaths, key_size: u32) -> Self {
        Self {
            key_size,
            config_path: paths.config.clone(),
            key_path: paths.key.clone(),
            csr_path: paths.csr.clone(),
        }
    }
}

/// Result of a tool run that actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub success: bool,
    /// `None` when the process was killed or never reported a code.
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl GenerationOutput {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            output: output.into(),
        }
    }

    fn from_process(output: std::process::Output) -> Self {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        }
    }
}

/// Produces a key and CSR for a request.
///
/// `Err` means the tool could not be run at all; a tool that ran and failed
/// is an `Ok` with `success == false`.
#[async_trait]
pub trait CsrGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationOutput, GeneratorError>;
}

/// Runs `openssl req` with an argument vector (no shell involved).
#[derive(Debug, Clone)]
pub struct OpensslGenerator {
    program: PathBuf,
    timeout: Duration,
}

impl OpensslGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `req -new -newkey rsa:<bits> -nodes -keyout <key> -out <csr> -config <conf>`
    pub fn build_args(request: &GenerationRequest) -> Vec<OsString> {
        vec![
            "req".into(),
            "-new".into(),
            "-newkey".into(),
            format!("rsa:{}", request.key_size).into(),
            "-nodes".into(),
            "-keyout".into(),
            request.key_path.clone().into_os_string(),
            "-out".into(),
            request.csr_path.clone().into_os_string(),
            "-config".into(),
            request.config_path.clone().into_os_string(),
        ]
    }
}

impl Default for OpensslGenerator {
    fn default() -> Self {
        Self::new("openssl")
    }
}

#[async_trait]
impl CsrGenerator for OpensslGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GeneratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| GeneratorError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(GenerationOutput::from_process(output)),
            Ok(Err(e)) => Err(GeneratorError::Io(e)),
            Err(_) => Ok(GenerationOutput::failed(
                None,
                format!(
                    "{} did not finish within {}s and was killed",
                    self.program.display(),
                    self.timeout.as_secs()
                ),
            )),
        }
    }
}
