//! Part decryption.
//!
//! Parts are OpenPGP symmetric messages. Decryption is delegated to an
//! external tool behind [`PartDecryptor`]; [`GpgDecryptor`] runs `gpg` and
//! hands it the passphrase on stdin so it never appears in the process list.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::error::RetrievalError;

/// Default per-part decryption timeout in seconds.
pub const DEFAULT_DECRYPT_TIMEOUT_SECS: u64 = 120;

/// Default decryption program.
pub const DEFAULT_DECRYPT_PROGRAM: &str = "gpg";

/// Default S2K iteration count.
pub const DEFAULT_S2K_COUNT: u32 = 65535;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the output pipes to close once the program is gone.
/// Descendants of a killed program can keep them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Secret used to decrypt every part of a package.
///
/// Formed by concatenating the manifest's server secret and the link's key
/// code. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(server_secret: &str, key_code: &str) -> Self {
        let mut value = String::with_capacity(server_secret.len() + key_code.len());
        value.push_str(server_secret);
        value.push_str(key_code);
        Self(value)
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// OpenPGP symmetric cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes128,
    Aes192,
    Aes256,
}

impl CipherAlgorithm {
    /// OpenPGP algorithm id.
    pub fn id(self) -> u8 {
        match self {
            Self::Aes128 => 7,
            Self::Aes192 => 8,
            Self::Aes256 => 9,
        }
    }

    fn gpg_name(self) -> &'static str {
        match self {
            Self::Aes128 => "AES",
            Self::Aes192 => "AES192",
            Self::Aes256 => "AES256",
        }
    }
}

/// OpenPGP compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    None,
    Zip,
    Zlib,
}

impl CompressionAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zip => 1,
            Self::Zlib => 2,
        }
    }

    fn gpg_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
            Self::Zlib => "zlib",
        }
    }
}

/// OpenPGP hash algorithm used for S2K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            Self::Sha256 => 8,
            Self::Sha384 => 9,
            Self::Sha512 => 10,
        }
    }

    fn gpg_name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }
}

/// OpenPGP literal data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralMode {
    Binary,
    Text,
}

impl LiteralMode {
    /// Format octet as written in the literal data packet.
    pub fn id(self) -> u8 {
        match self {
            Self::Binary => b'b',
            Self::Text => b't',
        }
    }
}

/// Algorithm parameters and limits for a decryption run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOptions {
    pub cipher: CipherAlgorithm,
    pub compression: CompressionAlgorithm,
    pub hash: HashAlgorithm,
    pub s2k_count: u32,
    pub literal_mode: LiteralMode,
    /// Wall-clock limit for one part; the process is killed on expiry.
    pub timeout: Duration,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            cipher: CipherAlgorithm::Aes256,
            compression: CompressionAlgorithm::None,
            hash: HashAlgorithm::Sha256,
            s2k_count: DEFAULT_S2K_COUNT,
            literal_mode: LiteralMode::Binary,
            timeout: Duration::from_secs(DEFAULT_DECRYPT_TIMEOUT_SECS),
        }
    }
}

impl DecryptOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Why a decryption attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct DecryptFailure {
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    pub reason: String,
    pub stdout: String,
    pub stderr: String,
}

impl DecryptFailure {
    /// Failure without any process output.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            reason: reason.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Attach the part identity.
    pub fn into_retrieval_error(self, file_id: &str, part: u32) -> RetrievalError {
        RetrievalError::Decryption {
            file_id: file_id.to_string(),
            part,
            exit_code: self.exit_code,
            reason: self.reason,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Capability that turns an encrypted part into its plaintext.
pub trait PartDecryptor: Send + Sync {
    /// Decrypt `input` into `output`.
    ///
    /// Implementations must not leave `output` behind on failure.
    fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &Passphrase,
        options: &DecryptOptions,
    ) -> Result<(), DecryptFailure>;
}

/// Decrypts parts by running `gpg` as a subprocess.
#[derive(Debug, Clone)]
pub struct GpgDecryptor {
    program: PathBuf,
}

impl Default for GpgDecryptor {
    fn default() -> Self {
        Self::new(DEFAULT_DECRYPT_PROGRAM)
    }
}

impl GpgDecryptor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for one part. The passphrase is read from fd 0.
    pub fn args(&self, input: &Path, output: &Path, options: &DecryptOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--batch",
            "--yes",
            "--pinentry-mode",
            "loopback",
            "--passphrase-fd",
            "0",
            "--s2k-cipher-algo",
            options.cipher.gpg_name(),
            "--compress-algo",
            options.compression.gpg_name(),
            "--s2k-digest-algo",
            options.hash.gpg_name(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("--s2k-count".into());
        args.push(options.s2k_count.to_string().into());
        if options.literal_mode == LiteralMode::Text {
            args.push("--textmode".into());
        }
        args.push("--output".into());
        args.push(output.as_os_str().to_owned());
        args.push("--decrypt".into());
        args.push(input.as_os_str().to_owned());
        args
    }

    fn spawn(&self, input: &Path, output: &Path, options: &DecryptOptions) -> io::Result<Child> {
        Command::new(&self.program)
            .args(self.args(input, output, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

impl PartDecryptor for GpgDecryptor {
    fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &Passphrase,
        options: &DecryptOptions,
    ) -> Result<(), DecryptFailure> {
        let mut child = self.spawn(input, output, options).map_err(|e| {
            DecryptFailure::new(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A closed pipe means the program already gave up; its exit
            // status carries the real error.
            if let Err(e) = stdin
                .write_all(passphrase.expose().as_bytes())
                .and_then(|_| stdin.write_all(b"\n"))
            {
                debug!(error = %e, "Could not write passphrase to decryptor");
            }
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let waited = wait_with_timeout(&mut child, options.timeout);
        let pipes_deadline = Instant::now() + PIPE_GRACE;
        let stdout = collect(stdout, pipes_deadline);
        let stderr = collect(stderr, pipes_deadline);

        let failure = match waited {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => DecryptFailure {
                exit_code: status.code(),
                reason: format!("{} exited with {}", self.program.display(), status),
                stdout,
                stderr,
            },
            Ok(None) => DecryptFailure {
                exit_code: None,
                reason: format!("timed out after {}s", options.timeout.as_secs_f64()),
                stdout,
                stderr,
            },
            Err(e) => DecryptFailure {
                exit_code: None,
                reason: format!("failed to wait for {}: {}", self.program.display(), e),
                stdout,
                stderr,
            },
        };

        if output.exists() {
            if let Err(e) = std::fs::remove_file(output) {
                warn!(path = %output.display(), error = %e, "Failed to remove partial output");
            }
        }
        Err(failure)
    }
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Returns `None` if the child was killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill.
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Read a pipe to the end on a helper thread so the child never blocks on a
/// full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    })
}

/// Output captured by [`drain`], or nothing if the pipe is still open at
/// `deadline`. An abandoned reader exits once the last writer does.
fn collect(output: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    output
        .and_then(|rx| {
            rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok()
        })
        .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
        .unwrap_or_default()
}
