//! Local conversion through the `pandoc` executable.
//!
//! Invocation template:
//!
//! ```text
//! pandoc <source> -o <output> -t gfm --wrap=none --extract-media <output dir>/media
//! ```
//!
//! A non-zero exit fails with pandoc's stderr. Exceeding the wall-clock
//! limit kills the child and fails with [`ConversionError::Timeout`].

use super::{failed, finish, preflight, Converter, ConverterContext};
use crate::error::ConversionError;
use crate::output::ConversionResult;
use crate::quality::QualityProfile;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

pub const NAME: &str = "pandoc";

const EXTENSIONS: &[&str] = &[".docx", ".doc", ".html", ".htm", ".rtf", ".odt", ".epub"];

#[derive(Debug, Clone)]
pub struct PandocConverter {
    binary: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    timeout: Duration,
    frontmatter: bool,
}

impl PandocConverter {
    /// Uses the executable resolved by the context. A missing binary is
    /// reported per file, not here.
    pub fn new(ctx: &ConverterContext) -> Self {
        Self {
            binary: ctx.pandoc_binary.clone(),
            output_dir: ctx.config.output_dir.clone(),
            timeout: Duration::from_secs(ctx.config.local_tool_timeout_secs),
            frontmatter: ctx.config.enable_frontmatter,
        }
    }

    /// Use an explicit executable instead of the `PATH` lookup.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn command(&self, binary: &Path, source: &Path, output: &Path) -> Command {
        let media = output
            .parent()
            .map(|p| p.join("media"))
            .unwrap_or_else(|| PathBuf::from("media"));
        let mut cmd = Command::new(binary);
        cmd.arg(source)
            .arg("-o")
            .arg(output)
            .args(["-t", "gfm", "--wrap=none", "--extract-media"])
            .arg(media)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, source: &Path) -> Result<String, ConversionError> {
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| ConversionError::BackendUnavailable {
                backend: NAME.into(),
                hint: "pandoc was not found on PATH".into(),
            })?;
        let output = self.output_path(source);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConversionError::Io {
                    detail: format!("creating {}: {}", parent.display(), e),
                })?;
        }

        debug!("pandoc: {} → {}", source.display(), output.display());
        let mut cmd = self.command(binary, source, &output);
        // Dropping the timed-out future drops the child, which kills it.
        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(ConversionError::Io {
                    detail: format!("failed to run pandoc: {e}"),
                })
            }
            Err(_) => {
                warn!("pandoc timed out on {}", source.display());
                return Err(ConversionError::Timeout {
                    backend: NAME.into(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(ConversionError::ToolFailed {
                tool: NAME.into(),
                detail: if stderr.is_empty() {
                    format!("pandoc exited with {}", out.status)
                } else {
                    stderr
                },
            });
        }

        tokio::fs::read_to_string(&output)
            .await
            .map_err(|e| ConversionError::Io {
                detail: format!("reading {}: {}", output.display(), e),
            })
    }
}

#[async_trait]
impl Converter for PandocConverter {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn quality_profile(&self) -> QualityProfile {
        QualityProfile::LocalTool
    }

    fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    async fn convert(&self, source: &Path) -> ConversionResult {
        let started = Instant::now();
        if let Some(early) = preflight(self, source, started).await {
            return early;
        }
        match self.run(source).await {
            Ok(markdown) => finish(self, source, NAME, markdown, self.frontmatter, started).await,
            Err(e) => failed(self, source, e, started),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ConversionStatus;

    fn converter(dir: &Path) -> PandocConverter {
        let config = crate::ConverterConfig::builder()
            .output_dir(dir)
            .build()
            .unwrap();
        PandocConverter::new(&ConverterContext::new(config))
    }

    #[test]
    fn supports_office_and_html() {
        let dir = tempfile::tempdir().unwrap();
        let c = converter(dir.path());
        assert!(c.supports(".docx"));
        assert!(c.supports("HTML"));
        assert!(!c.supports(".pdf"));
    }

    #[test]
    fn argument_template() {
        let c = converter(Path::new("/out"));
        let cmd = c.command(Path::new("pandoc"), Path::new("/in/a.docx"), Path::new("/out/a.md"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "/in/a.docx",
                "-o",
                "/out/a.md",
                "-t",
                "gfm",
                "--wrap=none",
                "--extract-media",
                "/out/media"
            ]
        );
    }

    #[test]
    fn binary_comes_from_the_context() {
        let config = crate::ConverterConfig::builder()
            .output_dir("/out")
            .build()
            .unwrap();
        let ctx = ConverterContext::new(config);
        let found = ctx
            .clone()
            .with_pandoc_binary(Some(PathBuf::from("/opt/tools/pandoc")));
        let c = PandocConverter::new(&found);
        assert!(c.is_available());
        assert_eq!(c.binary.as_deref(), Some(Path::new("/opt/tools/pandoc")));

        let missing = ctx.with_pandoc_binary(None);
        assert!(!PandocConverter::new(&missing).is_available());
    }

    #[tokio::test]
    async fn missing_binary_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"PK").unwrap();
        let mut c = converter(dir.path());
        c.binary = None;
        let r = c.convert(&src).await;
        assert_eq!(r.status, ConversionStatus::Failed);
        assert!(r.error_message.unwrap().contains("unavailable"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"PK").unwrap();
        let script = dir.path().join("fake-pandoc");
        std::fs::write(&script, "#!/bin/sh\necho 'bad input' >&2\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let r = converter(dir.path()).with_binary(&script).convert(&src).await;
        assert_eq!(r.status, ConversionStatus::Failed);
        assert!(r.error_message.unwrap().contains("bad input"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.html");
        std::fs::write(&src, b"<p>x</p>").unwrap();
        let script = dir.path().join("slow-pandoc");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let r = converter(dir.path())
            .with_binary(&script)
            .with_timeout(Duration::from_millis(200))
            .convert(&src)
            .await;
        assert_eq!(r.status, ConversionStatus::Failed);
        assert!(r.error_message.unwrap().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_adds_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("My Doc.html");
        std::fs::write(&src, b"<h2>x</h2>").unwrap();
        // Writes its -o argument ($3).
        let script = dir.path().join("ok-pandoc");
        std::fs::write(&script, "#!/bin/sh\nprintf '## Heading\\n\\nBody\\n' > \"$3\"\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let r = converter(dir.path()).with_binary(&script).convert(&src).await;
        assert_eq!(r.status, ConversionStatus::Success, "{:?}", r.error_message);
        assert_eq!(r.tool_used, "pandoc");
        let out = r.output_path.unwrap();
        assert!(out.ends_with("my_doc.md"));
        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.starts_with("---\n"));
        assert!(written.contains("## Heading"));
        assert!(r.quality_score >= 70);
    }
}
