//! Jacket rendering seam.
//!
//! A jacket upload yields three stored images: the normalized jacket and two
//! background variants derived from it. Image processing itself lives
//! outside this crate; [`CommandRenderer`] delegates to an external program
//! and [`PassthroughRenderer`] stores the upload unchanged.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use cas::{content_type, PendingBlob};

use crate::slots::AssetSlot;
use crate::sniff;

/// The three images produced from one jacket upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedJacket {
    pub jacket: Bytes,
    pub variant1: Bytes,
    pub variant2: Bytes,
}

impl RenderedJacket {
    /// Hash each image and pair it with its slot. Content types follow the
    /// image bytes, so a passed-through JPEG is not labelled PNG.
    pub fn blobs(&self) -> [(AssetSlot, PendingBlob); 3] {
        let blob = |bytes: &Bytes| PendingBlob::new(bytes.clone(), image_content_type(bytes));
        [
            (AssetSlot::Jacket, blob(&self.jacket)),
            (AssetSlot::JacketVariant1, blob(&self.variant1)),
            (AssetSlot::JacketVariant2, blob(&self.variant2)),
        ]
    }
}

fn image_content_type(bytes: &[u8]) -> &'static str {
    if sniff::is_jpeg(bytes) {
        content_type::IMAGE_JPEG
    } else {
        content_type::IMAGE_PNG
    }
}

/// Turns a raw jacket image into the normalized jacket plus variants.
///
/// Called from the blocking worker pool. Must be deterministic: the same
/// input has to produce the same bytes or re-uploads stop deduplicating.
pub trait JacketRenderer: Send + Sync {
    fn render(&self, image: &[u8]) -> Result<RenderedJacket>;
}

/// Stores the uploaded image in all three slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

impl JacketRenderer for PassthroughRenderer {
    fn render(&self, image: &[u8]) -> Result<RenderedJacket> {
        let bytes = Bytes::copy_from_slice(image);
        Ok(RenderedJacket {
            jacket: bytes.clone(),
            variant1: bytes.clone(),
            variant2: bytes,
        })
    }
}

/// Runs `{program} [args..] <target>` once per output image, feeding the
/// upload on stdin and reading a PNG from stdout. Targets are `jacket`, `v1`
/// and `v3`. A render that outlives the timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn read_pipe(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut out)?;
    }
    Ok(out)
}

impl CommandRenderer {
    pub const TARGETS: [&'static str; 3] = ["jacket", "v1", "v3"];

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Split a configured command line on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        })
    }

    fn wait(&self, child: &mut Child, target: &str) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!("jacket renderer timed out after {:?} for {}", self.timeout, target);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(e).context("Failed to wait for jacket renderer");
                }
            }
        }
    }

    fn run(&self, target: &str, image: &[u8]) -> Result<Bytes> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn jacket renderer {:?}", self.program))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The renderer may write before it has read all of stdin: feed and
        // drain on separate threads.
        let (status, written, stdout, stderr) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                match stdin {
                    Some(mut stdin) => stdin.write_all(image),
                    None => Ok(()),
                }
            });
            let out = scope.spawn(move || read_pipe(stdout));
            let err = scope.spawn(move || read_pipe(stderr));

            let status = self.wait(&mut child, target);
            let joined = |name: &str| anyhow!("jacket renderer {} thread panicked", name);
            (
                status,
                writer.join().map_err(|_| joined("stdin")),
                out.join().map_err(|_| joined("stdout")),
                err.join().map_err(|_| joined("stderr")),
            )
        });

        let status = status?;
        match written? {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                return Err(e).context("Failed to write jacket to renderer")
            }
            _ => {}
        }
        let stdout = stdout?.context("Failed to read jacket renderer output")?;
        let stderr = stderr?.unwrap_or_default();

        if !status.success() {
            bail!(
                "jacket renderer exited with {} for {}: {}",
                status,
                target,
                String::from_utf8_lossy(&stderr).trim()
            );
        }
        if stdout.is_empty() {
            bail!("jacket renderer produced no output for {}", target);
        }
        Ok(Bytes::from(stdout))
    }
}

impl JacketRenderer for CommandRenderer {
    fn render(&self, image: &[u8]) -> Result<RenderedJacket> {
        let [jacket, v1, v3] = Self::TARGETS;
        Ok(RenderedJacket {
            jacket: self.run(jacket, image)?,
            variant1: self.run(v1, image)?,
            variant2: self.run(v3, image)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_dedups_to_one_hash() {
        let rendered = PassthroughRenderer.render(b"\x89PNG jacket").unwrap();
        let blobs = rendered.blobs();
        assert_eq!(blobs[0].1.hash, blobs[1].1.hash);
        assert_eq!(blobs[1].1.hash, blobs[2].1.hash);
        assert!(blobs.iter().all(|(_, b)| b.content_type == content_type::IMAGE_PNG));
    }

    #[test]
    fn test_blobs_cover_jacket_group() {
        let rendered = RenderedJacket {
            jacket: Bytes::from_static(b"j"),
            variant1: Bytes::from_static(b"1"),
            variant2: Bytes::from_static(b"3"),
        };
        let slots: Vec<_> = rendered.blobs().iter().map(|(s, _)| *s).collect();
        assert_eq!(slots, AssetSlot::JACKET_GROUP.to_vec());
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let renderer = CommandRenderer::new("/nonexistent/chartvault-renderer");
        assert!(renderer.render(b"img").is_err());
    }

    #[test]
    fn test_command_line_parsing() {
        assert!(CommandRenderer::from_command_line("   ").is_none());
        let renderer = CommandRenderer::from_command_line("sh render.sh --fast").unwrap();
        assert_eq!(renderer.program, "sh");
        assert_eq!(renderer.args, vec!["render.sh", "--fast"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_reads_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("render.sh");
        std::fs::write(&script, "printf '%s:' \"$1\"\ncat\n").unwrap();

        let line = format!("sh {}", script.display());
        let renderer = CommandRenderer::from_command_line(&line).unwrap();
        let rendered = renderer.render(b"img").unwrap();
        assert_eq!(rendered.jacket, Bytes::from_static(b"jacket:img"));
        assert_eq!(rendered.variant1, Bytes::from_static(b"v1:img"));
        assert_eq!(rendered.variant2, Bytes::from_static(b"v3:img"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_streams_large_images() {
        let renderer = CommandRenderer::from_command_line("sh -c cat").unwrap();
        let image = vec![7u8; 1 << 20];
        let rendered = renderer.render(&image).unwrap();
        assert_eq!(rendered.jacket.len(), image.len());
        assert_eq!(rendered.variant2, Bytes::from(image));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stall.sh");
        std::fs::write(&script, "exec sleep 5\n").unwrap();

        let line = format!("sh {}", script.display());
        let renderer = CommandRenderer::from_command_line(&line)
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = renderer.render(b"img").unwrap_err();
        assert!(err.to_string().contains("timed out"), "{:#}", err);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_passthrough_jpeg_keeps_jpeg_content_type() {
        let jpeg = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
        let rendered = PassthroughRenderer.render(&jpeg).unwrap();
        assert!(rendered
            .blobs()
            .iter()
            .all(|(_, b)| b.content_type == content_type::IMAGE_JPEG));
    }
}
