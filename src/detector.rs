//! Face detection interface.
//!
//! Detection and embedding run outside this crate (an ONNX pipeline, a
//! remote service, whatever the deployment provides). The engine only
//! consumes the output: per-face encodings with pixel bounding boxes.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::db::BoundingBox;

/// A detected face: its feature encoding and where it sits in the
/// image.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub encoding: Vec<f32>,
    pub bounding_box: BoundingBox,
}

pub trait FaceDetector: Send + Sync {
    /// Detect faces in an encoded image. An empty result is a valid
    /// outcome, not an error.
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>>;
}

/// Wire format the external detector emits: a JSON array of faces.
#[derive(Debug, Deserialize)]
struct WireFace {
    encoding: Vec<f32>,
    /// [top, right, bottom, left] pixel coordinates.
    bounding_box: [i32; 4],
}

/// Detector that shells out to an external command. Image bytes go to
/// the child's stdin; faces come back as JSON on its stdout.
pub struct CommandDetector {
    command: Vec<String>,
}

impl CommandDetector {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            bail!("no detector command configured");
        }
        Ok(Self { command })
    }
}

impl FaceDetector for CommandDetector {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>> {
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn detector {:?}", self.command[0]))?;

        let mut stdin = child.stdin.take().context("detector stdin unavailable")?;

        // Feed stdin from its own thread while wait_with_output drains
        // stdout and stderr. Writing inline can deadlock: a child that
        // fills an output pipe before consuming its input blocks, and
        // so would our write.
        let payload = image.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&payload));

        let output = child
            .wait_with_output()
            .context("failed to wait for detector")?;

        match writer.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit after reading a prefix.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(anyhow::Error::new(e).context("failed to send image to detector"))
            }
            Err(_) => bail!("detector stdin writer panicked"),
        }
        if !output.status.success() {
            bail!(
                "detector exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let wire: Vec<WireFace> =
            serde_json::from_slice(&output.stdout).context("invalid detector output")?;
        Ok(wire
            .into_iter()
            .map(|face| DetectedFace {
                encoding: face.encoding,
                bounding_box: BoundingBox {
                    top: face.bounding_box[0],
                    right: face.bounding_box[1],
                    bottom: face.bounding_box[2],
                    left: face.bounding_box[3],
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(CommandDetector::new(Vec::new()).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_detect_survives_chatty_child() {
        // The child floods stderr beyond the pipe capacity before it
        // reads any input; the large image forces our stdin write past
        // the pipe capacity too. Both sides must make progress.
        let script = "head -c 131072 /dev/zero | tr '\\0' 'x' >&2; cat > /dev/null; echo '[]'";
        let detector =
            CommandDetector::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap();

        let image = vec![0u8; 4 * 1024 * 1024];
        let faces = detector.detect(&image).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_reports_stderr() {
        let detector = CommandDetector::new(vec![
            "sh".into(),
            "-c".into(),
            "echo 'model load failed' >&2; exit 3".into(),
        ])
        .unwrap();

        let err = detector.detect(b"img").unwrap_err();
        assert!(err.to_string().contains("model load failed"));
    }

    #[test]
    fn test_wire_format_parses() {
        let json = r#"[{"encoding": [0.1, 0.2], "bounding_box": [10, 60, 50, 20]}]"#;
        let wire: Vec<WireFace> = serde_json::from_str(json).unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].encoding, vec![0.1, 0.2]);
        assert_eq!(wire[0].bounding_box, [10, 60, 50, 20]);
    }
}
