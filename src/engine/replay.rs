// ReplaySource - captures recorded as JSON lines
//
// One `Capture` per line, in acquisition order. Blank lines are skipped. The
// requested centre is ignored; the coordinator moves the sweep to whichever
// step each recorded capture belongs to.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::PipelineError;
use crate::spectrum::capture::Capture;

use super::backend::CaptureSource;

pub struct ReplaySource {
    captures: VecDeque<Capture>,
    replayed: usize,
}

impl ReplaySource {
    /// Parse every line up front
    ///
    /// # Returns
    /// * `Err(PipelineError::MalformedCapture)` - a line is not a capture
    /// * `Err(PipelineError::CaptureFailed)` - the reader failed
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let mut captures = VecDeque::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let capture: Capture =
                serde_json::from_str(&line).map_err(|err| PipelineError::MalformedCapture {
                    reason: format!("line {}: {}", index + 1, err),
                })?;
            captures.push_back(capture);
        }
        log::info!("[ReplaySource] Loaded {} captures", captures.len());
        Ok(Self {
            captures,
            replayed: 0,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let file = File::open(path.as_ref()).map_err(|err| PipelineError::CaptureFailed {
            details: format!("{}: {}", path.as_ref().display(), err),
        })?;
        Self::from_reader(file)
    }

    /// Captures not yet replayed
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn replayed(&self) -> usize {
        self.replayed
    }
}

impl CaptureSource for ReplaySource {
    fn capture(&mut self, _center_hz: f64) -> Result<Capture, PipelineError> {
        let capture = self.captures.pop_front().ok_or_else(|| PipelineError::CaptureFailed {
            details: format!("replay exhausted after {} captures", self.replayed),
        })?;
        self.replayed += 1;
        Ok(capture)
    }

    fn is_recorded(&self) -> bool {
        true
    }
}
