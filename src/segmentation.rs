//! Typed results of the external organ segmentation worker and the one-shot
//! channel that hands them to the UI thread.

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use ndarray::Array2;
use thiserror::Error;

use crate::slice_extractor::Contour;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SegmentationError {
    #[error("Segmentation worker failed: {0}")]
    Worker(String),

    #[error("Segmentation worker dropped its result channel")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrganId(pub String);

impl fmt::Display for OrganId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrganId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Binary mask of one organ, congruent with its slice's pixel grid.
#[derive(Clone, Debug, PartialEq)]
pub struct OrganMask {
    pub organ: OrganId,
    pub mask: Array2<u8>,
}

/// Masks found on one slice, in the order the worker reported them.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationResult {
    slice_index: usize,
    masks: Vec<OrganMask>,
}

impl SegmentationResult {
    pub fn new(slice_index: usize, masks: Vec<OrganMask>) -> Self {
        Self { slice_index, masks }
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    pub fn masks(&self) -> &[OrganMask] {
        &self.masks
    }
}

/// Immutable snapshot of a finished segmentation run.
#[derive(Clone, Debug)]
pub struct SegmentationBatch {
    results: Arc<[SegmentationResult]>,
}

impl Default for SegmentationBatch {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SegmentationBatch {
    pub fn new(results: Vec<SegmentationResult>) -> Self {
        Self {
            results: results.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn for_slice(&self, slice_index: usize) -> Option<&SegmentationResult> {
        self.results
            .iter()
            .find(|result| result.slice_index == slice_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentationResult> {
        self.results.iter()
    }
}

/// Traced boundary of one organ on one slice.
#[derive(Clone, Debug, PartialEq)]
pub struct OrganOutline {
    pub organ: OrganId,
    pub contours: Vec<Contour>,
}

pub type SegmentationOutcome = Result<SegmentationBatch, SegmentationError>;

/// Worker side of the handoff; consumed by [`SegmentationSender::complete`].
#[derive(Debug)]
pub struct SegmentationSender {
    sender: oneshot::Sender<SegmentationOutcome>,
}

/// UI side of the handoff.
#[derive(Debug)]
pub struct SegmentationReceiver {
    receiver: oneshot::Receiver<SegmentationOutcome>,
}

/// Create a one-shot channel carrying a complete result list.
pub fn handoff() -> (SegmentationSender, SegmentationReceiver) {
    let (sender, receiver) = oneshot::channel();
    (SegmentationSender { sender }, SegmentationReceiver { receiver })
}

impl SegmentationSender {
    /// Hand the results over. Returns `false` if the receiver is gone.
    pub fn complete(self, outcome: Result<Vec<SegmentationResult>, SegmentationError>) -> bool {
        self.sender
            .send(outcome.map(SegmentationBatch::new))
            .is_ok()
    }
}

impl SegmentationReceiver {
    /// Non-blocking check; `None` while the worker is still running.
    pub fn try_recv(&mut self) -> Option<SegmentationOutcome> {
        match self.receiver.try_recv() {
            Ok(Some(outcome)) => Some(outcome),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(SegmentationError::Cancelled)),
        }
    }

    pub async fn wait(self) -> SegmentationOutcome {
        self.receiver
            .await
            .unwrap_or(Err(SegmentationError::Cancelled))
    }
}
