//! The ordered queue of in-flight requests on one connection.
//!
//! Requests are answered strictly in the order they were sent, so a reply
//! always belongs to the queue's head. The queue is bounded; its entries
//! carry the handle of the result stream the reply must be applied to.

use std::collections::VecDeque;

use crate::stream::StreamHandle;

/// Default bound on the number of requests awaiting replies.
pub(crate) const DEFAULT_PIPELINE_MAX: usize = 64;

/// What was asked of the server, and on whose behalf.
#[derive(Debug, Clone)]
pub(crate) enum RequestKind {
    Init,
    Run(StreamHandle),
    PullAll(StreamHandle),
    DiscardAll(StreamHandle),
    AckFailure,
    Reset,
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Init => "INIT",
            RequestKind::Run(_) => "RUN",
            RequestKind::PullAll(_) => "PULL_ALL",
            RequestKind::DiscardAll(_) => "DISCARD_ALL",
            RequestKind::AckFailure => "ACK_FAILURE",
            RequestKind::Reset => "RESET",
        }
    }

    /// The stream the request belongs to, when it belongs to one.
    pub fn stream(&self) -> Option<&StreamHandle> {
        match self {
            RequestKind::Run(s) | RequestKind::PullAll(s) | RequestKind::DiscardAll(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Pipeline {
    queue: VecDeque<RequestKind>,
    limit: usize,
}

impl Pipeline {
    pub fn new(limit: usize) -> Self {
        Pipeline {
            queue: VecDeque::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.limit
    }

    /// Slots left for user requests.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.queue.len())
    }

    /// Append a user request. The caller must have checked capacity.
    pub fn push(&mut self, kind: RequestKind) {
        self.queue.push_back(kind);
    }

    pub fn front(&self) -> Option<&RequestKind> {
        self.queue.front()
    }

    pub fn pop_front(&mut self) -> Option<RequestKind> {
        self.queue.pop_front()
    }
}
