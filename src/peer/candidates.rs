//! Buffering of remote ICE candidates that arrive too early.

use std::{
    cell::RefCell,
    collections::VecDeque,
};

use crate::platform::IceCandidate;

/// FIFO buffer of remote [`IceCandidate`]s received while no remote
/// description exists yet.
///
/// Drained (in arrival order) on the first signaling-state change that
/// yields a remote description; cleared on peer connection teardown.
#[derive(Debug, Default)]
pub struct IceCandidateBuffer(RefCell<VecDeque<IceCandidate>>);

impl IceCandidateBuffer {
    /// Appends the provided candidate to the buffer.
    #[inline]
    pub fn push(&self, candidate: IceCandidate) {
        self.0.borrow_mut().push_back(candidate);
    }

    /// Takes every buffered candidate out, preserving arrival order.
    #[inline]
    #[must_use]
    pub fn drain(&self) -> Vec<IceCandidate> {
        self.0.borrow_mut().drain(..).collect()
    }

    /// Drops every buffered candidate.
    #[inline]
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Indicates whether the buffer holds no candidates.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u16) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n}"),
            sdp_m_line_index: Some(n),
            sdp_mid: None,
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let buffer = IceCandidateBuffer::default();
        buffer.push(candidate(1));
        buffer.push(candidate(2));
        buffer.push(candidate(3));

        let drained = buffer.drain();
        assert_eq!(
            drained.iter().map(|c| c.sdp_m_line_index).collect::<Vec<_>>(),
            vec![Some(1), Some(2), Some(3)],
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let buffer = IceCandidateBuffer::default();
        buffer.push(candidate(1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }
}
