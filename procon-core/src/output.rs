//! Report transport traits and error types.

use core::future::Future;

use heapless::Deque;
use procon_proto::MAX_REPORT_LEN;

/// Error type for report transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// USB/radio I/O error.
    Io,
    /// Link not ready (e.g., not enumerated or not connected).
    NotReady,
    /// Transmit queue full.
    Busy,
    /// Report longer than the link accepts.
    Oversized,
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkError::Io => f.write_str("link I/O error"),
            LinkError::NotReady => f.write_str("link not ready"),
            LinkError::Busy => f.write_str("link busy"),
            LinkError::Oversized => f.write_str("report too long"),
        }
    }
}

/// Non-blocking report transport used from inside the control tick.
///
/// Implementations must return immediately; a transport that cannot take the
/// report right now reports [`LinkError::Busy`].
pub trait ReportLink {
    /// Hand one complete report to the transport.
    fn try_transmit(&mut self, report: &[u8]) -> Result<(), LinkError>;
}

/// Async trait for the device endpoint that finally carries reports.
pub trait ReportSink {
    /// Write one report. May wait until the endpoint is free.
    fn send(&mut self, report: &[u8]) -> impl Future<Output = Result<(), LinkError>>;
}

/// A queued report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    len: usize,
    bytes: [u8; MAX_REPORT_LEN],
}

impl Frame {
    /// Copy `report` into a frame.
    pub fn new(report: &[u8]) -> Result<Self, LinkError> {
        if report.len() > MAX_REPORT_LEN {
            return Err(LinkError::Oversized);
        }
        let mut frame = Self {
            len: report.len(),
            bytes: [0; MAX_REPORT_LEN],
        };
        frame.bytes[..report.len()].copy_from_slice(report);
        Ok(frame)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Bounded queue bridging the synchronous tick and an async [`ReportSink`].
///
/// The tick transmits into the queue; the firmware drains it to the endpoint
/// once the tick has finished.
#[derive(Debug)]
pub struct FrameQueue<const N: usize> {
    frames: Deque<Frame, N>,
}

impl<const N: usize> FrameQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: Deque::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Take the oldest queued frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Write every queued frame to `sink`, oldest first.
    ///
    /// Returns the number of frames written. On error the failing frame is
    /// dropped and the rest stay queued.
    pub async fn flush<S: ReportSink>(&mut self, sink: &mut S) -> Result<usize, LinkError> {
        let mut written = 0;
        while let Some(frame) = self.frames.pop_front() {
            sink.send(frame.as_bytes()).await?;
            written += 1;
        }
        Ok(written)
    }
}

impl<const N: usize> Default for FrameQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReportLink for FrameQueue<N> {
    fn try_transmit(&mut self, report: &[u8]) -> Result<(), LinkError> {
        let frame = Frame::new(report)?;
        self.frames.push_back(frame).map_err(|_| LinkError::Busy)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::pin::Pin;
    use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
    use std::vec::Vec;

    struct MockSink {
        sent: Vec<Vec<u8>>,
        fail_after: Option<usize>,
    }

    impl ReportSink for MockSink {
        fn send(&mut self, report: &[u8]) -> impl Future<Output = Result<(), LinkError>> {
            let result = match self.fail_after {
                Some(n) if self.sent.len() >= n => Err(LinkError::Io),
                _ => {
                    self.sent.push(report.to_vec());
                    Ok(())
                }
            };
            core::future::ready(result)
        }
    }

    // Helper to run a future to completion (simple blocking executor)
    fn block_on<F: Future>(mut f: F) -> F::Output {
        fn noop_raw_waker() -> RawWaker {
            fn noop(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(core::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut cx = Context::from_waker(&waker);

        // SAFETY: We don't move f after pinning
        let mut f = unsafe { Pin::new_unchecked(&mut f) };

        loop {
            match f.as_mut().poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {
                    panic!("Mock future returned Pending unexpectedly");
                }
            }
        }
    }

    #[test]
    fn test_queue_full_reports_busy() {
        let mut queue: FrameQueue<2> = FrameQueue::new();
        assert_eq!(queue.try_transmit(&[1]), Ok(()));
        assert_eq!(queue.try_transmit(&[2]), Ok(()));
        assert_eq!(queue.try_transmit(&[3]), Err(LinkError::Busy));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_oversized_report_rejected() {
        let mut queue: FrameQueue<2> = FrameQueue::new();
        let report = [0u8; MAX_REPORT_LEN + 1];
        assert_eq!(queue.try_transmit(&report), Err(LinkError::Oversized));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_frame_copies_report() {
        let frame = Frame::new(&[0x30, 0x81]).unwrap();
        assert_eq!(frame.as_bytes(), [0x30, 0x81]);
        assert_eq!(Frame::new(&[0; MAX_REPORT_LEN + 1]), Err(LinkError::Oversized));
    }

    #[test]
    fn test_flush_in_order() {
        let mut queue: FrameQueue<4> = FrameQueue::new();
        queue.try_transmit(&[0x30, 1]).unwrap();
        queue.try_transmit(&[0x21, 2, 3]).unwrap();

        let mut sink = MockSink {
            sent: Vec::new(),
            fail_after: None,
        };
        assert_eq!(block_on(queue.flush(&mut sink)), Ok(2));
        assert_eq!(sink.sent, [std::vec![0x30, 1], std::vec![0x21, 2, 3]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_error_keeps_remaining_frames() {
        let mut queue: FrameQueue<4> = FrameQueue::new();
        for i in 0..3u8 {
            queue.try_transmit(&[i]).unwrap();
        }

        let mut sink = MockSink {
            sent: Vec::new(),
            fail_after: Some(1),
        };
        assert_eq!(block_on(queue.flush(&mut sink)), Err(LinkError::Io));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|f| f.as_bytes()[0]), Some(2));
    }
}
