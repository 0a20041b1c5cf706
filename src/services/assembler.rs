// Frame reassembly
//
// Collects partial frames into one payload and releases it only at the
// message boundary.

use super::transport::Frame;
use crate::models::DecodeError;

/// Accumulates frames until the end-of-message boundary.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl MessageAssembler {
    /// # Arguments
    /// * `limit` - Largest payload accepted, in bytes
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Feed one data frame.
    ///
    /// # Returns
    /// - `None` while the message is incomplete
    /// - `Some(Ok(payload))` once the last frame of a message arrived
    /// - `Some(Err(TooLarge))` at the boundary of a message that overflowed
    ///
    /// Close frames carry no data and are ignored here.
    pub fn push(&mut self, frame: Frame) -> Option<Result<Vec<u8>, DecodeError>> {
        let (data, last) = match frame {
            Frame::Text { data, last } => (data.into_bytes(), last),
            Frame::Binary { data, last } => (data, last),
            Frame::Close => return None,
        };

        if !self.overflowed {
            if self.buffer.len() + data.len() > self.limit {
                // Keep consuming until the boundary, but drop the bytes
                self.overflowed = true;
                self.buffer = Vec::new();
            } else {
                self.buffer.extend_from_slice(&data);
            }
        }

        if !last {
            return None;
        }

        if std::mem::take(&mut self.overflowed) {
            return Some(Err(DecodeError::TooLarge { limit: self.limit }));
        }

        Some(Ok(std::mem::take(&mut self.buffer)))
    }

    /// Bytes buffered for the message in progress
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn partial(data: &str) -> Frame {
        Frame::Text {
            data: data.to_string(),
            last: false,
        }
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = MessageAssembler::new(1024);
        let payload = assembler.push(Frame::text("{\"type\":\"init\"}")).unwrap().unwrap();
        assert_eq!(payload, b"{\"type\":\"init\"}");
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_waits_for_boundary() {
        let mut assembler = MessageAssembler::new(1024);
        assert!(assembler.push(partial("{\"type\":")).is_none());
        assert!(assembler.push(partial("\"upd")).is_none());
        assert_eq!(assembler.buffered(), 12);

        let payload = assembler.push(Frame::text("ate\"}")).unwrap().unwrap();
        assert_eq!(payload, b"{\"type\":\"update\"}");
    }

    #[test]
    fn test_binary_and_text_frames_mix() {
        let mut assembler = MessageAssembler::new(1024);
        assert!(assembler
            .push(Frame::Binary {
                data: b"{\"a\":".to_vec(),
                last: false
            })
            .is_none());
        let payload = assembler.push(Frame::text("1}")).unwrap().unwrap();
        assert_eq!(payload, b"{\"a\":1}");
    }

    #[test]
    fn test_oversized_message_is_rejected_and_next_is_clean() {
        let mut assembler = MessageAssembler::new(8);
        assert!(assembler.push(partial("0123456")).is_none());
        assert!(assembler.push(partial("789")).is_none());

        let result = assembler.push(Frame::text("x")).unwrap();
        assert!(matches!(result, Err(DecodeError::TooLarge { limit: 8 })));

        let payload = assembler.push(Frame::text("{}")).unwrap().unwrap();
        assert_eq!(payload, b"{}");
    }

    #[test]
    fn test_close_frame_is_ignored() {
        let mut assembler = MessageAssembler::new(16);
        assert!(assembler.push(Frame::Close).is_none());
    }

    proptest! {
        #[test]
        fn prop_split_payload_reassembles_identically(
            payload in "[ -~]{1,200}",
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(payload.len())).collect();
            points.sort_unstable();
            points.dedup();

            let mut assembler = MessageAssembler::new(4096);
            let mut start = 0;
            for point in points.into_iter().filter(|p| *p > 0) {
                prop_assert!(assembler.push(partial(&payload[start..point])).is_none());
                start = point;
            }
            let whole = assembler.push(Frame::text(&payload[start..])).unwrap().unwrap();

            prop_assert_eq!(whole, payload.as_bytes().to_vec());
        }
    }
}
