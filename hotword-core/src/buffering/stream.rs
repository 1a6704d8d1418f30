//! Persistent byte accumulator feeding fixed-size decode windows.
//!
//! Network packets rarely line up with the decoder's window size. Bytes are
//! appended in arrival order and windows are cut strictly from the front, so
//! whatever does not fill a window waits for the next packet and sample
//! alignment is preserved across packet boundaries.

/// Owned exclusively by the detection thread; no locking.
#[derive(Debug)]
pub struct StreamBuffer {
    bytes: Vec<u8>,
    window: usize,
}

impl StreamBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(window * 4),
            window,
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Remove and return exactly one window from the front, if available.
    pub fn next_window(&mut self) -> Option<Vec<u8>> {
        if self.bytes.len() < self.window {
            return None;
        }
        Some(self.bytes.drain(..self.window).collect())
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_fires_once_enough_bytes_arrive() {
        let mut buffer = StreamBuffer::new(960);
        buffer.append(&[1; 600]);
        assert!(buffer.next_window().is_none());

        buffer.append(&[2; 400]);
        let window = buffer.next_window().expect("1000 >= 960");
        assert_eq!(window.len(), 960);
        assert_eq!(&window[..600], &[1; 600][..]);
        assert_eq!(&window[600..], &[2; 360][..]);
        assert_eq!(buffer.len(), 40);
        assert!(buffer.next_window().is_none());
    }

    #[test]
    fn windows_concatenate_to_the_appended_stream() {
        let mut buffer = StreamBuffer::new(7);
        let mut appended = Vec::new();
        let mut consumed = Vec::new();

        for (i, size) in [3usize, 11, 1, 0, 20, 6, 9].into_iter().enumerate() {
            let data: Vec<u8> = (0..size).map(|j| (i * 31 + j) as u8).collect();
            appended.extend_from_slice(&data);
            buffer.append(&data);
            while let Some(window) = buffer.next_window() {
                assert_eq!(window.len(), 7);
                consumed.extend_from_slice(&window);
            }
            assert!(buffer.len() < 7);
        }

        assert_eq!(&appended[..consumed.len()], &consumed[..]);
        assert_eq!(appended.len() - consumed.len(), buffer.len());
    }

    #[test]
    fn clear_discards_pending_bytes() {
        let mut buffer = StreamBuffer::new(4);
        buffer.append(&[9; 10]);
        buffer.next_window();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.next_window().is_none());
    }
}
