use std::collections::VecDeque;

/// Bounded byte ring holding the most recent audio
///
/// Appending past capacity drops the oldest bytes first, so the window always
/// holds the trailing `capacity` bytes fed into it. Trimming never splits a
/// frame: the window starts on a frame boundary of the stream fed since the
/// last `clear`, even when pushes are not frame sized.
#[derive(Debug, Clone)]
pub struct PcmWindow {
    bytes: VecDeque<u8>,
    capacity: usize,
    frame_size: usize,
    fed: u64,
}

impl PcmWindow {
    pub fn new(capacity: usize) -> Self {
        Self::with_frame_size(capacity, 1)
    }

    pub fn with_frame_size(capacity: usize, frame_size: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
            frame_size: frame_size.max(1),
            fed: 0,
        }
    }

    pub fn push(&mut self, pcm: &[u8]) {
        if self.capacity == 0 {
            return;
        }

        self.fed += pcm.len() as u64;

        if pcm.len() >= self.capacity {
            self.bytes.clear();
            self.bytes.extend(&pcm[pcm.len() - self.capacity..]);
        } else {
            let overflow = (self.bytes.len() + pcm.len()).saturating_sub(self.capacity);
            self.bytes.drain(..overflow);
            self.bytes.extend(pcm);
        }

        let start = self.fed - self.bytes.len() as u64;
        let misaligned = (start % self.frame_size as u64) as usize;
        if misaligned != 0 {
            let skip = (self.frame_size - misaligned).min(self.bytes.len());
            self.bytes.drain(..skip);
        }
    }

    /// Copy of the buffered bytes, oldest first
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.fed = 0;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
