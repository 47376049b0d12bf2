//! Block arena with free-block coalescing.
//!
//! A `BlockAllocator<T>` hands out contiguous runs of `T` carved from a set of
//! fixed-size buffers. Buffers are never resized or moved, so a [`Block`]
//! handed out stays valid until it is freed. Freed runs are tracked in two
//! parallel sorted lists of start/end addresses and merged with their
//! neighbours on insertion, so the free list grows with the number of gaps,
//! not the number of frees.
//!
//! # Addressing
//!
//! ```text
//! address = (buffer index << 32) | offset
//! ```
//!
//! Offsets never reach 2^32, so the end of one buffer can never compare equal
//! to the start of the next and coalescing stays within a buffer.
//!
//! Freeing a block twice, or freeing a block the allocator never handed out,
//! is a caller bug. It is checked with `debug_assert!` only.

/// A run of elements inside one of the allocator's buffers.
///
/// This is 12 bytes: buffer (u32) + start (u32) + len (u32).
/// The default block is empty and owns nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Block {
    /// Index of the owning buffer
    pub buffer: u32,
    /// Offset of the first element within the buffer
    pub start: u32,
    /// Number of elements
    pub len: u32,
}

impl Block {
    /// Create a new block.
    #[inline]
    pub fn new(buffer: u32, start: u32, len: u32) -> Self {
        Self { buffer, start, len }
    }

    /// Number of elements in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Check if the block is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn addr(&self) -> u64 {
        pack(self.buffer, self.start)
    }

    #[inline]
    fn end_addr(&self) -> u64 {
        pack(self.buffer, self.start + self.len)
    }
}

#[inline]
fn pack(buffer: u32, offset: u32) -> u64 {
    ((buffer as u64) << 32) | offset as u64
}

#[inline]
fn unpack(addr: u64) -> (u32, u32) {
    ((addr >> 32) as u32, addr as u32)
}

/// Occupancy counters for a [`BlockAllocator`].
///
/// `used + free == capacity` holds after every operation. The unused tail of
/// the active buffer is counted as free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorStats {
    pub capacity: usize,
    pub used: usize,
    pub free: usize,
    pub buffers: usize,
    pub free_blocks: usize,
}

/// Capacity-bounded arena handing out exactly-sized runs of `T`.
#[derive(Debug)]
pub struct BlockAllocator<T> {
    buffers: Vec<Box<[T]>>,
    /// Buffer currently being carved from
    active: Option<u32>,
    /// Next unused offset in the active buffer
    tail: u32,
    /// Capacity of freshly allocated standard buffers
    buffer_size: usize,
    /// Sorted start addresses of free blocks
    free_starts: Vec<u64>,
    /// End addresses (exclusive), parallel to `free_starts`
    free_ends: Vec<u64>,
    used: usize,
}

impl<T: Clone + Default> BlockAllocator<T> {
    /// Create an allocator whose standard buffers hold `buffer_size` elements.
    ///
    /// No buffer is allocated until the first reservation.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffers: Vec::new(),
            active: None,
            tail: 0,
            buffer_size: buffer_size.max(1),
            free_starts: Vec::new(),
            free_ends: Vec::new(),
            used: 0,
        }
    }

    /// Reserve a run of `count` elements.
    ///
    /// Returns `None` only for `count == 0`. Prefers the first free block large
    /// enough, then the active buffer's tail, then a new buffer. Requests
    /// larger than the standard buffer size get a dedicated buffer.
    pub fn reserve_block(&mut self, count: usize) -> Option<Block> {
        if count == 0 {
            return None;
        }
        let count32 = u32::try_from(count).expect("block request exceeds u32 range");

        if let Some(block) = self.take_free(count32) {
            self.used += count;
            return Some(block);
        }

        if let Some(block) = self.take_tail(count32) {
            self.used += count;
            return Some(block);
        }

        if count > self.buffer_size {
            let buffer = self.push_buffer(count);
            self.used += count;
            return Some(Block::new(buffer, 0, count32));
        }

        self.set_active_buffer(self.buffer_size);
        let block = self.take_tail(count32);
        debug_assert!(block.is_some(), "fresh buffer cannot hold {count} elements");
        self.used += count;
        block
    }

    /// Return a block to the allocator, merging it with adjacent free blocks.
    pub fn free_block(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        debug_assert!(
            (block.buffer as usize) < self.buffers.len()
                && block.start as usize + block.len() <= self.buffers[block.buffer as usize].len(),
            "freeing a block the allocator does not own: {block:?}"
        );
        self.used -= block.len();
        self.insert_free(block.addr(), block.end_addr());
    }

    /// Seed or replace the buffer new blocks are carved from.
    ///
    /// The unused tail of the previous active buffer becomes a free block.
    pub fn set_active_buffer(&mut self, capacity: usize) {
        if let Some(active) = self.active {
            let cap = self.buffers[active as usize].len() as u32;
            if self.tail < cap {
                self.insert_free(pack(active, self.tail), pack(active, cap));
            }
        }
        let buffer = self.push_buffer(capacity.max(1));
        self.active = Some(buffer);
        self.tail = 0;
    }

    /// Resolve a block to its elements.
    #[inline]
    pub fn get(&self, block: Block) -> &[T] {
        if block.is_empty() {
            return &[];
        }
        let start = block.start as usize;
        &self.buffers[block.buffer as usize][start..start + block.len()]
    }

    /// Resolve a block to its elements, mutably.
    #[inline]
    pub fn get_mut(&mut self, block: Block) -> &mut [T] {
        if block.is_empty() {
            return &mut [];
        }
        let start = block.start as usize;
        &mut self.buffers[block.buffer as usize][start..start + block.len()]
    }

    /// Current occupancy counters.
    pub fn stats(&self) -> AllocatorStats {
        let capacity: usize = self.buffers.iter().map(|b| b.len()).sum();
        let gaps: u64 = self
            .free_starts
            .iter()
            .zip(&self.free_ends)
            .map(|(s, e)| e - s)
            .sum();
        let tail = match self.active {
            Some(active) => self.buffers[active as usize].len() - self.tail as usize,
            None => 0,
        };
        AllocatorStats {
            capacity,
            used: self.used,
            free: gaps as usize + tail,
            buffers: self.buffers.len(),
            free_blocks: self.free_starts.len(),
        }
    }

    /// Iterate over the tracked free blocks in address order.
    ///
    /// The active buffer's unused tail is not included.
    pub fn free_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.free_starts.iter().zip(&self.free_ends).map(|(&s, &e)| {
            let (buffer, start) = unpack(s);
            Block::new(buffer, start, (e - s) as u32)
        })
    }

    fn push_buffer(&mut self, capacity: usize) -> u32 {
        let index = self.buffers.len() as u32;
        self.buffers.push(vec![T::default(); capacity].into_boxed_slice());
        index
    }

    fn take_free(&mut self, count: u32) -> Option<Block> {
        let i = self
            .free_starts
            .iter()
            .zip(&self.free_ends)
            .position(|(s, e)| e - s >= count as u64)?;
        let start = self.free_starts[i];
        if self.free_ends[i] - start == count as u64 {
            self.free_starts.remove(i);
            self.free_ends.remove(i);
        } else {
            self.free_starts[i] += count as u64;
        }
        let (buffer, offset) = unpack(start);
        Some(Block::new(buffer, offset, count))
    }

    fn take_tail(&mut self, count: u32) -> Option<Block> {
        let active = self.active?;
        let cap = self.buffers[active as usize].len() as u32;
        if cap - self.tail < count {
            return None;
        }
        let block = Block::new(active, self.tail, count);
        self.tail += count;
        Some(block)
    }

    fn insert_free(&mut self, start: u64, end: u64) {
        let idx = self.free_starts.partition_point(|&s| s < start);
        debug_assert!(idx == 0 || self.free_ends[idx - 1] <= start, "double free at {start:#x}");
        debug_assert!(
            idx == self.free_starts.len() || end <= self.free_starts[idx],
            "double free at {start:#x}"
        );

        let merges_prev = idx > 0 && self.free_ends[idx - 1] == start;
        let merges_next = idx < self.free_starts.len() && self.free_starts[idx] == end;

        match (merges_prev, merges_next) {
            (true, true) => {
                self.free_ends[idx - 1] = self.free_ends[idx];
                self.free_starts.remove(idx);
                self.free_ends.remove(idx);
            }
            (true, false) => self.free_ends[idx - 1] = end,
            (false, true) => self.free_starts[idx] = start,
            (false, false) => {
                self.free_starts.insert(idx, start);
                self.free_ends.insert(idx, end);
            }
        }
    }
}
