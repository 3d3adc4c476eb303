//! Block-allocated scratch byte buffers.
//!
//! A [`FixedByteBufferPool`] carves memory into *spaces* of
//! [`BLOCKS_PER_SPACE`] equally sized blocks. A rental takes a contiguous run
//! of blocks inside one space; a new space is added only when no existing
//! space has a long enough free run. Rentals are identified by a
//! [`FixedByteBuffer`] token, and every access re-validates the token against
//! the block ledger so a returned or foreign token cannot read live data.

use crate::error::CollectionError;

/// Blocks per space.
pub const BLOCKS_PER_SPACE: usize = 40;

/// Token for a live rental from a [`FixedByteBufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedByteBuffer {
    space: u32,
    first_block: u32,
    block_count: u32,
    serial: u64,
    len: usize,
}

impl FixedByteBuffer {
    /// Requested length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct Space {
    bytes: Box<[u8]>,
    /// Rental serial per block; 0 marks a free block.
    ledger: [u64; BLOCKS_PER_SPACE],
    largest_free_run: usize,
}

impl Space {
    fn new(block_size: usize) -> Self {
        Self {
            bytes: vec![0; block_size * BLOCKS_PER_SPACE].into_boxed_slice(),
            ledger: [0; BLOCKS_PER_SPACE],
            largest_free_run: BLOCKS_PER_SPACE,
        }
    }

    fn first_free_run(&self, blocks: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for (index, serial) in self.ledger.iter().enumerate() {
            if *serial == 0 {
                if run_len == 0 {
                    run_start = index;
                }
                run_len += 1;
                if run_len == blocks {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    fn recompute_largest_free_run(&mut self) {
        let mut largest = 0;
        let mut current = 0;
        for serial in &self.ledger {
            if *serial == 0 {
                current += 1;
                largest = largest.max(current);
            } else {
                current = 0;
            }
        }
        self.largest_free_run = largest;
    }

    fn owns(&self, buffer: &FixedByteBuffer) -> bool {
        let first = buffer.first_block as usize;
        let end = first + buffer.block_count as usize;
        end <= BLOCKS_PER_SPACE && self.ledger[first..end].iter().all(|s| *s == buffer.serial)
    }
}

/// Pool of fixed-size byte spaces serving contiguous block rentals.
pub struct FixedByteBufferPool {
    block_size: usize,
    spaces: Vec<Space>,
    next_serial: u64,
    rented_blocks: usize,
}

impl FixedByteBufferPool {
    /// Create a pool whose spaces can each hold one `max_buffer_size` rental.
    ///
    /// No memory is reserved until the first rental.
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            block_size: max_buffer_size.div_ceil(BLOCKS_PER_SPACE).max(1),
            spaces: Vec::new(),
            next_serial: 1,
            rented_blocks: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Largest rental this pool serves.
    pub fn max_buffer_size(&self) -> usize {
        self.block_size * BLOCKS_PER_SPACE
    }

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    /// Blocks currently held by live rentals.
    pub fn rented_blocks(&self) -> usize {
        self.rented_blocks
    }

    /// Rent a zero-filled buffer of `len` bytes.
    pub fn rent(&mut self, len: usize) -> Result<FixedByteBuffer, CollectionError> {
        if len == 0 {
            return Err(CollectionError::EmptyRental);
        }
        if len > self.max_buffer_size() {
            return Err(CollectionError::BufferTooLarge {
                requested: len,
                max: self.max_buffer_size(),
            });
        }
        let blocks = len.div_ceil(self.block_size);

        let space_index = match self
            .spaces
            .iter()
            .position(|space| space.largest_free_run >= blocks)
        {
            Some(index) => index,
            None => {
                self.spaces.push(Space::new(self.block_size));
                log::debug!(
                    "FixedByteBufferPool: added space {} ({} bytes)",
                    self.spaces.len() - 1,
                    self.block_size * BLOCKS_PER_SPACE
                );
                self.spaces.len() - 1
            }
        };

        let serial = self.next_serial;
        self.next_serial += 1;

        let block_size = self.block_size;
        let space = &mut self.spaces[space_index];
        let first_block = space
            .first_free_run(blocks)
            .ok_or(CollectionError::InvalidRental)?;
        space.ledger[first_block..first_block + blocks].fill(serial);
        space.recompute_largest_free_run();
        let start = first_block * block_size;
        space.bytes[start..start + len].fill(0);

        self.rented_blocks += blocks;
        Ok(FixedByteBuffer {
            space: space_index as u32,
            first_block: first_block as u32,
            block_count: blocks as u32,
            serial,
            len,
        })
    }

    /// Rent a buffer and copy `data` into it.
    pub fn rent_and_copy(&mut self, data: &[u8]) -> Result<FixedByteBuffer, CollectionError> {
        let buffer = self.rent(data.len())?;
        self.bytes_mut(&buffer)?.copy_from_slice(data);
        Ok(buffer)
    }

    fn space_for(&self, buffer: &FixedByteBuffer) -> Result<&Space, CollectionError> {
        self.spaces
            .get(buffer.space as usize)
            .filter(|space| space.owns(buffer))
            .ok_or(CollectionError::InvalidRental)
    }

    pub fn bytes(&self, buffer: &FixedByteBuffer) -> Result<&[u8], CollectionError> {
        let start = buffer.first_block as usize * self.block_size;
        let space = self.space_for(buffer)?;
        Ok(&space.bytes[start..start + buffer.len])
    }

    pub fn bytes_mut(&mut self, buffer: &FixedByteBuffer) -> Result<&mut [u8], CollectionError> {
        self.space_for(buffer)?;
        let start = buffer.first_block as usize * self.block_size;
        let space = &mut self.spaces[buffer.space as usize];
        Ok(&mut space.bytes[start..start + buffer.len])
    }

    /// Release a rental. Returning the same token twice fails.
    pub fn give_back(&mut self, buffer: FixedByteBuffer) -> Result<(), CollectionError> {
        self.space_for(&buffer)?;
        let space = &mut self.spaces[buffer.space as usize];
        let first = buffer.first_block as usize;
        space.ledger[first..first + buffer.block_count as usize].fill(0);
        space.recompute_largest_free_run();
        self.rented_blocks -= buffer.block_count as usize;
        Ok(())
    }
}

impl std::fmt::Debug for FixedByteBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedByteBufferPool")
            .field("block_size", &self.block_size)
            .field("spaces", &self.spaces.len())
            .field("rented_blocks", &self.rented_blocks)
            .finish()
    }
}
