use std::time::Duration;

use crate::DecodedBlock;

/// Observer API for the block reader.
/// Observers are notified of every block handed out, along with the time it
/// took to assemble and normalize it. They cannot influence decoding.
pub trait Observer {
    /// Called once per block, before the block is returned to the caller.
    fn on_block(&mut self, block: &DecodedBlock, parse_time: Duration);
}

impl<T: Observer + ?Sized> Observer for &mut T {
    fn on_block(&mut self, block: &DecodedBlock, parse_time: Duration) {
        (**self).on_block(block, parse_time)
    }
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyObserver;

impl DummyObserver {
    /// Create a new observer.
    pub fn new() -> Self {
        Self
    }
}

impl Observer for DummyObserver {
    fn on_block(&mut self, _block: &DecodedBlock, _parse_time: Duration) {}
}

/// Observer recording the number and LIB of every block seen.
#[derive(Debug, Default)]
pub struct BlocksObserver {
    /// `(number, lib_num)` in arrival order.
    pub data: Vec<(u64, u64)>,
}

impl BlocksObserver {
    /// Create a new recording observer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Observer for BlocksObserver {
    fn on_block(&mut self, block: &DecodedBlock, _parse_time: Duration) {
        self.data.push((block.block.number, block.lib_num))
    }
}
