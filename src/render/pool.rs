use std::collections::HashMap;
use std::mem;

/// Requested shape of a pooled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub count: usize,
    pub stride: usize,
}

impl BufferDescriptor {
    pub fn new(count: usize, stride: usize) -> Self {
        Self { count, stride }
    }

    pub fn of<T>(count: usize) -> Self {
        Self::new(count, mem::size_of::<T>())
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.count * self.stride) as u64
    }

    /// Pool bucket this request is served from.
    fn bucket(&self) -> Self {
        Self::new(self.count.max(1).next_power_of_two(), self.stride)
    }
}

/// Creates backend buffers on behalf of a [`BufferPool`].
pub trait BufferAllocator {
    type Buffer;

    fn allocate(&mut self, descriptor: &BufferDescriptor) -> Self::Buffer;
}

/// A buffer checked out of a [`BufferPool`]. Hand it back with
/// [`BufferPool::release_buffer`].
#[derive(Debug)]
pub struct BufferRef<B> {
    pub(crate) buffer: B,
    pub(crate) descriptor: BufferDescriptor,
}

impl<B> BufferRef<B> {
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// The bucket the buffer was served from.
    pub fn descriptor(&self) -> BufferDescriptor {
        self.descriptor
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: usize,
    pub released: usize,
    pub allocated: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> usize {
        self.acquired.saturating_sub(self.released)
    }
}

/// Transient buffer pool with power-of-two size buckets.
///
/// A request is served from the smallest bucket that fits it, so the buffer
/// handed out may be larger than asked for but never smaller.
///
/// Released buffers stay retired until [`end_frame`](Self::end_frame). Uploads
/// recorded earlier in the frame may not have executed yet, so a buffer is
/// never handed out twice between two frame boundaries.
pub struct BufferPool<A: BufferAllocator> {
    allocator: A,
    free: HashMap<BufferDescriptor, Vec<A::Buffer>>,
    retired: Vec<BufferRef<A::Buffer>>,
    stats: PoolStats,
}

impl<A: BufferAllocator> BufferPool<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            free: HashMap::new(),
            retired: Vec::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn get_buffer(&mut self, descriptor: BufferDescriptor) -> BufferRef<A::Buffer> {
        let bucket = descriptor.bucket();
        let reused = self.free.get_mut(&bucket).and_then(Vec::pop);

        let buffer = match reused {
            Some(buffer) => buffer,
            None => {
                log::debug!(
                    "Allocating pooled buffer: {} x {} bytes",
                    bucket.count,
                    bucket.stride
                );
                self.stats.allocated += 1;
                self.allocator.allocate(&bucket)
            }
        };

        self.stats.acquired += 1;
        BufferRef {
            buffer,
            descriptor: bucket,
        }
    }

    pub fn release_buffer(&mut self, buffer: BufferRef<A::Buffer>) {
        self.stats.released += 1;
        self.retired.push(buffer);
    }

    /// Makes the buffers released this frame available again. Call it once
    /// the frame's commands have been submitted.
    pub fn end_frame(&mut self) {
        for retired in self.retired.drain(..) {
            self.free
                .entry(retired.descriptor)
                .or_default()
                .push(retired.buffer);
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingAllocator {
        sizes: Vec<u64>,
    }

    impl BufferAllocator for CountingAllocator {
        type Buffer = u64;

        fn allocate(&mut self, descriptor: &BufferDescriptor) -> u64 {
            self.sizes.push(descriptor.size_in_bytes());
            descriptor.size_in_bytes()
        }
    }

    #[test]
    fn requests_round_up_to_power_of_two_buckets() {
        let mut pool = BufferPool::new(CountingAllocator::default());

        let buffer = pool.get_buffer(BufferDescriptor::of::<u32>(1000));

        assert_eq!(buffer.descriptor.count, 1024);
        assert_eq!(buffer.buffer, 4096);
        assert!(buffer.descriptor.count >= 1000);
    }

    #[test]
    fn released_buffers_are_reused_after_the_frame_ends() {
        let mut pool = BufferPool::new(CountingAllocator::default());

        let first = pool.get_buffer(BufferDescriptor::of::<u32>(600));
        pool.release_buffer(first);
        pool.end_frame();
        let second = pool.get_buffer(BufferDescriptor::of::<u32>(1000));
        pool.release_buffer(second);
        pool.end_frame();

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn released_buffers_are_not_reused_within_a_frame() {
        let mut pool = BufferPool::new(CountingAllocator::default());

        let first = pool.get_buffer(BufferDescriptor::of::<u32>(600));
        pool.release_buffer(first);
        let second = pool.get_buffer(BufferDescriptor::of::<u32>(1000));

        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.retired_count(), 1);
        pool.release_buffer(second);
        pool.end_frame();
        assert_eq!(pool.retired_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn outstanding_never_underflows() {
        let mut pool = BufferPool::new(CountingAllocator::default());

        pool.release_buffer(BufferRef {
            buffer: 4,
            descriptor: BufferDescriptor::of::<u32>(1),
        });

        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn different_buckets_allocate_separately() {
        let mut pool = BufferPool::new(CountingAllocator::default());

        let small = pool.get_buffer(BufferDescriptor::of::<u32>(16));
        let large = pool.get_buffer(BufferDescriptor::of::<u32>(20_000));

        assert_eq!(pool.stats().outstanding(), 2);
        pool.release_buffer(small);
        pool.release_buffer(large);
        assert_eq!(pool.allocator().sizes, vec![64, 32768 * 4]);
    }
}
