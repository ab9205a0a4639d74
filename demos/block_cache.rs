//! Block Cache Example
//!
//! Uses `LruCache` the way a storage engine caches file blocks: keys are
//! `(file, offset)` pairs, values are block buffers, and the charge of each
//! entry is its size in bytes. Readers pin blocks with handles while they
//! use them, so a block being read is never evicted out from under them.

use handle_lru::config::LruCacheConfig;
use handle_lru::{Handle, LruCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockId {
    file: u32,
    offset: u64,
}

impl BlockId {
    /// FNV-1a over the id's bytes.
    fn hash(&self) -> u32 {
        self.file
            .to_le_bytes()
            .iter()
            .chain(self.offset.to_le_bytes().iter())
            .fold(0x811c_9dc5u32, |h, b| (h ^ *b as u32).wrapping_mul(0x0100_0193))
    }
}

struct BlockCache {
    cache: LruCache<BlockId, Vec<u8>>,
    disk_reads: usize,
    freed_bytes: Arc<AtomicUsize>,
}

impl BlockCache {
    fn new(capacity_bytes: usize) -> Self {
        BlockCache {
            cache: LruCache::init(LruCacheConfig {
                capacity: capacity_bytes,
            }),
            disk_reads: 0,
            freed_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a pinned block, reading it from "disk" on a miss.
    fn read(&mut self, id: BlockId) -> Handle {
        if let Some(handle) = self.cache.lookup(&id, id.hash()) {
            return handle;
        }
        self.disk_reads += 1;
        let block = vec![(id.offset / BLOCK_SIZE as u64) as u8; BLOCK_SIZE];
        let freed = Arc::clone(&self.freed_bytes);
        self.cache
            .insert_with_deleter(id, id.hash(), block, BLOCK_SIZE, move |_, block| {
                freed.fetch_add(block.len(), Ordering::Relaxed);
            })
            .expect("block allocation failed")
    }

    fn done(&mut self, handle: Handle) {
        self.cache.release(handle);
    }
}

fn main() {
    let mut blocks = BlockCache::new(8 * BLOCK_SIZE);
    let block = |file, n: u64| BlockId {
        file,
        offset: n * BLOCK_SIZE as u64,
    };

    println!("Block cache: {} blocks of {} bytes\n", 8, BLOCK_SIZE);

    // A scan over file 1 fills the cache.
    for n in 0..8 {
        let h = blocks.read(block(1, n));
        blocks.done(h);
    }
    println!(
        "after scan: {} blocks cached, {} bytes used, {} disk reads",
        blocks.cache.len(),
        blocks.cache.usage(),
        blocks.disk_reads
    );

    // A long-running reader pins the index block of file 1.
    let index = blocks.read(block(1, 0));

    // A second scan pushes everything else out, but not the pinned block.
    for n in 0..16 {
        let h = blocks.read(block(2, n));
        blocks.done(h);
    }
    println!(
        "after second scan: {} blocks cached, pinned index block still cached: {}",
        blocks.cache.len(),
        blocks.cache.is_cached(&index)
    );
    println!(
        "index block first byte: {}",
        blocks.cache.value(&index)[0]
    );
    blocks.done(index);

    // Dropping a file's blocks while a reader still holds one.
    let straggler = blocks.read(block(2, 15));
    for n in 0..16 {
        let id = block(2, n);
        blocks.cache.erase(&id, id.hash());
    }
    println!(
        "after erasing file 2: {} blocks cached, straggler still readable: {} bytes",
        blocks.cache.len(),
        blocks.cache.value(&straggler).len()
    );
    blocks.done(straggler);

    blocks.cache.prune();
    println!(
        "after prune: {} bytes in use, {} bytes freed, {} disk reads",
        blocks.cache.usage(),
        blocks.freed_bytes.load(Ordering::Relaxed),
        blocks.disk_reads
    );
    blocks.cache.check_invariants().expect("cache invariants");
}
