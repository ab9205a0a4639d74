#![no_std]
extern crate alloc;
extern crate handle_lru;

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;
use handle_lru::config::LruCacheConfig;
use handle_lru::LruCache;

fn make_lru<K: Eq, V>(capacity: usize) -> LruCache<K, V> {
    LruCache::init(LruCacheConfig { capacity })
}

fn fnv(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5u32, |h, b| (h ^ *b as u32).wrapping_mul(0x0100_0193))
}

#[test]
fn test_lru_in_no_std() {
    let mut cache = make_lru(2);

    // Using String as it requires the alloc crate
    let key1 = String::from("key1");
    let key2 = String::from("key2");
    let key3 = String::from("key3");

    for (key, value) in [(&key1, 1), (&key2, 2)] {
        let h = cache.insert(key.clone(), fnv(key.as_bytes()), value, 1).unwrap();
        cache.release(h);
    }

    let h = cache.lookup(key1.as_str(), fnv(key1.as_bytes())).unwrap();
    assert_eq!(*cache.value(&h), 1);
    cache.release(h);

    // This should evict key2, the least recently used
    let h = cache.insert(key3.clone(), fnv(key3.as_bytes()), 3, 1).unwrap();
    cache.release(h);

    assert!(cache.lookup(key2.as_str(), fnv(key2.as_bytes())).is_none());
    let h = cache.lookup(key3.as_str(), fnv(key3.as_bytes())).unwrap();
    assert_eq!(*cache.value(&h), 3);
    cache.release(h);
}

#[test]
fn test_deleter_in_no_std() {
    // Deleters must be Send, so count through a value that is dropped instead.
    struct Counted(Rc<Cell<u32>>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    let drops = Rc::new(Cell::new(0));
    let mut cache: LruCache<u32, Counted> = make_lru(1);
    let h = cache.insert(1, 1, Counted(Rc::clone(&drops)), 1).unwrap();
    cache.release(h);
    let h = cache.insert(2, 2, Counted(Rc::clone(&drops)), 1).unwrap();
    assert_eq!(drops.get(), 1);
    cache.release(h);
    cache.clear();
    assert_eq!(drops.get(), 2);
}

#[test]
fn test_byte_slice_keys_in_no_std() {
    let blocks: Vec<Vec<u8>> = (0..16u8).map(|i| Vec::from([i; 4])).collect();
    let mut cache: LruCache<&[u8], usize> = make_lru(8);

    for (i, block) in blocks.iter().enumerate() {
        let h = cache.insert(block.as_slice(), fnv(block), i, 1).unwrap();
        cache.release(h);
    }
    assert_eq!(cache.len(), 8);
    assert!(cache.lookup([0u8; 4].as_slice(), fnv(&[0; 4])).is_none());
    let h = cache.lookup([15u8; 4].as_slice(), fnv(&[15; 4])).unwrap();
    assert_eq!(*cache.value(&h), 15);
    cache.release(h);
    cache.check_invariants().unwrap();
}

#[test]
fn test_complex_types_in_no_std() {
    let mut cache = make_lru(64);

    for i in 0..10u32 {
        let key = format!("block-{i}");
        let hash = fnv(key.as_bytes());
        let value = Vec::<u32>::from([i, i * 2, i * 3]);
        let h = cache.insert(key, hash, value, 3).unwrap();
        cache.release(h);
    }

    let key = format!("block-{}", 4);
    let h = cache.lookup(key.as_str(), fnv(key.as_bytes())).unwrap();
    assert_eq!(*cache.value(&h), [4, 8, 12]);
    cache.value_mut(&h).push(16);
    cache.release(h);

    assert_eq!(cache.usage(), 30);
    assert_eq!(cache.prune(), 10);
    assert!(cache.is_empty());
}
