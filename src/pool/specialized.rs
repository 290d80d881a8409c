//! Thin façades over [`MemoryPool`] for the array element types spec §4.6
//! names explicitly: byte, int, long, float and double arrays. Each façade
//! owns its own `MemoryPool<Vec<T>, _>` — pools are not shared across
//! element types, so a `TYPE_TAG` clash between `Vec<u8>` and `Vec<i32>` can
//! never happen even though both could theoretically report the same
//! tag value.

use super::{MemoryPool, PoolConfig, Poolable, TypeTag};

macro_rules! array_pool {
    ($name:ident, $elem:ty, $tag:expr) => {
        impl Poolable for Vec<$elem> {
            const TYPE_TAG: TypeTag = TypeTag($tag);

            fn byte_size(&self) -> u64 {
                (self.len() * std::mem::size_of::<$elem>()) as u64
            }

            fn clear(&mut self) {
                self.iter_mut().for_each(|v| *v = Default::default());
            }

            fn recycle(self) {}
        }

        #[doc = concat!("A size-bounded pool of `Vec<", stringify!($elem), ">` buffers.")]
        pub struct $name {
            inner: MemoryPool<Vec<$elem>, fn(u64) -> Vec<$elem>>,
        }

        impl $name {
            pub fn new(config: PoolConfig) -> Self {
                Self {
                    inner: MemoryPool::new(config, |len| vec![Default::default(); len as usize]),
                }
            }

            pub fn get(&self, len: u64) -> Vec<$elem> {
                self.inner.get(len)
            }

            pub fn get_dirty(&self, len: u64) -> Vec<$elem> {
                self.inner.get_dirty(len)
            }

            pub fn put(&self, value: Vec<$elem>) {
                let len = value.len() as u64;
                self.inner.put(len, value);
            }

            pub fn clear_memory(&self) {
                self.inner.clear_memory();
            }

            pub fn release(&self) {
                self.inner.release();
            }

            pub fn hit_count(&self) -> u64 {
                self.inner.hit_count()
            }

            pub fn miss_count(&self) -> u64 {
                self.inner.miss_count()
            }

            pub fn eviction_count(&self) -> u64 {
                self.inner.eviction_count()
            }

            pub fn current_size(&self) -> u64 {
                self.inner.current_size()
            }
        }
    };
}

// `impl Poolable for Vec<u8>` via the macro below would conflict with this
// one if byte were generated twice, so each element type gets exactly one
// macro invocation and a distinct numeric tag.
array_pool!(ByteArrayPool, u8, 1);
array_pool!(IntArrayPool, i32, 2);
array_pool!(LongArrayPool, i64, 3);
array_pool!(FloatArrayPool, f32, 4);
array_pool!(DoubleArrayPool, f64, 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_pool_round_trip() {
        let pool = ByteArrayPool::new(PoolConfig::new(1024));
        let mut buf = pool.get(16);
        assert_eq!(buf.len(), 16);
        buf[0] = 42;
        pool.put(buf);
        let buf = pool.get(16);
        assert_eq!(buf, vec![0u8; 16]);
        assert_eq!(pool.hit_count(), 1);
    }

    #[test]
    fn double_pool_tracks_byte_size() {
        let pool = DoubleArrayPool::new(PoolConfig::new(80));
        pool.put(vec![1.0_f64; 10]);
        assert_eq!(pool.current_size(), 80);
        pool.put(vec![2.0_f64; 10]);
        assert!(pool.current_size() <= 80);
    }
}
