use std::sync::Mutex;

/// A thread-safe freelist of reusable values.
///
/// Values keep their allocated capacity across uses; `put` resets a value
/// before it becomes available again, so `get` always hands out an empty
/// one.
pub(crate) struct Pool<T> {
    idle: Mutex<Vec<T>>,
    init: fn() -> T,
    reset: fn(&mut T),
}

impl<T> Pool<T> {
    pub(crate) fn new(init: fn() -> T, reset: fn(&mut T)) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            init,
            reset,
        }
    }

    pub(crate) fn get(&self) -> T {
        self.idle
            .lock()
            .expect("pool mutex poisoned; qed")
            .pop()
            .unwrap_or_else(self.init)
    }

    pub(crate) fn put(&self, mut value: T) {
        (self.reset)(&mut value);
        self.idle
            .lock()
            .expect("pool mutex poisoned; qed")
            .push(value);
    }

    #[cfg(test)]
    pub(crate) fn with_idle<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.idle.lock().expect("pool mutex poisoned; qed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf_pair::BufPair;

    #[test]
    fn put_resets_before_reuse() {
        let pool: Pool<BufPair> = Pool::new(|| BufPair::with_capacity(64), BufPair::reset);
        let mut buf = pool.get();
        buf.data.extend_from_slice(b"leftover");
        pool.put(buf);

        let buf = pool.get();
        assert!(!buf.has_data());
        assert!(buf.data.capacity() >= 64);
    }

    #[test]
    fn get_prefers_idle_values() {
        let pool: Pool<Vec<u8>> = Pool::new(Vec::new, Vec::clear);
        let mut value = pool.get();
        value.reserve(128);
        let capacity = value.capacity();
        pool.put(value);

        assert!(pool.get().capacity() >= capacity);
        assert_eq!(pool.with_idle(|idle| idle.len()), 0);
    }
}
