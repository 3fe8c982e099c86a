use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU32, Ordering};

/// A small `Copy` value shared between tasks. Every access is one critical
/// section, so readers never observe a half-written value.
pub struct DataCell<T: Copy> {
    storage: Mutex<CriticalSectionRawMutex, Cell<T>>,
    updates: AtomicU32,
}

impl<T: Copy> DataCell<T> {
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(Cell::new(init)),
            updates: AtomicU32::new(0),
        }
    }

    /// Replace the value.
    pub fn update(&self, data: T) {
        self.storage.lock(|cell| cell.set(data));
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-modify-write inside a single critical section.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = self.storage.lock(|cell| {
            let mut value = cell.get();
            let out = f(&mut value);
            cell.set(value);
            out
        });
        self.updates.fetch_add(1, Ordering::Relaxed);
        out
    }

    /// Number of writes since construction. Wraps.
    pub fn updates(&self) -> u32 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn read(&self) -> T {
        self.storage.lock(|cell| cell.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datacell_init() {
        let cell = DataCell::new(42);
        assert_eq!(cell.read(), 42);
        assert_eq!(cell.updates(), 0);
    }

    #[test]
    fn test_datacell_update() {
        let cell = DataCell::new(0);
        cell.update(100);
        assert_eq!(cell.read(), 100);
        assert_eq!(cell.updates(), 1);
    }

    #[test]
    fn test_datacell_modify() {
        #[derive(Copy, Clone, Default, PartialEq, Debug)]
        struct Staged {
            armed: bool,
            count: u8,
        }
        let cell = DataCell::new(Staged::default());
        let previous = cell.modify(|s| {
            s.armed = true;
            s.count += 1;
            s.count - 1
        });
        assert_eq!(previous, 0);
        assert_eq!(cell.read(), Staged { armed: true, count: 1 });
        assert_eq!(cell.updates(), 1);
    }
}
