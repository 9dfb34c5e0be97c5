//! Injected preferences
//!
//! Persisted UI preferences (such as the last used widget view) are passed in
//! as an initial value plus a persistence callback instead of being read from
//! and written to ambient storage.

use parking_lot::Mutex;

type PersistFn<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A value with an explicit persistence hook
pub struct Preference<T> {
    value: Mutex<T>,
    persist: PersistFn<T>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Preference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preference").field("value", &*self.value.lock()).finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq> Preference<T> {
    /// Preference starting at `initial`, calling `persist` on every change
    pub fn new(initial: T, persist: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            value: Mutex::new(initial),
            persist: Box::new(persist),
        }
    }

    /// Preference that is never persisted
    pub fn in_memory(initial: T) -> Self {
        Self::new(initial, |_| {})
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Update the value; persists and returns `true` only when it changed
    ///
    /// The callback runs after the value lock is released.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.value.lock();
            if *guard == value {
                return false;
            }
            guard.clone_from(&value);
        }
        (self.persist)(&value);
        true
    }
}

impl<T: Clone + PartialEq + Default> Default for Preference<T> {
    fn default() -> Self {
        Self::in_memory(T::default())
    }
}
