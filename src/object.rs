//! Object identity and the `create` → `init` factory protocol.
//!
//! Every constructible type in this crate exposes a single `create(...) -> Result<T>`
//! associated function that allocates and validates atomically: there is no public
//! constructor that skips validation, so a half-initialized object can never escape
//! into a handle a caller can observe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique identifier, minted once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Mints the next id in process order. The first id returned is `1`; `0` is
    /// reserved as a sentinel and is never produced here.
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The sentinel id, used to mean "no object" in payloads that need a fixed-size
    /// POD representation.
    pub const NONE: ObjectId = ObjectId(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lazily-constructed, process-wide singleton that memoizes the full `Result` of
/// construction — including failure — so every caller observes the same outcome,
/// rather than retrying a failed construction on every access.
pub struct Singleton<T> {
    cell: OnceLock<std::result::Result<Arc<T>, Error>>,
}

impl<T> Singleton<T> {
    pub const fn new() -> Self {
        Self { cell: OnceLock::new() }
    }

    /// Returns the memoized instance, constructing it with `f` on first access.
    pub fn get_or_try_init(&self, f: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        self.cell.get_or_init(|| f().map(Arc::new)).clone()
    }
}

impl<T> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares a thread-local singleton accessor function with the same
/// memoize-the-`Result` semantics as [`Singleton`], but scoped to the calling thread.
///
/// ```ignore
/// thread_singleton! {
///     pub fn instance() -> EventLoop { EventLoop::create() }
/// }
/// ```
#[macro_export]
macro_rules! thread_singleton {
    ($vis:vis fn $name:ident() -> $ty:ty { $init:expr }) => {
        $vis fn $name() -> $crate::error::Result<::std::sync::Arc<$ty>> {
            ::std::thread_local! {
                static CELL: ::std::cell::RefCell<Option<::std::result::Result<::std::sync::Arc<$ty>, $crate::error::Error>>> =
                    ::std::cell::RefCell::new(None);
            }
            CELL.with(|cell| {
                if cell.borrow().is_none() {
                    let result: $crate::error::Result<$ty> = $init;
                    *cell.borrow_mut() = Some(result.map(::std::sync::Arc::new));
                }
                cell.borrow().as_ref().unwrap().clone()
            })
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn object_ids_are_unique_and_monotonic() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(b.get() > a.get());
        assert_ne!(a, b);
    }

    #[test]
    fn sentinel_is_never_minted() {
        for _ in 0..8 {
            assert_ne!(ObjectId::next(), ObjectId::NONE);
        }
    }

    struct Counted;

    static CALLS: AtomicU32 = AtomicU32::new(0);

    #[test]
    fn singleton_construction_failure_is_memoized() {
        static FAILING: Singleton<Counted> = Singleton::new();
        CALLS.store(0, Ordering::SeqCst);
        let f = || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Err::<Counted, _>(Error::internal_bug("always fails"))
        };
        let first = FAILING.get_or_try_init(f);
        let second = FAILING.get_or_try_init(f);
        assert!(first.is_err());
        assert!(second.is_err());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_construction_success_is_shared() {
        static OK: Singleton<Counted> = Singleton::new();
        let a = OK.get_or_try_init(|| Ok(Counted)).unwrap();
        let b = OK.get_or_try_init(|| Ok(Counted)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
