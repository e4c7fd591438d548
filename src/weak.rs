use crate::{block::Raw, Null, Shared};
use core::{fmt, mem};

/// [`Weak<T>`] observes an object owned by [`Shared<T>`] handles without
/// keeping it alive.
///
/// A `Weak` keeps only the control block allocated, so it can always answer
/// whether the object is still there. Use [`Weak::lock`] to get a new owner
/// while it is.
///
/// # Examples
///
/// ```
/// use rcblock::Shared;
///
/// let owner = Shared::new(String::from("alive"));
/// let observer = Shared::downgrade(&owner);
/// assert_eq!(*observer.lock(), "alive");
///
/// drop(owner);
/// assert!(observer.expired());
/// assert!(observer.lock().is_null());
/// ```
pub struct Weak<T: ?Sized> {
    raw: Option<Raw<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// Constructs a null [`Weak<T>`] that observes nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Weak;
    ///
    /// let nothing = Weak::<u8>::new();
    /// assert!(nothing.lock().is_null());
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Weak { raw: None }
    }

    /// Attempts to obtain a new owner of the object.
    ///
    /// Returns a null [`Shared`] if this handle is null or the object has
    /// already been destroyed. Otherwise the strong count is incremented and
    /// the returned handle shares the control block and object pointer of
    /// this one.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let a = Shared::new(1);
    /// let w = Shared::downgrade(&a);
    /// let b = w.lock();
    /// assert_eq!(a.use_count(), 2);
    /// drop(b);
    /// assert_eq!(a.use_count(), 1);
    /// ```
    #[inline]
    pub fn lock(&self) -> Shared<T> {
        match self.raw {
            Some(raw) if raw.block.try_increment_strong() => Shared::adopt(raw),
            _ => Shared::null(),
        }
    }

    /// Like [`Weak::lock`], but returns `None` instead of a null handle.
    #[inline]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let shared = self.lock();
        if shared.is_null() {
            None
        } else {
            Some(shared)
        }
    }

    /// Returns `true` if this handle is null or the object it observed has
    /// been destroyed.
    #[inline]
    #[must_use]
    pub fn expired(&self) -> bool {
        self.raw.map_or(true, |raw| raw.block.is_payload_destroyed())
    }

    /// Gets the number of [`Shared`] handles owning the observed object, or
    /// zero if this handle is null.
    #[inline]
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.block.strong_count())
    }

    /// Gets the number of [`Weak`] handles observing the object, or zero if
    /// this handle is null.
    #[inline]
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.block.weak_count())
    }

    /// Stops observing and leaves this handle null.
    #[inline]
    pub fn reset(&mut self) {
        Self::new().swap(self);
    }

    /// Exchanges the observed objects of two handles.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Compares the cached object addresses of two handles. The objects do
    /// not have to be alive.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        let addr = |raw: Option<Raw<T>>| raw.map(|raw| raw.ptr.cast::<u8>());
        addr(self.raw) == addr(other.raw)
    }

    /// Returns `true` if both handles share a control block.
    #[inline]
    #[must_use]
    pub fn owner_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        self.raw.map(|raw| raw.block) == other.raw.map(|raw| raw.block)
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    #[inline]
    fn from(shared: &Shared<T>) -> Self {
        let raw = shared.raw();
        if let Some(raw) = raw {
            raw.block.increment_weak();
        }
        Weak { raw }
    }
}

impl<T: ?Sized> From<Null> for Weak<T> {
    #[inline(always)]
    fn from(_: Null) -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Default for Weak<T> {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            raw.block.increment_weak();
        }
        Weak { raw: self.raw }
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        if self.owner_eq(source) && self.ptr_eq(source) {
            return;
        }
        source.clone().swap(self);
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: this handle owned one weak unit and is now null
            unsafe { raw.block.decrement_weak() };
        }
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
