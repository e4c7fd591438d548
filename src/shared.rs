use crate::{
    block::{BlockRef, Raw},
    error::AllocError,
    Weak,
};
use alloc::{alloc::handle_alloc_error, boxed::Box};
use core::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

/// [`Shared<T>`] is a reference-counting owning pointer for single-threaded
/// use. Cloning a `Shared` shares the control block of the original and
/// increments its strong count. When the last `Shared` referencing an object
/// is dropped or reset, the object is destroyed; [`Weak`] handles to it stay
/// valid but can no longer be locked.
///
/// A `Shared` may be null, see [`Shared::null`].
pub struct Shared<T: ?Sized> {
    raw: Option<Raw<T>>,
    phantom: PhantomData<T>,
}

/// The null literal for [`Shared<T>`] and [`Weak<T>`].
///
/// Compares equal to every null `Shared`, from either side, and converts into
/// a null handle.
///
/// # Examples
///
/// ```
/// use rcblock::{Null, Shared};
///
/// let empty: Shared<u32> = Null.into();
/// assert!(empty == Null);
/// assert!(Null != Shared::new(1));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Null;

/// Constructs a [`Shared<T>`] whose control block and object live in one
/// allocation. Equivalent to [`Shared::new`].
///
/// # Examples
///
/// ```
/// use rcblock::make_shared;
///
/// let answer = make_shared(42);
/// assert_eq!(*answer, 42);
/// assert_eq!(answer.use_count(), 1);
/// ```
#[inline]
pub fn make_shared<T>(value: T) -> Shared<T> {
    Shared::new(value)
}

impl<T> Shared<T> {
    /// Constructs a new [`Shared<T>`], placing `value` inside the control
    /// block.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let tada = Shared::new("Tada!");
    /// ```
    #[inline]
    pub fn new(value: T) -> Shared<T> {
        Self::new_with(|| value)
    }

    /// Constructs a new [`Shared<T>`] by calling `init` and writing its
    /// result directly into the control block.
    ///
    /// If `init` panics the control block is released and nothing is leaked.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let zeros = Shared::new_with(|| [0u8; 64]);
    /// assert_eq!(zeros.len(), 64);
    /// ```
    #[inline]
    pub fn new_with<F: FnOnce() -> T>(init: F) -> Shared<T> {
        match Self::try_new_with(init) {
            Ok(this) => this,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Like [`Shared::new`], but reports allocation failure instead of
    /// aborting. `value` is dropped on failure.
    #[inline]
    pub fn try_new(value: T) -> Result<Shared<T>, AllocError> {
        Self::try_new_with(|| value)
    }

    /// Like [`Shared::new_with`], but reports allocation failure instead of
    /// aborting. `init` is not called on failure.
    pub fn try_new_with<F: FnOnce() -> T>(init: F) -> Result<Shared<T>, AllocError> {
        let (block, ptr) = BlockRef::try_in_place(init)?;
        Ok(Self::adopt(Raw { block, ptr }))
    }
}

impl<T: ?Sized> Shared<T> {
    /// Constructs a null [`Shared<T>`] that owns nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let empty = Shared::<str>::null();
    /// assert!(empty.is_null());
    /// assert_eq!(empty.use_count(), 0);
    /// ```
    #[inline]
    pub const fn null() -> Self {
        Shared {
            raw: None,
            phantom: PhantomData,
        }
    }

    /// Takes ownership of a boxed value. The box is kept where it is and is
    /// freed when the last owner goes away.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    /// use std::fmt::Display;
    ///
    /// let shown: Shared<dyn Display> = Shared::from_box(Box::new(5) as Box<dyn Display>);
    /// assert_eq!(shown.to_string(), "5");
    /// ```
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        // SAFETY: the disposer rebuilds the box `ptr` was leaked from
        unsafe {
            Self::from_raw_with(ptr, |ptr: NonNull<T>| {
                drop(Box::from_raw(ptr.as_ptr()));
            })
        }
    }

    /// Takes ownership of the object at `ptr`, which is released by calling
    /// `disposer(ptr)` exactly once, when the last owner goes away.
    ///
    /// If the control block cannot be allocated, `disposer(ptr)` is called
    /// before the allocation error handler runs, so the object never leaks.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads until `disposer` is called, and calling
    /// `disposer` on it must be sound. Anything `disposer` borrows must outlive
    /// every handle derived from the returned one.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    /// use std::ptr::NonNull;
    ///
    /// let raw = NonNull::from(Box::leak(Box::new(String::from("hello"))));
    /// let greeting = unsafe {
    ///     Shared::from_raw_with(raw, |ptr: NonNull<String>| drop(Box::from_raw(ptr.as_ptr())))
    /// };
    /// assert_eq!(*greeting, "hello");
    /// ```
    pub unsafe fn from_raw_with<D: FnOnce(NonNull<T>)>(ptr: NonNull<T>, disposer: D) -> Self {
        match Self::try_from_raw_with(ptr, disposer) {
            Ok(this) => this,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Like [`Shared::from_raw_with`], but reports allocation failure instead
    /// of aborting. On failure `disposer(ptr)` has already been called.
    ///
    /// # Safety
    /// Same as [`Shared::from_raw_with`].
    pub unsafe fn try_from_raw_with<D: FnOnce(NonNull<T>)>(
        ptr: NonNull<T>,
        disposer: D,
    ) -> Result<Self, AllocError> {
        let block = BlockRef::try_separate(ptr, disposer)?;
        Ok(Self::adopt(Raw { block, ptr }))
    }

    /// Builds a [`Shared<T>`] that owns the strong unit already held by `raw`.
    #[inline(always)]
    pub(crate) fn adopt(raw: Raw<T>) -> Self {
        Shared {
            raw: Some(raw),
            phantom: PhantomData,
        }
    }

    #[inline(always)]
    pub(crate) fn raw(&self) -> Option<Raw<T>> {
        self.raw
    }

    /// Constructs a [`Shared<T>`] that shares ownership with `owner` but
    /// points at `ptr`. Returns a null handle if `owner` is null.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as the object owned by `owner` is
    /// alive.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    /// use std::ptr::NonNull;
    ///
    /// let pair = Shared::new((1, 2));
    /// let second = unsafe { Shared::alias(&pair, NonNull::from(&pair.1)) };
    /// assert_eq!(*second, 2);
    /// assert_eq!(pair.use_count(), 2);
    /// ```
    pub unsafe fn alias<U: ?Sized>(owner: &Shared<U>, ptr: NonNull<T>) -> Self {
        match owner.raw {
            Some(raw) => {
                raw.block.increment_strong();
                Self::adopt(Raw {
                    block: raw.block,
                    ptr,
                })
            }
            None => Self::null(),
        }
    }

    /// Returns a [`Shared<U>`] that views a part of, or a different type over,
    /// the object of `this` while sharing its counts. Returns a null handle if
    /// `this` is null.
    ///
    /// `f` runs before the strong count is touched, so a panic in `f` leaves
    /// the counts unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    /// use std::fmt::Debug;
    ///
    /// let numbers = Shared::new(vec![1, 2, 3]);
    /// let debug: Shared<dyn Debug> = Shared::map(&numbers, |v| v as &dyn Debug);
    /// drop(numbers);
    /// assert_eq!(format!("{:?}", debug), "[1, 2, 3]");
    /// ```
    ///
    /// The returned handle carries no lifetime of its own, so `T` must not
    /// borrow anything:
    ///
    /// ```compile_fail
    /// use rcblock::Shared;
    ///
    /// let owned = String::from("borrowed");
    /// let holder = Shared::new(owned.as_str());
    /// let escaped: Shared<str> = Shared::map(&holder, |r| *r);
    /// drop(holder);
    /// drop(owned);
    /// println!("{}", escaped);
    /// ```
    pub fn map<U: ?Sized, F: FnOnce(&T) -> &U>(this: &Self, f: F) -> Shared<U>
    where
        T: 'static,
    {
        match this.raw {
            Some(raw) => {
                // SAFETY: this holds a strong unit, the object is alive
                let target = NonNull::from(f(unsafe { raw.ptr.as_ref() }));
                raw.block.increment_strong();
                Shared::adopt(Raw {
                    block: raw.block,
                    ptr: target,
                })
            }
            None => Shared::null(),
        }
    }

    /// Returns `true` if this handle owns nothing.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Borrows the managed object, or returns `None` for a null handle.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-null handle holds a strong unit, the object is alive
        self.raw.as_ref().map(|raw| unsafe { raw.ptr.as_ref() })
    }

    /// Gives you the cached pointer to the managed object, or `None` for a
    /// null handle. The counts are not touched.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.map(|raw| raw.ptr)
    }

    /// Gets the number of [`Shared`] handles sharing this control block, or
    /// zero for a null handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let five = Shared::new(5);
    /// let _also_five = five.clone();
    /// assert_eq!(2, five.use_count());
    /// ```
    #[inline]
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.block.strong_count())
    }

    /// Gets the number of [`Weak`] handles observing this control block, or
    /// zero for a null handle.
    #[inline]
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.block.weak_count())
    }

    /// Creates a new [`Weak`] observer of this object.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    /// assert_eq!(five.weak_count(), 1);
    /// assert_eq!(*weak_five.lock(), 5);
    /// ```
    #[inline]
    pub fn downgrade(this: &Self) -> Weak<T> {
        Weak::from(this)
    }

    /// Releases the managed object and leaves this handle null.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let mut a = Shared::new(1);
    /// let b = a.clone();
    /// a.reset();
    /// assert!(a.is_null());
    /// assert_eq!(b.use_count(), 1);
    /// ```
    #[inline]
    pub fn reset(&mut self) {
        Self::null().swap(self);
    }

    /// Releases the managed object and takes ownership of `value` instead.
    pub fn reset_box(&mut self, value: Box<T>) {
        Self::from_box(value).swap(self);
    }

    /// Releases the managed object and takes ownership of the object at `ptr`
    /// instead, as if by [`Shared::from_raw_with`].
    ///
    /// The new control block is fully built before the old object is
    /// released, so this handle never observes a half-replaced state.
    ///
    /// # Safety
    /// Same as [`Shared::from_raw_with`].
    pub unsafe fn reset_with<D: FnOnce(NonNull<T>)>(&mut self, ptr: NonNull<T>, disposer: D) {
        Self::from_raw_with(ptr, disposer).swap(self);
    }

    /// Exchanges the control block and object of two handles.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Moves the ownership out of `this`, leaving it null.
    #[inline]
    pub fn take(this: &mut Self) -> Self {
        mem::replace(this, Self::null())
    }

    /// Compares the object addresses of two handles. Null handles are equal
    /// to each other. Only the address part of wide pointers is compared.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let five = Shared::new(5);
    /// let same_five = five.clone();
    /// let other_five = Shared::new(5);
    ///
    /// assert!(Shared::ptr_eq(&five, &same_five));
    /// assert!(!Shared::ptr_eq(&five, &other_five));
    /// ```
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.addr() == other.addr()
    }

    /// Returns `true` if both handles share a control block, regardless of
    /// the object each of them points at.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let pair = Shared::new((1, 2));
    /// let first = Shared::map(&pair, |p| &p.0);
    /// assert!(Shared::owner_eq(&pair, &first));
    /// ```
    #[inline]
    #[must_use]
    pub fn owner_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        this.raw.map(|raw| raw.block) == other.raw.map(|raw| raw.block)
    }

    /// Returns a mutable reference to the managed object if this is its only
    /// owner and nothing observes it. Returns `None` otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let mut x = Shared::new(3);
    /// *Shared::get_mut(&mut x).unwrap() = 4;
    /// assert_eq!(*x, 4);
    ///
    /// let _y = Shared::downgrade(&x);
    /// assert!(Shared::get_mut(&mut x).is_none());
    /// ```
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let raw = this.raw?;
        if raw.block.strong_count() == 1 && raw.block.weak_count() == 0 {
            // SAFETY: no other handle can reach the object
            Some(unsafe { &mut *raw.ptr.as_ptr() })
        } else {
            None
        }
    }

    #[inline(always)]
    fn addr(&self) -> *const u8 {
        self.raw
            .map_or(ptr::null(), |raw| raw.ptr.cast::<u8>().as_ptr() as *const u8)
    }

    #[inline(always)]
    fn same_target(&self, other: &Self) -> bool {
        Shared::owner_eq(self, other) && Shared::ptr_eq(self, other)
    }
}

#[cold]
#[inline(never)]
fn null_deref() -> ! {
    panic!("dereferenced a null Shared")
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// Borrows the managed object.
    ///
    /// # Panics
    /// Panics if the handle is null.
    #[inline(always)]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => null_deref(),
        }
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            raw.block.increment_strong();
        }
        Shared {
            raw: self.raw,
            phantom: PhantomData,
        }
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        if self.same_target(source) {
            return;
        }
        source.clone().swap(self);
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: this handle owned one strong unit and is now null
            unsafe { raw.block.decrement_strong() };
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    #[inline(always)]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    #[inline]
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized> From<Null> for Shared<T> {
    #[inline(always)]
    fn from(_: Null) -> Self {
        Self::null()
    }
}

impl<T: ?Sized> PartialEq for Shared<T> {
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        Shared::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialEq<Null> for Shared<T> {
    #[inline]
    fn eq(&self, _: &Null) -> bool {
        self.is_null()
    }
}

impl<T: ?Sized> PartialEq<Shared<T>> for Null {
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        other.is_null()
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

impl<T: ?Sized> Unpin for Shared<T> {}
