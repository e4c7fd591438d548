use crate::{error::AllocError, ucount};
use alloc::{alloc::alloc, boxed::Box};
use branches::{assume, unlikely};
use core::{
    alloc::Layout,
    cell::{Cell, UnsafeCell},
    mem::{self, MaybeUninit},
    ptr::{self, NonNull},
};

// Every control block starts with this header, whatever its payload shape is.
// The two function pointers are the payload's destructor and the block's own
// deallocator, monomorphized for the concrete `Block<P>`.
#[repr(C)]
pub(crate) struct Header {
    strong: Cell<ucount>,
    weak: Cell<ucount>,
    destroy_payload: unsafe fn(NonNull<Header>),
    deallocate: unsafe fn(NonNull<Header>),
}

/// How a managed object is stored next to its counters.
pub(crate) trait Payload: Sized {
    /// Destroys the managed object without releasing the control block.
    ///
    /// # Safety
    /// Must be called at most once, and the object must not be accessed
    /// afterwards.
    unsafe fn destroy(&self);
}

#[repr(C)]
struct Block<P> {
    header: Header,
    payload: P,
}

impl<P: Payload> Block<P> {
    const LAYOUT: Layout = Layout::new::<Self>();

    // Gives the payload back when the allocator fails so the caller can decide
    // what to do with it.
    fn try_allocate(payload: P) -> Result<NonNull<Self>, P> {
        // SAFETY: the header makes the layout non-zero sized
        let raw = unsafe { alloc(Self::LAYOUT) } as *mut Self;
        match NonNull::new(raw) {
            Some(block) => {
                // SAFETY: freshly allocated with the layout of `Self`
                unsafe {
                    block.as_ptr().write(Block {
                        header: Header {
                            strong: Cell::new(1),
                            weak: Cell::new(0),
                            destroy_payload: destroy_payload::<P>,
                            deallocate: deallocate::<P>,
                        },
                        payload,
                    })
                };
                Ok(block)
            }
            None => Err(payload),
        }
    }
}

unsafe fn destroy_payload<P: Payload>(header: NonNull<Header>) {
    header.cast::<Block<P>>().as_ref().payload.destroy();
}

unsafe fn deallocate<P: Payload>(header: NonNull<Header>) {
    // SAFETY: the block was allocated by the global allocator with the layout
    // of `Block<P>`, which is what `Box` expects. The payload is either gone
    // already or has no drop glue left to run.
    drop(Box::from_raw(header.cast::<Block<P>>().as_ptr()));
}

/// Payload of a control block that adopted an object allocated elsewhere.
pub(crate) struct Separate<T: ?Sized, D> {
    object: NonNull<T>,
    disposer: Cell<Option<D>>,
}

impl<T: ?Sized, D: FnOnce(NonNull<T>)> Payload for Separate<T, D> {
    unsafe fn destroy(&self) {
        if let Some(disposer) = self.disposer.take() {
            disposer(self.object);
        }
    }
}

/// Payload of a control block that holds the object itself.
pub(crate) struct InPlace<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Payload for InPlace<T> {
    unsafe fn destroy(&self) {
        ptr::drop_in_place(self.value.get().cast::<T>());
    }
}

// Releases a half-built in-place block if the value constructor unwinds.
struct Unfinished<T>(NonNull<Block<InPlace<T>>>);

impl<T> Drop for Unfinished<T> {
    fn drop(&mut self) {
        // SAFETY: the storage is still uninitialized, nothing else refers to
        // the block yet
        unsafe { deallocate::<InPlace<T>>(self.0.cast()) }
    }
}

// Returns the weak unit the strong side holds while the payload drops, also
// when the payload's destructor unwinds.
struct PayloadWeak(BlockRef);

impl Drop for PayloadWeak {
    fn drop(&mut self) {
        // SAFETY: taken by `drop_slow` right before this guard was built
        unsafe { self.0.decrement_weak() }
    }
}

/// A pointer to the header of a live control block.
///
/// Every handle that stores a `BlockRef` owns exactly one strong or one weak
/// unit of it, which keeps the block allocated.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockRef(NonNull<Header>);

impl BlockRef {
    /// Allocates a control block that adopts `object`.
    ///
    /// If the block cannot be allocated `disposer` is invoked on `object`
    /// before the error is returned.
    ///
    /// # Safety
    /// `disposer` must be sound to call on `object` once, at any point while
    /// the returned block is alive.
    pub(crate) unsafe fn try_separate<T: ?Sized, D: FnOnce(NonNull<T>)>(
        object: NonNull<T>,
        disposer: D,
    ) -> Result<Self, AllocError> {
        let payload = Separate {
            object,
            disposer: Cell::new(Some(disposer)),
        };
        match Block::try_allocate(payload) {
            Ok(block) => Ok(Self(block.cast())),
            Err(payload) => {
                payload.destroy();
                Err(AllocError::new(Block::<Separate<T, D>>::LAYOUT))
            }
        }
    }

    /// Allocates a control block and constructs the result of `init` inside
    /// it, returning the block and the address of the new object.
    pub(crate) fn try_in_place<T>(
        init: impl FnOnce() -> T,
    ) -> Result<(Self, NonNull<T>), AllocError> {
        let payload = InPlace {
            value: UnsafeCell::new(MaybeUninit::<T>::uninit()),
        };
        let block = Block::try_allocate(payload)
            .map_err(|_| AllocError::new(Block::<InPlace<T>>::LAYOUT))?;
        let guard = Unfinished(block);
        // SAFETY: block is valid and uniquely owned here, `UnsafeCell` and
        // `MaybeUninit` are both layout compatible with `T`
        let object = unsafe {
            let storage =
                UnsafeCell::raw_get(ptr::addr_of!((*block.as_ptr()).payload.value));
            let object = NonNull::new_unchecked(storage.cast::<T>());
            object.as_ptr().write(init());
            object
        };
        mem::forget(guard);
        Ok((Self(block.cast()), object))
    }

    #[inline(always)]
    fn header(&self) -> &Header {
        // SAFETY: the caller holds a strong or weak unit, so the block is not
        // deallocated yet
        unsafe { self.0.as_ref() }
    }

    #[inline]
    pub(crate) fn strong_count(self) -> usize {
        self.header().strong.get() as usize
    }

    #[inline]
    pub(crate) fn weak_count(self) -> usize {
        self.header().weak.get() as usize
    }

    #[inline]
    pub(crate) fn is_payload_destroyed(self) -> bool {
        self.header().strong.get() == 0
    }

    #[inline]
    pub(crate) fn increment_strong(self) {
        let counter = &self.header().strong;
        let value = counter.get().wrapping_add(1);
        if unlikely(value == 0) {
            panic!("reference counter overflow");
        }
        counter.set(value);
    }

    /// Increments the strong count unless the payload is already destroyed.
    #[inline]
    pub(crate) fn try_increment_strong(self) -> bool {
        if self.is_payload_destroyed() {
            return false;
        }
        self.increment_strong();
        true
    }

    #[inline]
    pub(crate) fn increment_weak(self) {
        let counter = &self.header().weak;
        let value = counter.get().wrapping_add(1);
        if unlikely(value == 0) {
            panic!("reference counter overflow");
        }
        counter.set(value);
    }

    /// Gives back one strong unit, destroying the payload if it was the last.
    ///
    /// # Safety
    /// The caller must own a strong unit and must not use it afterwards.
    #[inline]
    pub(crate) unsafe fn decrement_strong(self) {
        let counter = &self.header().strong;
        let value = counter.get();
        assume(value != 0);
        counter.set(value.wrapping_sub(1));
        if value == 1 {
            self.drop_slow();
        }
    }

    // The payload's drop may release weak handles to this very block, so the
    // strong side holds a weak unit of its own until the payload is gone.
    unsafe fn drop_slow(self) {
        self.increment_weak();
        let _weak = PayloadWeak(self);
        trace!("destroying payload of control block {:p}", self.0);
        let destroy_payload = self.header().destroy_payload;
        destroy_payload(self.0);
    }

    /// Gives back one weak unit, freeing the block if nothing refers to it
    /// anymore.
    ///
    /// # Safety
    /// The caller must own a weak unit and must not use it afterwards.
    #[inline]
    pub(crate) unsafe fn decrement_weak(self) {
        let header = self.header();
        let value = header.weak.get();
        assume(value != 0);
        header.weak.set(value.wrapping_sub(1));
        if value == 1 && header.strong.get() == 0 {
            trace!("freeing control block {:p}", self.0);
            let deallocate = header.deallocate;
            deallocate(self.0);
        }
    }
}

/// A control block together with the address of the object a handle views.
///
/// The object address is kept next to the block because it does not have to
/// be the address of the payload, e.g. after [`Shared::map`](crate::Shared::map).
pub(crate) struct Raw<T: ?Sized> {
    pub(crate) block: BlockRef,
    pub(crate) ptr: NonNull<T>,
}

impl<T: ?Sized> Clone for Raw<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Raw<T> {}
