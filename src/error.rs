use core::{alloc::Layout, fmt};

/// The control block for a new [`Shared<T>`](crate::Shared) could not be
/// allocated.
///
/// Returned by [`Shared::try_new`](crate::Shared::try_new) and
/// [`Shared::try_from_raw_with`](crate::Shared::try_from_raw_with). When the
/// object was supplied as a raw pointer, its disposer has already run by the
/// time this error is observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    #[inline]
    pub(crate) fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// The layout of the control block that failed to allocate.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to allocate a control block of {} bytes",
            self.layout.size()
        )
    }
}

impl core::error::Error for AllocError {}
