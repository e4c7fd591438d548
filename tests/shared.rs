use rcblock::{make_shared, Null, Shared};
use std::{cell::Cell, collections::HashSet, fmt::Display, ptr::NonNull, rc::Rc};

// Counts how many times instances sharing `drops` were destroyed.
struct Tracked {
    value: i32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn counting_disposer<T>(calls: &Rc<Cell<usize>>) -> impl FnOnce(NonNull<T>) {
    let calls = calls.clone();
    move |ptr: NonNull<T>| {
        calls.set(calls.get() + 1);
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

fn leak<T>(value: T) -> NonNull<T> {
    NonNull::from(Box::leak(Box::new(value)))
}

#[test]
fn simple() {
    let a = Shared::new(!0usize);
    drop(a);
}

#[test]
fn cloned() {
    let a = Shared::new(!0usize);
    let _b = a.clone();
    let _c = a.clone();
    let _d = a;
}

#[test]
fn null_handle() {
    let mut a = Shared::<u32>::null();
    assert!(a.is_null());
    assert_eq!(a.use_count(), 0);
    assert_eq!(a.weak_count(), 0);
    assert!(a.get().is_none());
    assert!(a.as_ptr().is_none());
    assert!(Shared::get_mut(&mut a).is_none());

    let b = a.clone();
    assert!(b.is_null());
    a.reset();
    assert!(a.is_null());
    assert!(Shared::downgrade(&a).lock().is_null());
    assert_eq!(format!("{:?}", a), "null");
    assert_eq!(Shared::<u32>::default(), Null);
}

#[test]
#[should_panic(expected = "dereferenced a null Shared")]
fn null_deref_panics() {
    let a = Shared::<u32>::null();
    let _value: u32 = *a;
}

#[test]
fn copy_then_drop_disposes_once() {
    let calls = Rc::new(Cell::new(0));
    let a = unsafe { Shared::from_raw_with(leak(7), counting_disposer(&calls)) };
    let b = a.clone();
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);

    drop(a);
    assert_eq!(b.use_count(), 1);
    assert_eq!(calls.get(), 0);
    assert_eq!(*b, 7);

    drop(b);
    assert_eq!(calls.get(), 1);
}

#[test]
fn in_place_factory() {
    let drops = Rc::new(Cell::new(0));
    let a = make_shared(Tracked {
        value: 42,
        drops: drops.clone(),
    });
    assert_eq!(a.value, 42);
    assert_eq!(a.use_count(), 1);

    drop(a);
    assert_eq!(drops.get(), 1);
}

#[test]
fn new_with_runs_init_once() {
    let calls = Cell::new(0);
    let a = Shared::new_with(|| {
        calls.set(calls.get() + 1);
        String::from("built")
    });
    assert_eq!(calls.get(), 1);
    assert_eq!(*a, "built");
}

#[test]
fn new_with_panicking_init() {
    let result = std::panic::catch_unwind(|| Shared::<String>::new_with(|| panic!("no value")));
    assert!(result.is_err());
}

#[test]
fn try_constructors_succeed() {
    let a = Shared::try_new(3u8).unwrap();
    assert_eq!(*a, 3);

    let calls = Rc::new(Cell::new(0));
    let b = unsafe { Shared::try_from_raw_with(leak(4u8), counting_disposer(&calls)) }.unwrap();
    assert_eq!(*b, 4);
    drop(b);
    assert_eq!(calls.get(), 1);
}

#[test]
fn use_count_follows_live_handles() {
    let a = Shared::new(1);
    let mut handles = vec![a.clone(), a.clone(), a.clone()];
    assert_eq!(a.use_count(), 4);

    let moved = handles.pop().unwrap();
    assert_eq!(moved.use_count(), 4);

    handles[0].reset();
    assert_eq!(a.use_count(), 3);

    let taken = Shared::take(&mut handles[1]);
    assert!(handles[1].is_null());
    assert_eq!(taken.use_count(), 3);

    drop(handles);
    drop(taken);
    assert_eq!(moved.use_count(), 2);
}

#[test]
fn reset_with_rebinds() {
    let old_calls = Rc::new(Cell::new(0));
    let new_calls = Rc::new(Cell::new(0));
    let mut a = unsafe { Shared::from_raw_with(leak(1), counting_disposer(&old_calls)) };
    let keep = a.clone();

    unsafe { a.reset_with(leak(2), counting_disposer(&new_calls)) };
    assert_eq!(*a, 2);
    assert_eq!(a.use_count(), 1);
    assert_eq!(keep.use_count(), 1);
    assert_eq!(old_calls.get(), 0);

    drop(keep);
    assert_eq!(old_calls.get(), 1);
    drop(a);
    assert_eq!(new_calls.get(), 1);
}

#[test]
fn reset_then_drop_disposes_once() {
    let calls = Rc::new(Cell::new(0));
    let mut a = Shared::<u16>::null();
    unsafe { a.reset_with(leak(5u16), counting_disposer(&calls)) };
    drop(a);
    assert_eq!(calls.get(), 1);
}

#[test]
fn reset_box_releases_previous() {
    let drops = Rc::new(Cell::new(0));
    let mut a = Shared::new(Tracked {
        value: 1,
        drops: drops.clone(),
    });
    a.reset_box(Box::new(Tracked {
        value: 2,
        drops: drops.clone(),
    }));
    assert_eq!(drops.get(), 1);
    assert_eq!(a.value, 2);
    drop(a);
    assert_eq!(drops.get(), 2);
}

#[test]
#[allow(clippy::redundant_clone)]
fn self_assignment_keeps_state() {
    let mut a = Shared::new(9);
    let before = a.as_ptr();

    a = a.clone();
    assert_eq!(a.as_ptr(), before);
    assert_eq!(a.use_count(), 1);

    let b = a.clone();
    a.clone_from(&b);
    assert_eq!(a.as_ptr(), before);
    assert_eq!(a.use_count(), 2);
}

#[test]
fn clone_from_releases_previous() {
    let drops = Rc::new(Cell::new(0));
    let mut a = Shared::new(Tracked {
        value: 1,
        drops: drops.clone(),
    });
    let b = Shared::new(Tracked {
        value: 2,
        drops: drops.clone(),
    });
    a.clone_from(&b);
    assert_eq!(drops.get(), 1);
    assert_eq!(a.value, 2);
    assert_eq!(b.use_count(), 2);
}

#[test]
fn swap_exchanges_targets() {
    let mut a = Shared::new(1);
    let mut b = Shared::new(2);
    let extra = b.clone();
    a.swap(&mut b);
    assert_eq!(*a, 2);
    assert_eq!(*b, 1);
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 1);
    assert_eq!(a, extra);
}

#[test]
fn equality_uses_object_address() {
    let a = Shared::new(5);
    let b = a.clone();
    let c = Shared::new(5);
    assert_eq!(a, b);
    assert_ne!(a, c);

    assert!(a != Null);
    assert!(Null != a);
    assert!(Shared::<i32>::null() == Null);
    assert!(Null == Shared::<i32>::null());
    assert_eq!(Shared::<i32>::null(), Shared::null());

    let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&a));
}

#[test]
fn map_shares_ownership() {
    let drops = Rc::new(Cell::new(0));
    let whole = Shared::new((
        Tracked {
            value: 10,
            drops: drops.clone(),
        },
        20,
    ));
    let second = Shared::map(&whole, |pair| &pair.1);
    assert_eq!(*second, 20);
    assert_eq!(whole.use_count(), 2);
    assert!(Shared::owner_eq(&whole, &second));

    drop(whole);
    assert_eq!(drops.get(), 0);
    assert_eq!(*second, 20);

    let weak = Shared::downgrade(&second);
    drop(second);
    assert_eq!(drops.get(), 1);
    assert!(weak.lock().is_null());
}

#[test]
fn map_to_trait_object() {
    let numbers = Shared::new(12u64);
    let shown: Shared<dyn Display> = Shared::map(&numbers, |n| n as &dyn Display);
    assert_eq!(shown.to_string(), "12");
    assert_eq!(numbers.use_count(), 2);
}

#[test]
fn map_null_stays_null() {
    let a = Shared::<(u8, u8)>::null();
    assert!(Shared::map(&a, |p| &p.0).is_null());
}

#[test]
fn map_through_static_borrow_outlives_holder() {
    let holder = Shared::new("static text");
    let text: Shared<str> = Shared::map(&holder, |r| *r);
    drop(holder);
    assert_eq!(&*text, "static text");
    assert_eq!(text.use_count(), 1);
}

#[test]
fn boxed_trait_object_runs_destructor() {
    let drops = Rc::new(Cell::new(0));
    let boxed: Box<dyn std::any::Any> = Box::new(Tracked {
        value: 3,
        drops: drops.clone(),
    });
    let a: Shared<dyn std::any::Any> = Shared::from(boxed);
    assert_eq!(a.downcast_ref::<Tracked>().map(|t| t.value), Some(3));
    drop(a);
    assert_eq!(drops.get(), 1);
}

#[test]
fn get_mut_requires_unique_owner() {
    let mut a = Shared::new(vec![1]);
    Shared::get_mut(&mut a).unwrap().push(2);
    assert_eq!(*a, [1, 2]);

    let b = a.clone();
    assert!(Shared::get_mut(&mut a).is_none());
    drop(b);

    let w = Shared::downgrade(&a);
    assert!(Shared::get_mut(&mut a).is_none());
    drop(w);
    assert!(Shared::get_mut(&mut a).is_some());
}

#[test]
fn formatting() {
    let a = Shared::new(String::from("text"));
    assert_eq!(format!("{}", a), "text");
    assert_eq!(format!("{:?}", a), "\"text\"");
    assert_eq!(format!("{}", Shared::<str>::null()), "null");
    assert!(format!("{:p}", a).starts_with("0x"));
}
