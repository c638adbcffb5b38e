#![cfg(test)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::collections::HashMap;

use maplit::hashmap;

use crate::flag::FlagDefinition;
use crate::rule::Rule;
use crate::store::Store;
use crate::user::Role;

/// TestStore holds a fixed set of flags covering every definition shape:
///
/// - `A`: static on
/// - `B`: static off
/// - `C`: 25% of plain users, or any admin or tester
/// - `adminOrNobody`: admins, plus a 0% rollout that never matches
/// - `empty`: no rules at all
pub struct TestStore {
    flags: HashMap<String, FlagDefinition>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            flags: hashmap! {
                "A".to_string() => FlagDefinition::Static(true),
                "B".to_string() => FlagDefinition::Static(false),
                "C".to_string() => FlagDefinition::Rules(vec![
                    Rule::roles_and_percentage([Role::User], 0.25),
                    Rule::roles([Role::Admin, Role::Tester]),
                ]),
                "adminOrNobody".to_string() => FlagDefinition::Rules(vec![
                    Rule::roles([Role::Admin]),
                    Rule::percentage(0.0),
                ]),
                "empty".to_string() => FlagDefinition::Rules(vec![]),
            },
        }
    }
}

impl Store for TestStore {
    fn flag(&self, flag_name: &str) -> Option<&FlagDefinition> {
        self.flags.get(flag_name)
    }

    fn flag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

// Counts allocations per thread so tests running in parallel do not see each other's.
struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

/// Runs `f`, returning its result along with the number of heap allocations it made on this
/// thread.
pub fn count_allocations<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let before = ALLOCATIONS.with(Cell::get);
    let value = f();
    let after = ALLOCATIONS.with(Cell::get);
    (value, after - before)
}
