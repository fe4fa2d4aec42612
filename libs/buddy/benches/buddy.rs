// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use buddy::BuddyAllocator;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn allocate_free_cycle(c: &mut Criterion) {
    c.bench_function("buddy_allocate_free_cycle", |b| {
        let mut alloc = BuddyAllocator::new(64, 1 << 20, 0).unwrap();
        b.iter(|| {
            let range = alloc.allocate(black_box(256), black_box(1)).unwrap();
            alloc.free(range);
        });
    });
}

fn reallocate_grow_in_place(c: &mut Criterion) {
    c.bench_function("buddy_reallocate_grow_in_place", |b| {
        let mut alloc = BuddyAllocator::new(64, 1 << 20, 0).unwrap();
        b.iter(|| {
            let small = alloc.allocate(black_box(64), 1).unwrap();
            let grown = alloc.reallocate(small, black_box(128), 1).unwrap();
            alloc.free(grown);
        });
    });
}

criterion_group!(benches, allocate_free_cycle, reallocate_grow_in_place);
criterion_main!(benches);
