// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use arena::Arena;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn allocate(c: &mut Criterion) {
    let mut arena = Arena::new(1 << 20);
    c.bench_function("arena_allocate", |b| {
        b.iter(|| {
            if arena.bytes_used() + 64 > arena.size_in_bytes() {
                arena.reset();
            }
            black_box(arena.allocate(64, 8).unwrap())
        });
    });
}

fn mark_allocate_reset(c: &mut Criterion) {
    let mut arena = Arena::new(1 << 20);
    c.bench_function("arena_mark_allocate_reset", |b| {
        b.iter(|| {
            let marker = arena.mark();
            for _ in 0..16 {
                black_box(arena.allocate(64, 8).unwrap());
            }
            arena.reset_to(marker);
        });
    });
}

criterion_group!(benches, allocate, mark_allocate_reset);
criterion_main!(benches);
