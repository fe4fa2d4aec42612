// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use task::{StealOutcome, TaskId, WorkQueue};

fn push_take_owner_only(c: &mut Criterion) {
    let queue = WorkQueue::new(1024);
    c.bench_function("queue_push_take_owner_only", |b| {
        b.iter(|| {
            queue.push(TaskId::internal(0, 1));
            black_box(queue.take());
        });
    });
}

fn steal(c: &mut Criterion) {
    let queue = WorkQueue::new(1024);
    c.bench_function("queue_steal", |b| {
        b.iter(|| {
            queue.push(TaskId::internal(0, 1));
            loop {
                match queue.steal() {
                    StealOutcome::Success(id) => break black_box(id),
                    StealOutcome::Retry => continue,
                    StealOutcome::Empty => unreachable!("just pushed one item"),
                }
            }
        });
    });
}

criterion_group!(benches, push_take_owner_only, steal);
criterion_main!(benches);
