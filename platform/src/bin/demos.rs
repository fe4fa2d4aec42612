// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Runnable walkthroughs of the platform crate's end-to-end scenarios, one subcommand each.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use platform::io::{stage_chained, HintFlags, IoThreadPool, RequestPool, RequestType};
use platform::memory::{Arena, BuddyAllocator};
use platform::scheduling::{Fence, PoolTypeDesc, Scheduler, SchedulerInit, UsageFlags};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "demos", about = "End-to-end walkthroughs of the platform crate")]
struct Cli {
    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand)]
enum Scenario {
    /// Diamond task dependency graph (A -> B,C -> D), joined by a fence.
    Diamond,
    /// An external task completed by an I/O callback, with a dependent task waiting on it.
    ExternalTask,
    /// Buddy allocator allocate/free/reallocate chain.
    ChainedReallocation,
    /// OPEN a file, then chain a READ off its completion callback.
    OpenReadChain,
    /// Spawn many short tasks and confirm every one ran before the scheduler finishes destroying.
    PoolShutdownDrain,
    /// Arena marker mark/allocate/reset round trip.
    ArenaMarker,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.scenario {
        Scenario::Diamond => diamond(),
        Scenario::ExternalTask => external_task(),
        Scenario::ChainedReallocation => chained_reallocation(),
        Scenario::OpenReadChain => open_read_chain(),
        Scenario::PoolShutdownDrain => pool_shutdown_drain(),
        Scenario::ArenaMarker => arena_marker(),
    }
}

// Pool type 0 is the auto-bound worker; pool type 1 is the one the client thread checks out.
const CLIENT_POOL_TYPE: usize = 1;

/// One auto-bound worker pool plus one client-checkout pool type, matching every scenario here:
/// a single OS thread defines tasks while the scheduler's own worker thread runs them.
fn single_client_scheduler(task_capacity: usize, global_arena_size: usize) -> Result<Scheduler> {
    let init = SchedulerInit {
        pool_types: vec![
            PoolTypeDesc {
                pool_count: 1,
                task_capacity: 256,
                local_arena_size: 16 * 1024,
                io_request_pool_size: 8,
                usage: UsageFlags::EXECUTE | UsageFlags::WORKER,
            },
            PoolTypeDesc {
                pool_count: 1,
                task_capacity,
                local_arena_size: 16 * 1024,
                io_request_pool_size: 8,
                usage: UsageFlags::DEFINE,
            },
        ],
        global_arena_size,
        io_worker_count: 2,
    };
    Scheduler::create(init, |_arena, _bytes| {}).context("failed to create scheduler")
}

unsafe fn increment(_env: *mut (), args: *const u8, _args_len: u8) {
    // Safety: every caller below passes a `*const AtomicU32` as this task's inline arg.
    let counter = unsafe { args.cast::<*const AtomicU32>().read_unaligned() };
    // Safety: the counter outlives every task that can observe it (it is stack-pinned in the
    // caller's scope for the duration of the whole scenario).
    unsafe { (*counter).fetch_add(1, Ordering::Relaxed) };
}

unsafe fn sleepy_increment(_env: *mut (), args: *const u8, _args_len: u8) {
    // Safety: see `increment`.
    let counter = unsafe { args.cast::<*const AtomicU32>().read_unaligned() };
    std::thread::sleep(Duration::from_micros(20));
    // Safety: see `increment`.
    unsafe { (*counter).fetch_add(1, Ordering::Relaxed) };
}

fn diamond() -> Result<()> {
    let scheduler = single_client_scheduler(256, 4096)?;
    let pool = scheduler
        .allocate_task_pool(CLIENT_POOL_TYPE)
        .context("failed to check out the client task pool")?;
    let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

    let counter = AtomicU32::new(0);
    let counter_ptr: *const AtomicU32 = &counter;

    let root = env.spawn_task(increment, &counter_ptr, &[])?;
    let left = env.spawn_task(increment, &counter_ptr, &[root])?;
    let right = env.spawn_task(increment, &counter_ptr, &[root])?;
    let join = env.spawn_task(increment, &counter_ptr, &[left, right])?;

    const ONE_SECOND_NANOS: u64 = 1_000_000_000;
    let fence = Fence::create(&env, &[join])?;
    if !fence.wait(ONE_SECOND_NANOS) {
        bail!("fence did not signal within one second");
    }

    let count = counter.load(Ordering::Relaxed);
    tracing::info!(count, "diamond dependency graph completed");
    if count != 4 {
        bail!("expected every one of the four tasks to run exactly once, got {count}");
    }
    println!("diamond: every task ran exactly once (counter = {count})");

    scheduler.return_task_pool(pool);
    drop(env);
    scheduler.destroy();
    Ok(())
}

fn external_task() -> Result<()> {
    let scheduler = Arc::new(single_client_scheduler(256, 4096)?);
    let pool = scheduler
        .allocate_task_pool(CLIENT_POOL_TYPE)
        .context("failed to check out the client task pool")?;
    let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

    let counter = AtomicU32::new(0);
    let counter_ptr: *const AtomicU32 = &counter;

    let external = scheduler.create_external_task(&pool, &0u8)?;
    let dependent = env.spawn_task(increment, &counter_ptr, &[external])?;

    let (noop_id, mut noop_req) = env
        .request_pool()
        .allocate()
        .context("io request pool exhausted")?;
    noop_req.kind = RequestType::Noop;
    let complete_scheduler = Arc::clone(&scheduler);
    noop_req.completion_callback = Some(Box::new(move |_result, _profile| {
        if let Err(err) = complete_scheduler.complete_task(external) {
            tracing::error!(%err, "failed to complete external task from io callback");
        }
        None
    }));
    env.io_pool()
        .submit_request(noop_id, noop_req)
        .context("failed to submit the noop request")?;

    env.wait_for_task(dependent);
    let count = counter.load(Ordering::Relaxed);
    if count != 1 {
        bail!("expected the dependent task to run exactly once, ran {count} times");
    }
    println!("external-task: dependent ran exactly once after the io callback completed it");

    scheduler.return_task_pool(pool);
    drop(env);
    let scheduler = Arc::try_unwrap(scheduler)
        .unwrap_or_else(|_| panic!("scheduler still has outstanding references"));
    scheduler.destroy();
    Ok(())
}

fn chained_reallocation() -> Result<()> {
    let mut alloc = BuddyAllocator::new(64, 65536, 0)?;

    let a = alloc.allocate(64, 1)?;
    let b = alloc.allocate(128, 1)?;
    let c = alloc.allocate(256, 1)?;
    let _d = alloc.allocate(512, 1)?;

    alloc.free(b);

    let grown = alloc.reallocate(a, 128, 1)?;
    if grown.offset != a.offset {
        bail!(
            "expected growing 64 -> 128 to merge with the just-freed buddy in place, offset {} -> {}",
            a.offset,
            grown.offset
        );
    }

    let moved = alloc.reallocate(c, 2048, 1)?;
    if moved.offset == c.offset {
        bail!("expected growing 256 -> 2048 to move to a new block, offset stayed at {}", c.offset);
    }

    let reclaimed = alloc.allocate(256, 1)?;
    if reclaimed.offset != c.offset {
        bail!(
            "expected the original 256-byte block at {} to be free again after the move, got {}",
            c.offset,
            reclaimed.offset
        );
    }

    println!(
        "chained-reallocation: 64->128 stayed at offset {}, 256->2048 moved to offset {}, original offset {} was freed",
        grown.offset, moved.offset, c.offset
    );
    Ok(())
}

fn open_read_chain() -> Result<()> {
    let path = std::env::temp_dir().join(format!("platform-demo-{}.bin", std::process::id()));
    std::fs::write(&path, b"hello from the platform crate's demos binary")
        .with_context(|| format!("failed to write {}", path.display()))?;

    let request_pool = Arc::new(RequestPool::create(4));
    let io_thread_pool = Arc::new(IoThreadPool::create(1, Arc::clone(&request_pool))?);

    let (open_id, mut open_req) = request_pool.allocate().context("request pool exhausted")?;
    open_req.kind = RequestType::Open;
    open_req.path = Some(path.clone());
    open_req.hint_flags = HintFlags::READ_ONLY;

    let (tx, rx) = mpsc::channel::<std::io::Result<(usize, bool, Vec<u8>)>>();
    let read_path = path.clone();
    let read_request_pool = Arc::clone(&request_pool);
    let read_io_pool = Arc::clone(&io_thread_pool);
    open_req.completion_callback = Some(Box::new(move |result, _profile| {
        if let Err(err) = result {
            let _ = tx.send(Err(err));
            return None;
        }

        let file = match std::fs::File::open(&read_path) {
            Ok(file) => file,
            Err(err) => {
                let _ = tx.send(Err(err));
                return None;
            }
        };
        let Some((read_id, mut read_req)) = read_request_pool.allocate() else {
            let _ = tx.send(Err(std::io::Error::other("request pool exhausted before read")));
            return None;
        };

        let mut buffer = Box::new([0u8; 4096]);
        let buffer_ptr =
            NonNull::new(buffer.as_mut_ptr()).expect("a boxed array's pointer is never null");
        read_req.kind = RequestType::Read;
        read_req.file = Some(file);
        // Safety: `buffer` is moved into this read's own completion callback below and stays
        // alive, exclusively borrowed by this request alone, until that callback runs.
        unsafe { read_req.set_buffer(buffer_ptr, buffer.len()) };
        read_req.completion_callback = Some(Box::new(move |read_result, _profile| {
            let sent = read_result.map(|outcome| {
                let data = buffer[..outcome.bytes_transferred].to_vec();
                (outcome.bytes_transferred, outcome.eof, data)
            });
            let _ = tx.send(sent);
            None
        }));

        stage_chained(&read_io_pool, read_id, read_req);
        Some(read_id)
    }));

    io_thread_pool
        .submit_request(open_id, open_req)
        .context("failed to submit the open request")?;

    let (bytes_read, eof, data) = rx
        .recv()
        .context("io worker thread disconnected before completing the read")?
        .context("read failed")?;

    std::fs::remove_file(&path).ok();
    Arc::try_unwrap(io_thread_pool)
        .unwrap_or_else(|_| panic!("io thread pool still has outstanding references"))
        .destroy();

    println!(
        "open-read-chain: read {bytes_read} bytes (eof = {eof}): {:?}",
        String::from_utf8_lossy(&data)
    );
    Ok(())
}

fn pool_shutdown_drain() -> Result<()> {
    const TASK_COUNT: usize = 10_000;

    let scheduler = single_client_scheduler(16384, 4096)?;
    let pool = scheduler
        .allocate_task_pool(CLIENT_POOL_TYPE)
        .context("failed to check out the client task pool")?;
    let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

    let counter = AtomicU32::new(0);
    let counter_ptr: *const AtomicU32 = &counter;
    for _ in 0..TASK_COUNT {
        env.spawn_task(sleepy_increment, &counter_ptr, &[])?;
    }

    scheduler.return_task_pool(pool);
    drop(env);
    scheduler.destroy();

    let count = counter.load(Ordering::Relaxed);
    let expected = u32::try_from(TASK_COUNT).expect("TASK_COUNT fits in u32");
    if count != expected {
        bail!("expected every one of {TASK_COUNT} tasks to run before destroy returned, ran {count}");
    }
    println!("pool-shutdown-drain: all {TASK_COUNT} tasks ran before the scheduler finished shutting down");
    Ok(())
}

fn arena_marker() -> Result<()> {
    let mut arena = Arena::new(64 * 1024);
    let marker = arena.mark();

    let first = arena.allocate(1024, 8)?;
    let _second = arena.allocate(2048, 8)?;
    let _third = arena.allocate(4096, 8)?;

    arena.reset_to(marker);
    let reused = arena.allocate(4096, 8)?;

    if reused.offset != first.offset {
        bail!(
            "expected resetting to the marker to reclaim offset {}, got {}",
            first.offset,
            reused.offset
        );
    }
    println!(
        "arena-marker: allocation after reset reused offset {} from before the marker",
        reused.offset
    );
    Ok(())
}
