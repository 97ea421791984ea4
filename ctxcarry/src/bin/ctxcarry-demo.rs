//! Shows context following work onto a reused pool thread.
//!
//! Configuration comes from `CTXCARRY_*` environment variables; logging
//! honours `RUST_LOG`.

use anyhow::Context as _;
use ctxcarry::observability::init_tracing;
use ctxcarry::prelude::*;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = CarryConfig::from_env().context("reading CTXCARRY_* configuration")?;
    init_tracing(&config);

    let context = ContextSlot::<String>::new("context");
    let pool = FixedThreadPool::named(config.pool_name.clone(), 1)?;

    // Undecorated: the worker sees whatever an earlier job left on its thread.
    let writer = context.clone();
    pool.execute(Box::new(move || {
        let _ = writer.set("left-by-earlier-job".to_string());
    }))?;
    context.set("init-value".to_string())?;
    let (sender, receiver) = crossbeam::channel::bounded(1);
    let reader = context.clone();
    pool.execute(Box::new(move || {
        let _ = sender.send(reader.get());
    }))?;
    let leaked = receiver.recv()?;
    info!(seen = ?leaked, "Plain pool task");

    // Decorated: each submission carries the context at submission time.
    let decorated = ContextPool::with_config(&pool, config);
    let reader = context.clone();
    let first = decorated.submit(move || reader.get())?;
    context.set("value-set-in-parent".to_string())?;
    let reader = context.clone();
    let second = decorated.submit(move || reader.get())?;

    let first = first.join()?;
    let second = second.join()?;
    info!(first = ?first, second = ?second, "Wrapped pool tasks");

    println!("plain pool task saw:      {leaked:?}");
    println!("first wrapped task saw:   {first:?}");
    println!("second wrapped task saw:  {second:?}");
    Ok(())
}
