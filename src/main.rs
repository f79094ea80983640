use hybrid_pool::{SharedPool, ThreadPool};
use std::{sync::Arc, time::Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn do_work(i: i32) {
    println!("Hello there from {}", i);
}

fn do_boxed_work(i: Box<i32>) {
    println!("Hello there from boxed {}", *i);
}

fn do_recursive_work(pool: &SharedPool, i: u32) -> u32 {
    if i < 100 {
        let child = {
            let inner = pool.clone();
            pool.enqueue(move || do_recursive_work(&inner, i + 1))
        };
        match child.get() {
            Ok(depth) => println!("On recursive invocation {}", depth),
            Err(e) => println!("Recursive invocation {} failed: {}", i + 1, e),
        }
    }
    i
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let now = Instant::now();
    let pool: SharedPool = Arc::new(ThreadPool::new_cpu()?);

    info!("testing thread pool");
    pool.reset(4)?;

    for i in 0..10 {
        pool.enqueue(move || do_work(-i)).get()?;
    }

    for i in 0..500 {
        let _ = pool.enqueue(move || do_work(i));
    }

    for i in 0..500 {
        let _ = pool.enqueue(move || do_boxed_work(Box::new(i)));
    }

    do_recursive_work(&pool, 0);

    pool.shutdown();
    info!(metrics = ?pool.metrics(), "done testing thread pool");
    println!("elapsed: {:?}", now.elapsed());

    Ok(())
}
