use std::{
    sync::{Arc, Mutex},
    thread,
    time::Instant,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use seria::counter::SharedCounter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Funnel every update through a serial executor.
    Serial,
    /// Take a lock around every update.
    Mutex,
}

/// A seria counter example.
///
/// Spawns a number of threads that all hammer one counter. With `--paired`,
/// every incrementing thread gets a decrementing twin and the final value
/// should be zero.
#[derive(Parser, Debug)]
struct Args {
    /// How updates are kept from racing.
    #[arg(short, long, value_enum, default_value_t = Mode::Serial)]
    mode: Mode,

    /// Number of incrementing threads.
    #[arg(short, long, default_value_t = 10)]
    submitters: usize,

    /// Updates per thread.
    #[arg(short, long, default_value_t = 100_000)]
    updates: usize,

    /// Add a decrementing thread for every incrementing one.
    #[arg(long)]
    paired: bool,
}

fn run_serial(args: &Args) -> anyhow::Result<i64> {
    let counter = SharedCounter::new(0).context("Could not start the counter's executor")?;

    thread::scope(|s| {
        for i in 0..args.submitters {
            let counter = &counter;
            s.spawn(move || {
                debug!("incrementer {i} starting");
                for _ in 0..args.updates {
                    counter.increment().expect("counter should be running");
                }
            });

            if args.paired {
                s.spawn(move || {
                    debug!("decrementer {i} starting");
                    for _ in 0..args.updates {
                        counter.decrement().expect("counter should be running");
                    }
                });
            }
        }
    });

    Ok(counter.into_inner()?)
}

fn run_mutex(args: &Args) -> anyhow::Result<i64> {
    let counter = Arc::new(Mutex::new(0i64));

    let deltas: &[i64] = if args.paired { &[1, -1] } else { &[1] };
    let mut handles = Vec::new();

    for _ in 0..args.submitters {
        for &delta in deltas {
            let counter = Arc::clone(&counter);
            let updates = args.updates;
            handles.push(thread::spawn(move || {
                for _ in 0..updates {
                    *counter.lock().unwrap() += delta;
                }
            }));
        }
    }

    for handle in handles {
        handle.join().expect("updater panicked");
    }

    let value = *counter.lock().unwrap();
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let start = Instant::now();

    let value = match args.mode {
        Mode::Serial => run_serial(&args)?,
        Mode::Mutex => run_mutex(&args)?,
    };

    info!("{:?} run took {:?}", args.mode, start.elapsed());
    println!("Counter = {value}");

    Ok(())
}
