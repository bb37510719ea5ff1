use std::sync::Arc;
use std::time::Duration;

use slot_timer::{
    command_queue, IntervalTickSource, LockingAdapter, TickSource, TimerId, TimerManager,
    TimerService, Wait,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

const CAPACITY: usize = 8;
const TICK_HZ: u32 = 1000;

/// Wires three timers to a tick source and prints every expiry.
async fn showcase<S>(name: &str, timers: Arc<S>, run_for: Duration)
where
    S: TimerService + 'static,
{
    println!("--- {name} ---");

    let (events, mut fired) = mpsc::unbounded_channel();
    timers
        .set_timeout_callback(Arc::new(move |id: TimerId| {
            let _ = events.send(id);
        }))
        .await
        .unwrap();

    timers.add_timer(100, false).await.unwrap();
    let reloading = timers.add_timer(300, true).await.unwrap();
    timers.add_timer(1000, true).await.unwrap();

    let mut source = IntervalTickSource::new();
    let ticked = Arc::clone(&timers);
    if let Err(e) = source.start(TICK_HZ, move || {
        let _ = ticked.process_tick();
    }) {
        eprintln!("Failed to start tick source: {e}");
        return;
    }

    let stop_at = run_for.as_millis() as u64;
    let mut slowed = false;
    while source.elapsed_ms() < stop_at {
        tokio::select! {
            Some(id) = fired.recv() => {
                println!("Timer ID {id} fired at {} ms", source.elapsed_ms());
            }
            _ = sleep(Duration::from_millis(10)) => {}
        }
        if !slowed && source.elapsed_ms() >= stop_at / 2 {
            println!("Stretching timer {reloading} to 500 ms");
            timers.change_timeout(reloading, 500).await.unwrap();
            slowed = true;
        }
    }
    source.stop();
}

#[tokio::main]
async fn main() {
    let locking = Arc::new(LockingAdapter::new(
        TimerManager::<CAPACITY>::new(TICK_HZ).unwrap(),
    ));
    showcase("critical-section adapter", locking, Duration::from_secs(3)).await;

    let (client, server) =
        command_queue(TimerManager::<CAPACITY>::new(TICK_HZ).unwrap(), 16).unwrap();
    let service = tokio::spawn(server.service_loop(Wait::Forever));
    showcase("command-queue adapter", Arc::new(client), Duration::from_secs(3)).await;

    let manager = service.await.unwrap();
    println!("Queued run statistics: {:?}", manager.statistics());
}
