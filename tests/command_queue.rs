use std::collections::HashSet;
use std::time::Duration;

use slot_timer::{command_queue, Serviced, TimerError, TimerId, TimerManager, Wait};

const PRODUCERS: u32 = 4;
const PER_PRODUCER: u32 = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_producers_are_applied_in_enqueue_order() {
    let (client, server) = command_queue(TimerManager::<64>::default(), 8).unwrap();
    let service = tokio::spawn(server.service_loop(Wait::Forever));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let client = client.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                for k in 0..PER_PRODUCER {
                    if fastrand::bool() {
                        tokio::task::yield_now().await;
                    }
                    // the timeout encodes who asked for the slot
                    let timeout = (p + 1) * 1000 + k;
                    pending.push((
                        timeout,
                        client
                            .request_add_timer(timeout, false, Wait::Forever)
                            .await
                            .unwrap(),
                    ));
                }
                let mut done = Vec::new();
                for (timeout, p) in pending {
                    done.push((timeout, p.wait().await.unwrap()));
                }
                done
            })
        })
        .collect();
    drop(client);

    let mut results = Vec::new();
    for producer in producers {
        results.push(producer.await.unwrap());
    }
    let manager = service.await.unwrap();

    let mut seen = HashSet::new();
    for done in &results {
        // each producer's commands were applied in the order it sent them
        assert!(done.windows(2).all(|w| w[0].1.seq < w[1].1.seq));
        for (timeout, completion) in done {
            // first-fit allocation means the n-th applied add gets slot n
            assert_eq!(completion.value, Ok(TimerId::new(completion.seq as usize)));
            let slot = manager.slot(TimerId::new(completion.seq as usize)).unwrap();
            assert_eq!(slot.timeout_ms(), *timeout);
            assert!(seen.insert(completion.seq));
        }
    }
    let total = u64::from(PRODUCERS * PER_PRODUCER);
    assert_eq!(seen, (0..total).collect::<HashSet<_>>());
}

#[tokio::test(start_paused = true)]
async fn saturated_queue_keeps_order_and_accepted_commands() {
    let (client, mut server) = command_queue(TimerManager::<8>::default(), 3).unwrap();

    let add = client.request_add_timer(10, true, Wait::NoWait).await.unwrap();
    let change = client
        .request_change_timeout(TimerId::new(0), 20, Wait::NoWait)
        .await
        .unwrap();
    client.request_process_tick_from_isr().unwrap();

    assert_eq!(
        client.request_cancel_timer(TimerId::new(0), Wait::NoWait).await.unwrap_err(),
        TimerError::QueueFull
    );
    assert_eq!(client.request_process_tick_from_isr(), Err(TimerError::QueueFull));

    // a producer willing to wait gets in once the server frees a place
    let waiting = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .request_cancel_timer(TimerId::new(0), Wait::Timeout(Duration::from_secs(1)))
                .await
        })
    };
    tokio::task::yield_now().await;
    assert_eq!(server.service_next(Wait::NoWait).await, Serviced::Dispatched);
    let cancel = waiting.await.unwrap().unwrap();

    while server.service_next(Wait::NoWait).await == Serviced::Dispatched {}

    assert_eq!(add.wait().await.unwrap().seq, 0);
    assert_eq!(change.wait().await.unwrap().seq, 1);
    let cancelled = cancel.wait().await.unwrap();
    assert_eq!(cancelled.seq, 3);
    assert_eq!(cancelled.value, Ok(()));

    let manager = server.manager();
    assert_eq!(manager.statistics().ticks_processed, 1);
    let slot = manager.slot(TimerId::new(0)).unwrap();
    assert!(!slot.is_active());
    assert_eq!(slot.timeout_ms(), 20);
}

#[tokio::test]
async fn fire_and_forget_requests_are_still_applied() {
    let (client, mut server) = command_queue(TimerManager::<2>::default(), 4).unwrap();
    drop(client.request_add_timer(5, false, Wait::NoWait).await.unwrap());
    drop(client.request_add_timer(5, false, Wait::NoWait).await.unwrap());
    drop(client.request_add_timer(5, false, Wait::NoWait).await.unwrap());
    drop(client);

    while server.service_next(Wait::Forever).await == Serviced::Dispatched {}
    assert_eq!(server.dispatched(), 3);
    assert_eq!(server.manager().allocated_count(), 2);
    assert_eq!(server.service_next(Wait::NoWait).await, Serviced::Closed);
}
