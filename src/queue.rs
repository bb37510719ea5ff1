//! Command-queue front end for a [`TimerManager`].
//!
//! Producers hold a [`TimerClient`] and turn every mutation, ticks included,
//! into a message on a bounded FIFO. A single [`TimerServer`] owns the
//! manager and applies the messages one at a time in arrival order, so the
//! manager itself needs no locking.

use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "logging")]
use log::{debug, warn};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::errors::TimerError;
use crate::manager::TimerManager;
use crate::timer::{SharedCallback, TimeoutCallback, TimerId};

/// Queue depth used when callers have no better figure.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// How long to wait for room (when sending) or for a message (when serving).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
    /// Fail or return immediately.
    NoWait,
    /// Wait at most this long.
    Timeout(Duration),
    /// Wait as long as it takes.
    #[default]
    Forever,
}

/// Result of one queued command, stamped with the order it was applied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T> {
    /// Position of the command in the server's dispatch order, starting at 0.
    pub seq: u64,
    pub value: T,
}

/// Producer-side handle to the result of a queued command.
///
/// Dropping it turns the request into fire-and-forget; the command is still
/// applied.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Completion<T>>,
}

impl<T> Pending<T> {
    /// Waits until the server has applied the command.
    pub async fn wait(self) -> Result<Completion<T>, TimerError> {
        self.rx.await.map_err(|_| TimerError::QueueClosed)
    }

    /// Returns the completion if the command has already been applied.
    pub fn try_take(&mut self) -> Option<Completion<T>> {
        self.rx.try_recv().ok()
    }
}

type Reply<T> = oneshot::Sender<Completion<T>>;

enum Command {
    Add {
        timeout_ms: u32,
        auto_reload: bool,
        reply: Reply<Result<TimerId, TimerError>>,
    },
    Cancel {
        id: TimerId,
        reply: Reply<Result<(), TimerError>>,
    },
    Remove {
        id: TimerId,
        reply: Reply<Result<(), TimerError>>,
    },
    Resume {
        id: TimerId,
        reply: Reply<Result<(), TimerError>>,
    },
    ChangeTimeout {
        id: TimerId,
        timeout_ms: u32,
        reply: Reply<Result<(), TimerError>>,
    },
    InstallCallback {
        callback: SharedCallback,
        reply: Reply<()>,
    },
    ProcessTick,
}

/// Creates a queue of `depth` commands in front of `manager`.
pub fn command_queue<const CAPACITY: usize>(
    manager: TimerManager<CAPACITY>,
    depth: usize,
) -> Result<(TimerClient, TimerServer<CAPACITY>), TimerError> {
    if depth == 0 {
        return Err(TimerError::InvalidParameter(
            "Queue depth must be greater than zero.".into(),
        ));
    }
    let (tx, rx) = mpsc::channel(depth);
    Ok((
        TimerClient { tx },
        TimerServer {
            rx,
            manager,
            next_seq: 0,
        },
    ))
}

/// Producer handle. Cheap to clone; one per producing task.
#[derive(Clone)]
pub struct TimerClient {
    tx: mpsc::Sender<Command>,
}

impl TimerClient {
    /// Queues an allocation; the completion carries the new id.
    pub async fn request_add_timer(
        &self,
        timeout_ms: u32,
        auto_reload: bool,
        wait: Wait,
    ) -> Result<Pending<Result<TimerId, TimerError>>, TimerError> {
        self.request(wait, |reply| Command::Add {
            timeout_ms,
            auto_reload,
            reply,
        })
        .await
    }

    /// Queues a cancel for `id`.
    pub async fn request_cancel_timer(
        &self,
        id: TimerId,
        wait: Wait,
    ) -> Result<Pending<Result<(), TimerError>>, TimerError> {
        self.request(wait, |reply| Command::Cancel { id, reply }).await
    }

    /// Queues a removal for `id`.
    pub async fn request_remove_timer(
        &self,
        id: TimerId,
        wait: Wait,
    ) -> Result<Pending<Result<(), TimerError>>, TimerError> {
        self.request(wait, |reply| Command::Remove { id, reply }).await
    }

    /// Queues a resume for `id`.
    pub async fn request_resume(
        &self,
        id: TimerId,
        wait: Wait,
    ) -> Result<Pending<Result<(), TimerError>>, TimerError> {
        self.request(wait, |reply| Command::Resume { id, reply }).await
    }

    /// Queues a period change for `id`.
    pub async fn request_change_timeout(
        &self,
        id: TimerId,
        new_timeout_ms: u32,
        wait: Wait,
    ) -> Result<Pending<Result<(), TimerError>>, TimerError> {
        self.request(wait, |reply| Command::ChangeTimeout {
            id,
            timeout_ms: new_timeout_ms,
            reply,
        })
        .await
    }

    /// Queues installation of the expiry callback.
    pub async fn request_callback_install<C>(
        &self,
        callback: C,
        wait: Wait,
    ) -> Result<Pending<()>, TimerError>
    where
        C: TimeoutCallback + 'static,
    {
        self.request_shared_callback_install(Arc::new(callback), wait)
            .await
    }

    /// Queues installation of an already shared expiry callback.
    pub async fn request_shared_callback_install(
        &self,
        callback: SharedCallback,
        wait: Wait,
    ) -> Result<Pending<()>, TimerError> {
        self.request(wait, |reply| Command::InstallCallback { callback, reply })
            .await
    }

    /// Queues one tick without waiting for room in the queue. Fails with
    /// `QueueFull` instead, so the tick is lost.
    pub fn request_process_tick_from_isr(&self) -> Result<(), TimerError> {
        self.tx.try_send(Command::ProcessTick).map_err(|e| match e {
            TrySendError::Full(_) => TimerError::QueueFull,
            TrySendError::Closed(_) => TimerError::QueueClosed,
        })
    }

    async fn request<T>(
        &self,
        wait: Wait,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<Pending<T>, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(build(reply), wait).await?;
        Ok(Pending { rx })
    }

    async fn enqueue(&self, cmd: Command, wait: Wait) -> Result<(), TimerError> {
        match wait {
            Wait::NoWait => self.tx.try_send(cmd).map_err(|e| match e {
                TrySendError::Full(_) => TimerError::QueueFull,
                TrySendError::Closed(_) => TimerError::QueueClosed,
            }),
            Wait::Timeout(limit) => match time::timeout(limit, self.tx.send(cmd)).await {
                Ok(sent) => sent.map_err(|_| TimerError::QueueClosed),
                Err(_) => Err(TimerError::EnqueueTimeout),
            },
            Wait::Forever => self
                .tx
                .send(cmd)
                .await
                .map_err(|_| TimerError::QueueClosed),
        }
    }
}

/// What one call to [`TimerServer::service_next`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serviced {
    /// A command was applied.
    Dispatched,
    /// Nothing arrived within the wait period.
    Idle,
    /// Every client is gone and the queue is drained.
    Closed,
}

/// Sole owner of the manager. Run [`service_loop`](Self::service_loop) in a
/// dedicated task.
pub struct TimerServer<const CAPACITY: usize> {
    rx: mpsc::Receiver<Command>,
    manager: TimerManager<CAPACITY>,
    next_seq: u64,
}

impl<const CAPACITY: usize> TimerServer<CAPACITY> {
    /// The manager as of the last applied command.
    pub fn manager(&self) -> &TimerManager<CAPACITY> {
        &self.manager
    }

    /// Number of commands applied so far.
    pub fn dispatched(&self) -> u64 {
        self.next_seq
    }

    /// Applies commands until every [`TimerClient`] has been dropped, then
    /// hands the manager back.
    ///
    /// A failed command does not stop the loop; its error goes to the
    /// producer's [`Pending`] handle.
    pub async fn service_loop(mut self, wait: Wait) -> TimerManager<CAPACITY> {
        #[cfg(feature = "logging")]
        debug!("Timer service loop started.");
        loop {
            match self.service_next(wait).await {
                Serviced::Dispatched => {}
                Serviced::Idle => {
                    if wait == Wait::NoWait {
                        tokio::task::yield_now().await;
                    }
                }
                Serviced::Closed => break,
            }
        }
        #[cfg(feature = "logging")]
        debug!("Timer service loop stopped after {} commands.", self.next_seq);
        self.manager
    }

    /// Waits for one command according to `wait` and applies it.
    pub async fn service_next(&mut self, wait: Wait) -> Serviced {
        let received = match wait {
            Wait::NoWait => match self.rx.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => return Serviced::Idle,
                Err(TryRecvError::Disconnected) => None,
            },
            Wait::Timeout(limit) => match time::timeout(limit, self.rx.recv()).await {
                Ok(cmd) => cmd,
                Err(_) => return Serviced::Idle,
            },
            Wait::Forever => self.rx.recv().await,
        };

        match received {
            Some(cmd) => {
                self.dispatch(cmd);
                Serviced::Dispatched
            }
            None => Serviced::Closed,
        }
    }

    fn dispatch(&mut self, cmd: Command) {
        let seq = self.next_seq;
        self.next_seq += 1;

        match cmd {
            Command::Add {
                timeout_ms,
                auto_reload,
                reply,
            } => {
                let result = self.manager.add_new(timeout_ms, auto_reload);
                finish(reply, seq, result);
            }
            Command::Cancel { id, reply } => {
                let result = self.manager.cancel_timer(id);
                finish(reply, seq, result);
            }
            Command::Remove { id, reply } => {
                let result = self.manager.remove_timer(id);
                finish(reply, seq, result);
            }
            Command::Resume { id, reply } => {
                let result = self.manager.resume(id);
                finish(reply, seq, result);
            }
            Command::ChangeTimeout {
                id,
                timeout_ms,
                reply,
            } => {
                let result = self.manager.change_timeout(id, timeout_ms);
                finish(reply, seq, result);
            }
            Command::InstallCallback { callback, reply } => {
                drop(self.manager.install_callback(callback));
                complete(reply, seq, ());
            }
            Command::ProcessTick => self.manager.process_tick(),
        }
    }
}

fn finish<T>(reply: Reply<Result<T, TimerError>>, seq: u64, result: Result<T, TimerError>) {
    #[cfg(feature = "logging")]
    {
        if let Err(e) = &result {
            warn!("Queued command #{} failed: {}", seq, e);
        }
    }
    complete(reply, seq, result);
}

fn complete<T>(reply: Reply<T>, seq: u64, value: T) {
    // the producer may have dropped its handle
    let _ = reply.send(Completion { seq, value });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::timer::SlotState;

    fn queue<const N: usize>(depth: usize) -> (TimerClient, TimerServer<N>) {
        command_queue(TimerManager::default(), depth).unwrap()
    }

    #[test]
    fn rejects_zero_depth() {
        assert!(matches!(
            command_queue(TimerManager::<2>::default(), 0),
            Err(TimerError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn single_producer_commands_apply_in_order() {
        let (client, mut server) = queue::<4>(8);
        let add = client.request_add_timer(10, true, Wait::Forever).await.unwrap();
        let change = client
            .request_change_timeout(TimerId::new(0), 30, Wait::Forever)
            .await
            .unwrap();
        let cancel = client
            .request_cancel_timer(TimerId::new(0), Wait::Forever)
            .await
            .unwrap();

        for _ in 0..3 {
            assert_eq!(server.service_next(Wait::NoWait).await, Serviced::Dispatched);
        }
        assert_eq!(server.service_next(Wait::NoWait).await, Serviced::Idle);

        assert_eq!(
            add.wait().await.unwrap(),
            Completion { seq: 0, value: Ok(TimerId::new(0)) }
        );
        assert_eq!(change.wait().await.unwrap(), Completion { seq: 1, value: Ok(()) });
        assert_eq!(cancel.wait().await.unwrap(), Completion { seq: 2, value: Ok(()) });

        let slot = server.manager().slot(TimerId::new(0)).unwrap();
        assert_eq!(slot.state(), SlotState::Inactive);
        assert_eq!(slot.timeout_ms(), 30);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_losing_accepted_commands() {
        let (client, mut server) = queue::<8>(4);
        let mut accepted = Vec::new();
        for ms in 1..=4 {
            accepted.push(client.request_add_timer(ms, false, Wait::NoWait).await.unwrap());
        }
        assert_eq!(
            client.request_add_timer(99, false, Wait::NoWait).await.unwrap_err(),
            TimerError::QueueFull
        );
        assert_eq!(client.request_process_tick_from_isr(), Err(TimerError::QueueFull));

        while server.service_next(Wait::NoWait).await == Serviced::Dispatched {}
        for (ix, pending) in accepted.into_iter().enumerate() {
            let done = pending.wait().await.unwrap();
            assert_eq!(done.seq, ix as u64);
            assert_eq!(done.value, Ok(TimerId::new(ix)));
            let slot = server.manager().slot(TimerId::new(ix)).unwrap();
            assert_eq!(slot.timeout_ms(), ix as u32 + 1);
        }
        assert_eq!(server.manager().allocated_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_enqueue_gives_up_when_queue_stays_full() {
        let (client, _server) = queue::<2>(1);
        client.request_process_tick_from_isr().unwrap();
        let err = client
            .request_add_timer(5, false, Wait::Timeout(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, TimerError::EnqueueTimeout);
    }

    #[tokio::test]
    async fn failed_commands_report_through_completion() {
        let (client, mut server) = queue::<1>(8);
        let first = client.request_add_timer(5, false, Wait::Forever).await.unwrap();
        let second = client.request_add_timer(5, false, Wait::Forever).await.unwrap();
        let bogus = client
            .request_resume(TimerId::new(3), Wait::Forever)
            .await
            .unwrap();
        for _ in 0..3 {
            server.service_next(Wait::NoWait).await;
        }
        assert_eq!(first.wait().await.unwrap().value, Ok(TimerId::new(0)));
        assert_eq!(
            second.wait().await.unwrap().value,
            Err(TimerError::CapacityExhausted(1))
        );
        assert_eq!(
            bogus.wait().await.unwrap().value,
            Err(TimerError::InvalidHandle(TimerId::new(3)))
        );
    }

    #[tokio::test]
    async fn ticks_are_ordered_with_mutations() {
        let (client, server) = queue::<2>(32);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        drop(
            client
                .request_callback_install(
                    move |id: TimerId| sink.lock().unwrap().push(id),
                    Wait::Forever,
                )
                .await
                .unwrap(),
        );
        drop(client.request_add_timer(2, false, Wait::Forever).await.unwrap());
        client.request_process_tick_from_isr().unwrap();
        drop(
            client
                .request_remove_timer(TimerId::new(0), Wait::Forever)
                .await
                .unwrap(),
        );
        client.request_process_tick_from_isr().unwrap();
        drop(client);

        let manager = server.service_loop(Wait::Forever).await;
        // removed before its second tick, so it never fired
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(manager.statistics().ticks_processed, 2);
        assert_eq!(manager.allocated_count(), 0);
    }

    #[tokio::test]
    async fn dropped_server_closes_the_queue() {
        let (client, server) = queue::<2>(4);
        let pending = client.request_add_timer(5, false, Wait::NoWait).await.unwrap();
        drop(server);
        assert_eq!(pending.wait().await.unwrap_err(), TimerError::QueueClosed);
        assert_eq!(
            client.request_add_timer(5, false, Wait::Forever).await.unwrap_err(),
            TimerError::QueueClosed
        );
        assert_eq!(client.request_process_tick_from_isr(), Err(TimerError::QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_service_wait_reports_idle() {
        let (_client, mut server) = queue::<2>(4);
        assert_eq!(
            server.service_next(Wait::Timeout(Duration::from_millis(5))).await,
            Serviced::Idle
        );
        assert_eq!(server.dispatched(), 0);
    }

    #[tokio::test]
    async fn try_take_sees_completion_after_dispatch() {
        let (client, mut server) = queue::<2>(4);
        let mut pending = client.request_add_timer(5, true, Wait::NoWait).await.unwrap();
        assert!(pending.try_take().is_none());
        server.service_next(Wait::Forever).await;
        assert_eq!(pending.try_take().unwrap().value, Ok(TimerId::new(0)));
    }
}
