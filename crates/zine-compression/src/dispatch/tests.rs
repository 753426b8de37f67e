use super::*;
use crate::{
    error::{CodecError, Error, WorkerError},
    rpc::{
        CorrelationId, Method, Payload, PortListener, RequestFrame, ResponseFrame,
        message_channel,
    },
};
use bytes::BytesMut;
use futures::FutureExt;
use std::collections::HashSet;

/// Controller wired to in-memory worker endpoints that the test drives by hand.
struct Harness {
    controller: AdmissionController,
    workers: Vec<PortListener<RequestFrame>>,
}

impl Harness {
    fn new(pool_size: usize) -> Self {
        let (dispatcher, workers) = wired_dispatcher(pool_size);
        Self {
            controller: AdmissionController::new(dispatcher),
            workers,
        }
    }

    fn submit(&mut self, tag: u64) -> (Admission, Pending) {
        let (queued, pending) = request(tag);
        (self.controller.submit(queued), pending)
    }

    /// Pops the next frame received by `worker`, panicking if there is none.
    fn frame_on(&mut self, worker: usize) -> RequestFrame {
        self.workers[worker]
            .try_recv()
            .unwrap_or_else(|| panic!("worker {worker} received no frame"))
    }

    fn idle(&mut self, worker: usize) -> bool {
        self.workers[worker].try_recv().is_none()
    }

    fn reply(&mut self, frame: &RequestFrame) -> Settled {
        self.controller.on_response(ResponseFrame::result(
            frame.id,
            Payload {
                value: frame.args.clone(),
                buffers: Vec::new(),
            },
        ))
    }

    fn assert_permit_invariant(&self) {
        let stats = self.controller.stats();
        assert_eq!(stats.pool_size - stats.available_permits, stats.in_flight);
        assert!(stats.queued == 0 || stats.available_permits == 0);
    }
}

fn wired_dispatcher(pool_size: usize) -> (Dispatcher, Vec<PortListener<RequestFrame>>) {
    let mut senders = Vec::new();
    let mut listeners = Vec::new();
    for _ in 0..pool_size {
        let (dispatcher_port, worker_port) = message_channel::<RequestFrame, ResponseFrame>();
        let (tx, _responses) = dispatcher_port.start();
        let (_worker_tx, requests) = worker_port.start();
        senders.push(tx);
        listeners.push(requests);
    }
    let dispatcher = Dispatcher::new(senders).expect("at least one worker");
    (dispatcher, listeners)
}

fn request(tag: u64) -> (QueuedRequest, Pending) {
    let (settle, pending) = Pending::channel();
    (
        QueuedRequest {
            method: Method::from("compress"),
            args: serde_json::json!({ "tag": tag }),
            transfer: Vec::new(),
            settle,
        },
        pending,
    )
}

fn tag(frame: &RequestFrame) -> u64 {
    frame.args["tag"].as_u64().expect("frame carries a tag")
}

fn resolved_tag(pending: Pending) -> u64 {
    let payload = pending
        .now_or_never()
        .expect("request should be settled")
        .expect("request should succeed");
    payload.value["tag"].as_u64().expect("payload carries a tag")
}

#[test]
fn round_robin_visits_every_worker_then_wraps() {
    let (mut dispatcher, mut workers) = wired_dispatcher(3);

    let mut order = Vec::new();
    for _ in 0..4 {
        let (dispatched, _pending) =
            dispatcher.dispatch(Method::from("compress"), serde_json::Value::Null, Vec::new());
        match dispatched {
            Dispatched::Sent { worker, .. } => order.push(worker),
            Dispatched::Failed { worker } => panic!("worker {worker} unexpectedly closed"),
        }
    }

    assert_eq!(order, vec![0, 1, 2, 0]);
    assert_eq!(dispatcher.cursor(), 1);
    assert_eq!(dispatcher.in_flight(), 4);
    assert!(workers[0].try_recv().is_some());
    assert!(workers[0].try_recv().is_some());
    assert!(workers[1].try_recv().is_some());
    assert!(workers[2].try_recv().is_some());
}

#[test]
fn correlation_ids_are_unique() {
    let (mut dispatcher, _workers) = wired_dispatcher(2);
    let mut seen = HashSet::new();
    for _ in 0..1000 {
        let (dispatched, _pending) =
            dispatcher.dispatch(Method::from("compress"), serde_json::Value::Null, Vec::new());
        let Dispatched::Sent { id, .. } = dispatched else {
            panic!("dispatch failed");
        };
        assert!(seen.insert(id), "duplicate correlation id {id}");
    }
}

#[test]
fn burst_within_capacity_dispatches_immediately() {
    let mut h = Harness::new(4);

    for tag in 0..3 {
        let (admission, _pending) = h.submit(tag);
        assert!(matches!(admission, Admission::Dispatched { .. }));
    }

    let stats = h.controller.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.in_flight, 3);
    assert_eq!(stats.available_permits, 1);
    h.assert_permit_invariant();
}

#[test]
fn burst_over_capacity_queues_the_excess_in_order() {
    let mut h = Harness::new(3);
    let mut admissions = Vec::new();
    for tag in 0..7 {
        let (admission, pending) = h.submit(tag);
        admissions.push((admission, pending));
    }

    let immediate = admissions
        .iter()
        .filter(|(a, _)| matches!(a, Admission::Dispatched { .. }))
        .count();
    assert_eq!(immediate, 3);

    let depths: Vec<_> = admissions
        .iter()
        .filter_map(|(a, _)| match a {
            Admission::Queued { depth } => Some(*depth),
            _ => None,
        })
        .collect();
    assert_eq!(depths, vec![1, 2, 3, 4]);
    assert_eq!(h.controller.permits(), 0);
    h.assert_permit_invariant();

    // Completing requests one at a time promotes queued ones in arrival order.
    let mut completed = Vec::new();
    let mut dispatched = Vec::new();
    for worker in [0, 1, 2, 0] {
        let frame = h.frame_on(worker);
        completed.push(tag(&frame));
        h.reply(&frame);
        h.assert_permit_invariant();
        dispatched.push(h.controller.stats().dispatched);
    }
    assert_eq!(completed, vec![0, 1, 2, 3]);
    assert_eq!(dispatched, vec![4, 5, 6, 7]);
    assert_eq!(h.controller.queued(), 0);

    let remaining: Vec<_> = [1, 2, 0].into_iter().map(|w| tag(&h.frame_on(w))).collect();
    assert_eq!(remaining, vec![4, 5, 6]);
}

#[test]
fn pool_of_two_drains_five_requests_in_fifo_order() {
    let mut h = Harness::new(2);

    let mut pending = Vec::new();
    let mut admissions = Vec::new();
    for tag in 1..=5 {
        let (admission, p) = h.submit(tag);
        admissions.push(admission);
        pending.push(p);
    }

    assert!(matches!(admissions[0], Admission::Dispatched { worker: 0, .. }));
    assert!(matches!(admissions[1], Admission::Dispatched { worker: 1, .. }));
    assert_eq!(admissions[2], Admission::Queued { depth: 1 });
    assert_eq!(admissions[3], Admission::Queued { depth: 2 });
    assert_eq!(admissions[4], Admission::Queued { depth: 3 });

    let r1 = h.frame_on(0);
    let r2 = h.frame_on(1);
    assert_eq!((tag(&r1), tag(&r2)), (1, 2));
    assert!(h.idle(0) && h.idle(1));

    // R1 completes: R3 goes to worker 0.
    assert_eq!(h.reply(&r1), Settled::Matched { worker: 0 });
    let r3 = h.frame_on(0);
    assert_eq!(tag(&r3), 3);
    assert!(h.idle(1));

    // R2 completes: R4 goes to worker 1.
    assert_eq!(h.reply(&r2), Settled::Matched { worker: 1 });
    let r4 = h.frame_on(1);
    assert_eq!(tag(&r4), 4);

    // R3 completes: R5 goes to worker 0.
    assert_eq!(h.reply(&r3), Settled::Matched { worker: 0 });
    let r5 = h.frame_on(0);
    assert_eq!(tag(&r5), 5);
    assert_eq!(h.controller.queued(), 0);

    h.reply(&r4);
    h.reply(&r5);
    assert!(h.controller.is_idle());
    h.assert_permit_invariant();

    let tags: Vec<_> = pending.into_iter().map(resolved_tag).collect();
    assert_eq!(tags, vec![1, 2, 3, 4, 5]);

    let stats = h.controller.stats();
    assert_eq!(stats.dispatched, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn failed_request_rejects_only_itself_and_frees_its_slot() {
    let mut h = Harness::new(2);
    let (_, failing) = h.submit(1);
    let (_, sibling) = h.submit(2);
    let (queued, waiting) = h.submit(3);
    assert_eq!(queued, Admission::Queued { depth: 1 });

    let f1 = h.frame_on(0);
    let f2 = h.frame_on(1);

    let settled = h.controller.on_response(ResponseFrame::error(
        f1.id,
        WorkerError::Codec(CodecError::new("boom")),
    ));
    assert_eq!(settled, Settled::Matched { worker: 0 });

    assert_eq!(
        failing.now_or_never(),
        Some(Err(Error::Operation(WorkerError::Codec(CodecError::new(
            "boom"
        )))))
    );

    // The freed slot went to the queued request.
    let f3 = h.frame_on(0);
    assert_eq!(tag(&f3), 3);

    h.reply(&f2);
    h.reply(&f3);
    assert_eq!(resolved_tag(sibling), 2);
    assert_eq!(resolved_tag(waiting), 3);
    assert!(h.controller.is_idle());
}

#[test]
fn unmatched_response_is_dropped_without_side_effects() {
    let mut h = Harness::new(2);
    let (_, mut pending) = h.submit(1);
    let frame = h.frame_on(0);

    let settled = h.controller.on_response(ResponseFrame::result(
        CorrelationId::from_raw(9_999),
        Payload::default(),
    ));
    assert_eq!(settled, Settled::Unmatched);
    assert!((&mut pending).now_or_never().is_none());

    let stats = h.controller.stats();
    assert_eq!(stats.unmatched_responses, 1);
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.available_permits, 1);

    h.reply(&frame);
    assert_eq!(resolved_tag(pending), 1);
}

#[test]
fn a_request_is_settled_at_most_once() {
    let mut h = Harness::new(1);
    let (_, pending) = h.submit(1);
    let frame = h.frame_on(0);

    assert_eq!(h.reply(&frame), Settled::Matched { worker: 0 });
    assert_eq!(h.reply(&frame), Settled::Unmatched);
    assert_eq!(resolved_tag(pending), 1);

    let stats = h.controller.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.unmatched_responses, 1);
    assert_eq!(stats.available_permits, 1);
}

#[test]
fn closed_worker_channel_rejects_and_restores_the_permit() {
    let (dispatcher, mut workers) = wired_dispatcher(2);
    let mut controller = AdmissionController::new(dispatcher);
    drop(workers.remove(0));

    let (first, pending) = request(1);
    assert_eq!(controller.submit(first), Admission::Failed { worker: 0 });
    assert!(matches!(
        pending.now_or_never(),
        Some(Err(Error::ChannelError { .. }))
    ));
    assert_eq!(controller.permits(), 2);

    // The cursor moved on, so the next request reaches the live worker.
    let (second, _pending) = request(2);
    assert!(matches!(
        controller.submit(second),
        Admission::Dispatched { worker: 1, .. }
    ));
}

#[test]
fn transferred_buffers_travel_with_the_frame() {
    let (mut dispatcher, mut workers) = wired_dispatcher(1);
    let buffer = BytesMut::from(&b"depth samples"[..]);

    let (_dispatched, _pending) = dispatcher.dispatch(
        Method::from("compress"),
        serde_json::Value::Null,
        vec![buffer],
    );

    let frame = workers[0].try_recv().expect("frame delivered");
    assert_eq!(frame.transfer, vec![BytesMut::from(&b"depth samples"[..])]);
}

#[test]
fn dropping_the_controller_rejects_everything_outstanding() {
    let mut h = Harness::new(1);
    let (_, in_flight) = h.submit(1);
    let (_, queued) = h.submit(2);

    drop(h);

    assert_eq!(in_flight.now_or_never(), Some(Err(Error::PoolDestroyed)));
    assert_eq!(queued.now_or_never(), Some(Err(Error::PoolDestroyed)));
}

#[tokio::test]
async fn draining_coordinator_refuses_new_requests_and_waits_for_in_flight() {
    use coordinator::{Command, dispatch_loop};
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::CancellationToken;

    let (dispatcher_port, worker_port) = message_channel::<RequestFrame, ResponseFrame>();
    let (tx, responses) = dispatcher_port.start();
    let (worker_tx, mut requests) = worker_port.start();

    let (commands, command_rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let coordinator = tokio::spawn(dispatch_loop(
        AdmissionController::new(Dispatcher::new(vec![tx]).expect("one worker")),
        command_rx,
        vec![responses],
        token.clone(),
    ));

    let (first, in_flight) = request(1);
    let (reply, drained) = oneshot::channel();
    let (late, refused) = request(2);
    assert!(commands.send(Command::Request(first)).is_ok());
    assert!(commands.send(Command::Drain { reply }).is_ok());
    assert!(commands.send(Command::Request(late)).is_ok());

    assert_eq!(refused.await, Err(Error::ServiceShutdown));

    let frame = requests.recv().await.expect("first request dispatched");
    let response = ResponseFrame::result(
        frame.id,
        Payload {
            value: frame.args.clone(),
            buffers: Vec::new(),
        },
    );
    assert!(worker_tx.post(response).is_ok());

    drained.await.expect("drain completes once idle");
    assert_eq!(resolved_tag(in_flight), 1);

    token.cancel();
    coordinator.await.expect("coordinator exits cleanly");
}

#[test]
fn dispatcher_without_workers_is_rejected() {
    assert!(matches!(
        Dispatcher::new(Vec::new()),
        Err(Error::InvalidConfig { .. })
    ));
}

#[test]
fn request_sent_after_the_coordinator_stopped_is_rejected() {
    let (commands, command_rx) = tokio::sync::mpsc::unbounded_channel();
    drop(command_rx);

    let (queued, pending) = request(1);
    let unsent = commands.send(coordinator::Command::Request(queued));
    assert!(unsent.is_err());
    drop(unsent);

    assert_eq!(pending.now_or_never(), Some(Err(Error::PoolDestroyed)));
}
