use nodeflow::channel::{self, RecvError, SendError, TryRecvError};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_pending, assert_ready, task};

#[tokio::test]
async fn test_bounded_fifo() {
    let (tx, rx) = channel::new::<u32>(Some(8));
    for i in 0..8 {
        tx.send(i).await.unwrap();
    }
    for i in 0..8 {
        assert_eq!(rx.recv().await.unwrap(), i);
    }
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_capacity_one_suspends_second_send() {
    let (tx, rx) = channel::new::<u32>(Some(1));
    tx.send(1).await.unwrap();

    let mut second = task::spawn(tx.send(2));
    assert_pending!(second.poll());

    assert_eq!(rx.recv().await.unwrap(), 1);
    assert!(second.is_woken());
    assert!(assert_ready!(second.poll()).is_ok());

    // Nothing lost, nothing overwritten.
    assert_eq!(rx.recv().await.unwrap(), 2);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_recv_inapplicable_in_callback_mode() {
    let (tx, rx) = channel::new::<u32>(None);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    rx.into_callback(move |v| sink.lock().unwrap().push(v));

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    assert_eq!(rx.recv().await, Err(RecvError::CallbackMode));
    assert_eq!(rx.try_recv(), Err(TryRecvError::CallbackMode));

    assert_eq!(rx.dispatch(), 2);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_repeated_conversion_never_duplicates() {
    let (tx, rx) = channel::new::<u32>(Some(4));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    rx.into_callback(move |v| sink.lock().unwrap().push(v));
    tx.send(7).await.unwrap();

    let sink = seen.clone();
    rx.into_callback(move |v| sink.lock().unwrap().push(v));

    assert_eq!(rx.dispatch(), 1);
    assert_eq!(rx.dispatch(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn test_dispatch_next_waits_for_value() {
    let (tx, rx) = channel::new::<u32>(Some(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    rx.into_callback(move |v| sink.lock().unwrap().push(v));

    let mut next = task::spawn(rx.dispatch_next());
    assert_pending!(next.poll());

    tx.send(3).await.unwrap();
    assert!(next.is_woken());
    assert!(assert_ready!(next.poll()).is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![3]);

    drop(tx);
    assert_eq!(rx.dispatch_next().await, Err(RecvError::Disconnected));
}

#[tokio::test]
async fn test_dispatch_next_without_callback() {
    let (_tx, rx) = channel::new::<u32>(None);
    assert_eq!(rx.dispatch_next().await, Err(RecvError::NoCallback));
    assert_eq!(rx.dispatch(), 0);
}

#[tokio::test]
async fn test_call_tx_bypasses_queue() {
    let (mut tx, rx) = channel::new::<u32>(Some(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    rx.into_callback(move |v| sink.lock().unwrap().push(v));

    let counter = Arc::new(Mutex::new(0));
    let produced = counter.clone();
    tx.into_callback(move || {
        let mut n = produced.lock().unwrap();
        *n += 1;
        *n
    });
    assert!(tx.is_callback_mode());

    // Capacity is one, yet three values go through: the queue is never used.
    for _ in 0..3 {
        tx.call_tx().await.unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(rx.dispatch(), 0);

    let err = tx.send(9).await.unwrap_err();
    assert!(matches!(err, SendError::CallbackMode(9)));
}

#[tokio::test]
async fn test_call_tx_enqueues_for_polling_receiver() {
    let (mut tx, rx) = channel::new::<u32>(None);
    assert!(matches!(tx.call_tx().await, Err(SendError::NoCallback)));

    tx.into_callback(|| 42);
    tx.call_tx().await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), 42);

    drop(rx);
    let err = tx.call_tx().await.unwrap_err();
    assert_eq!(err.into_inner(), Some(42));
}
