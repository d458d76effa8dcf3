use std::borrow::Cow;

use comms::{
    Deserialize, Serialize, VarMap,
    msg::{Command, Msg, Payload, ResidualContribution, SolveStatus},
    peer::{PeerMsg, peer_channel},
    specs::worker::{SolverSpec, WorkerSpec},
};
use ndarray::{arr0, arr1, arr2};
use tokio::io::{self, AsyncReadExt};

fn sample_map() -> VarMap {
    let mut map = VarMap::new();
    map.insert(1, arr1(&[0.1, 0.2, 0.3]).into_dyn());
    map.insert(0, arr2(&[[1.0, -1.0], [0.5, 1e-12]]).into_dyn());
    map.insert(9, arr0(std::f64::consts::PI).into_dyn());
    map
}

#[test]
fn serialize_deserialize() {
    let map = sample_map();
    let msg = Msg::Data(Payload::Consensus(Cow::Borrowed(&map)));

    let mut buf = Vec::new();
    assert!(msg.serialize(&mut buf).is_none());

    let Msg::Data(Payload::Consensus(back)) = Msg::deserialize(&buf).unwrap() else {
        panic!("expected a consensus payload");
    };

    assert_eq!(back.into_owned(), map);
}

#[test]
fn unknown_header_is_invalid_data() {
    let buf = 7u32.to_be_bytes();
    let err = Msg::deserialize(&buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 4096;

    let xbar = sample_map();
    let dual: VarMap = xbar.iter().map(|(id, v)| (id, v.mapv(|x| -x))).collect();

    let (one, two) = io::duplex(SIZE);
    let (orch_rx, orch_tx) = io::split(one);
    let (_, mut tx) = comms::channel(orch_rx, orch_tx);

    let (worker_rx, worker_tx) = io::split(two);
    let (mut rx, _) = comms::channel(worker_rx, worker_tx);

    let msg = Msg::Data(Payload::Scatter {
        iteration: 3,
        xbar: Cow::Borrowed(&xbar),
        dual: Cow::Borrowed(&dual),
    });
    tx.send(&msg).await.unwrap();

    let residual = ResidualContribution {
        primal: 1.5,
        dual: 0.25,
        x: 2.0,
        xbar: 3.0,
        u: 4.0,
        size: 7,
    };
    tx.send(&Msg::Data(Payload::Residual(residual))).await.unwrap();
    tx.send(&Msg::Err(Cow::Borrowed("boom"))).await.unwrap();

    let mut buf = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Scatter {
            iteration,
            xbar: got_xbar,
            dual: got_dual,
        }) => {
            assert_eq!(iteration, 3);
            assert_eq!(*got_xbar, xbar);
            assert_eq!(*got_dual, dual);
        }
        other => panic!("unexpected {}", other.kind()),
    }

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Residual(got)) => assert_eq!(got, residual),
        other => panic!("unexpected {}", other.kind()),
    }

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Err(text) => assert_eq!(text, "boom"),
        other => panic!("unexpected {}", other.kind()),
    }
}

#[tokio::test]
async fn error_frame_length_counts_the_text() {
    let (one, mut two) = io::duplex(1024);
    let (orch_rx, orch_tx) = io::split(one);
    let (_, mut tx) = comms::channel(orch_rx, orch_tx);

    tx.send(&Msg::Err(Cow::Borrowed("boom"))).await.unwrap();
    drop(tx);

    let mut frame = Vec::new();
    two.read_to_end(&mut frame).await.unwrap();

    assert_eq!(frame.len(), 8 + 4 + 4);
    assert_eq!(frame[..8], 8u64.to_be_bytes());
    assert_eq!(frame[8..12], 0u32.to_be_bytes());
    assert_eq!(&frame[12..], b"boom");
}

#[tokio::test]
async fn control_carries_the_worker_spec() {
    let (one, two) = io::duplex(1024);
    let (orch_rx, orch_tx) = io::split(one);
    let (_, mut tx) = comms::channel(orch_rx, orch_tx);
    let (worker_rx, worker_tx) = io::split(two);
    let (mut rx, _) = comms::channel(worker_rx, worker_tx);

    let spec = WorkerSpec {
        node_id: 2,
        rho: 0.5,
        solver: SolverSpec::Quadratic {
            weight: 1.0,
            targets: sample_map(),
        },
    };
    tx.send(&Msg::Control(Command::CreateWorker(spec.clone())))
        .await
        .unwrap();

    let mut buf = Vec::new();
    let Msg::Control(Command::CreateWorker(got)) = rx.recv_into(&mut buf).await.unwrap() else {
        panic!("expected a create worker command");
    };

    assert_eq!(got.node_id, 2);
    assert_eq!(got.rho, 0.5);
    assert_eq!(got.solver.variables(), spec.solver.variables());
}

#[tokio::test]
async fn prox_status_survives_the_wire() {
    let (one, two) = io::duplex(1024);
    let (orch_rx, orch_tx) = io::split(one);
    let (_, mut tx) = comms::channel(orch_rx, orch_tx);
    let (worker_rx, worker_tx) = io::split(two);
    let (mut rx, _) = comms::channel(worker_rx, worker_tx);

    let values = sample_map();
    let msg = Msg::Data(Payload::Prox {
        status: SolveStatus::Infeasible,
        rho: 2.0,
        values: Cow::Borrowed(&values),
    });
    tx.send(&msg).await.unwrap();

    let mut buf = Vec::new();
    let Msg::Data(Payload::Prox { status, rho, values: got }) =
        rx.recv_into(&mut buf).await.unwrap()
    else {
        panic!("expected a prox payload");
    };

    assert!(status.is_fatal());
    assert_eq!(rho, 2.0);
    assert_eq!(*got, values);
}

#[tokio::test]
async fn peer_lines_round_trip() {
    let (one, two) = io::duplex(1024);
    let (_, tx) = io::split(one);
    let (rx, _) = io::split(two);

    let (mut rx, _) = peer_channel(rx, io::sink());
    let (_, mut tx) = peer_channel(io::empty(), tx);

    let hello = PeerMsg::Hello { nodeid: "n1".into() };
    let prox = PeerMsg::Prox {
        nodeid: "n1".into(),
        status: SolveStatus::Optimal,
        xvals: sample_map(),
    };

    tx.send(&hello).await.unwrap();
    tx.send(&prox).await.unwrap();
    drop(tx);

    assert_eq!(rx.recv().await.unwrap(), Some(hello));
    assert_eq!(rx.recv().await.unwrap(), Some(prox));
}
