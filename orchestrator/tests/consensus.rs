use std::borrow::Cow;

use anderson::AndersonConfig;
use comms::{
    OnoReceiver, OnoSender, VarId, VarMap,
    msg::{Msg, Payload},
};
use ndarray::{Array1, arr1};
use orchestrator::{
    ConsensusOrchestrator, ConsensusState, OrchestratorError, ResidualSet,
    codec::{self, CodecErr},
    stopping::{Absolute, Never, StoppingRule},
};
use tokio::{
    io::{self, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use worker::{QuadraticSolver, Worker, WorkerErr};

type Rx = OnoReceiver<ReadHalf<DuplexStream>>;
type Tx = OnoSender<WriteHalf<DuplexStream>>;
type Orchestrator = ConsensusOrchestrator<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn channel_pair() -> ((Rx, Tx), (Rx, Tx)) {
    let (stream1, stream2) = io::duplex(4096);
    let (rx1, tx1) = io::split(stream1);
    let (rx2, tx2) = io::split(stream2);
    let chan1 = comms::channel(rx1, tx1);
    let chan2 = comms::channel(rx2, tx2);
    (chan1, chan2)
}

fn vars(entries: &[(VarId, &[f64])]) -> VarMap {
    entries
        .iter()
        .map(|(id, values)| (*id, arr1(values).into_dyn()))
        .collect()
}

fn values(map: &VarMap, id: VarId) -> Vec<f64> {
    map.get(id).unwrap().iter().copied().collect()
}

/// A quadratic node: `(weight / 2) * ||x - target||^2` for every target.
struct Node {
    rho: f64,
    weight: f64,
    targets: VarMap,
}

impl Node {
    fn new(rho: f64, weight: f64, targets: VarMap) -> Self {
        Self {
            rho,
            weight,
            targets,
        }
    }
}

struct Cluster {
    orchestrator: Orchestrator,
    state: ConsensusState,
    handles: Vec<JoinHandle<Result<(), WorkerErr>>>,
}

/// Spawns every node as an in-process worker starting at a zero consensus point.
fn cluster(nodes: Vec<Node>, rule: Box<dyn StoppingRule>) -> Cluster {
    let mut channels = Vec::new();
    let mut handles = Vec::new();
    let mut ownership = Vec::new();
    let mut xbar = VarMap::new();

    for (node_id, node) in nodes.into_iter().enumerate() {
        let owned: Vec<_> = node
            .targets
            .iter()
            .map(|(id, target)| (id, target.shape().to_vec()))
            .collect();
        for (id, target) in node.targets.iter() {
            xbar.insert(id, target.mapv(|_| 0.0));
        }

        let solver = QuadraticSolver::new(node.weight, node.targets);
        let worker = Worker::new(node_id, node.rho, Box::new(solver));

        let (orch_end, (rx, tx)) = channel_pair();
        handles.push(tokio::spawn(worker.run(rx, tx, CancellationToken::new())));
        channels.push(orch_end);
        ownership.push(owned);
    }

    Cluster {
        orchestrator: ConsensusOrchestrator::new(channels, rule),
        state: ConsensusState::zeroed(xbar, &ownership).unwrap(),
        handles,
    }
}

fn tolerance() -> Box<dyn StoppingRule> {
    Box::new(Absolute {
        primal: 1e-9,
        dual: 1e-9,
    })
}

fn overlapping() -> Vec<Node> {
    vec![
        Node::new(1.0, 1.0, vars(&[(1, &[1.0, 1.0])])),
        Node::new(1.0, 1.0, vars(&[(1, &[3.0, -1.0]), (2, &[5.0])])),
    ]
}

fn disjoint() -> Vec<Node> {
    vec![
        Node::new(1.0, 1.0, vars(&[(1, &[1.0, 1.0])])),
        Node::new(1.0, 1.0, vars(&[(2, &[5.0])])),
    ]
}

fn assert_close(got: &[f64], expected: &[f64]) {
    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(expected) {
        assert!((g - e).abs() < 1e-6, "got {got:?}, expected {expected:?}");
    }
}

fn assert_non_increasing(residuals: &[ResidualSet]) {
    for set in residuals {
        assert!(set.primal >= 0.0 && set.dual >= 0.0);
    }

    for pair in residuals[1..].windows(2) {
        assert!(pair[1].primal <= pair[0].primal, "{residuals:?}");
        assert!(pair[1].dual <= pair[0].dual, "{residuals:?}");
    }
}

async fn teardown(cluster: Cluster) {
    drop(cluster.orchestrator);
    for handle in cluster.handles {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn single_worker_takes_its_own_solution() {
    let mut cluster = cluster(
        vec![Node::new(1.0, 1.0, vars(&[(1, &[4.0, -2.0])]))],
        Box::new(Never),
    );
    let (x, table) = codec::flatten(&cluster.state);

    let (x, residuals) = cluster.orchestrator.step(&x, &table).await.unwrap();
    assert_eq!(x.to_vec(), vec![2.0, -1.0, 0.0, 0.0]);
    assert_eq!(residuals, ResidualSet::default());

    let (x, residuals) = cluster.orchestrator.step(&x, &table).await.unwrap();
    assert_eq!(x.to_vec(), vec![3.0, -1.5, 0.0, 0.0]);
    assert_eq!(residuals.primal, 0.0);
    assert_eq!(residuals.dual, 5.0);
    assert_eq!(cluster.orchestrator.iteration(), 2);

    teardown(cluster).await;
}

#[tokio::test]
async fn overlapping_nodes_reach_the_weighted_mean() {
    let mut cluster = cluster(overlapping(), tolerance());
    let state = cluster.state.clone();

    let outcome = cluster.orchestrator.run(state, 200, None).await.unwrap();

    assert!(outcome.residuals.len() < 200);
    assert!(outcome.residuals.last().unwrap().stopped);
    assert_non_increasing(&outcome.residuals);
    assert_close(&values(&outcome.state.xbar, 1), &[2.0, 0.0]);
    assert_close(&values(&outcome.state.xbar, 2), &[5.0]);

    teardown(cluster).await;
}

#[tokio::test]
async fn disjoint_nodes_solve_independently() {
    let mut cluster = cluster(disjoint(), tolerance());
    let state = cluster.state.clone();

    let outcome = cluster.orchestrator.run(state, 200, None).await.unwrap();

    assert!(outcome.residuals.last().unwrap().stopped);
    assert_non_increasing(&outcome.residuals);
    assert_close(&values(&outcome.state.xbar, 1), &[1.0, 1.0]);
    assert_close(&values(&outcome.state.xbar, 2), &[5.0]);
    assert_eq!(outcome.state.duals[1].sum_squares(), 0.0);

    teardown(cluster).await;
}

#[tokio::test]
async fn acceleration_takes_fewer_steps() {
    let mut plain = cluster(overlapping(), tolerance());
    let state = plain.state.clone();
    plain.orchestrator.run(state, 200, None).await.unwrap();
    let plain_steps = plain.orchestrator.iteration();

    let mut accelerated = cluster(overlapping(), tolerance());
    let state = accelerated.state.clone();
    let config = AndersonConfig::new(3, 5, 1e6).unwrap();
    let outcome = accelerated
        .orchestrator
        .run(state, 50, Some(&config))
        .await
        .unwrap();

    assert!(outcome.residuals.last().unwrap().stopped);
    assert_close(&values(&outcome.state.xbar, 1), &[2.0, 0.0]);
    assert_close(&values(&outcome.state.xbar, 2), &[5.0]);
    assert!(accelerated.orchestrator.iteration() < plain_steps);

    teardown(plain).await;
    teardown(accelerated).await;
}

#[tokio::test]
async fn unbounded_step_aborts_the_iteration() {
    let nodes = vec![
        Node::new(1.0, 1.0, vars(&[(1, &[1.0])])),
        Node::new(1.0, -2.0, vars(&[(1, &[3.0])])),
    ];
    let mut cluster = cluster(nodes, Box::new(Never));
    let (x, table) = codec::flatten(&cluster.state);

    let err = cluster.orchestrator.step(&x, &table).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::InfeasibleOrUnbounded {
            worker_id: 1,
            status: comms::msg::SolveStatus::Unbounded,
        }
    ));
}

#[tokio::test]
async fn worker_errors_are_surfaced() {
    let mut cluster = cluster(
        vec![Node::new(1.0, 1.0, vars(&[(1, &[1.0])]))],
        Box::new(Never),
    );

    // The node owns variable 1 but only gets variable 2.
    let state = ConsensusState::new(vars(&[(2, &[0.0])]), vec![VarMap::new()]);
    let (x, table) = codec::flatten(&state);

    let err = cluster.orchestrator.step(&x, &table).await.unwrap_err();

    let OrchestratorError::WorkerError { worker_id, msg } = err else {
        panic!("expected a worker error, got {err}");
    };
    assert_eq!(worker_id, 0);
    assert!(msg.contains("variable 1"));
}

#[tokio::test]
async fn out_of_order_answer_is_a_protocol_violation() {
    let (orch_end, (mut rx, mut tx)) = channel_pair();
    let mut orchestrator: Orchestrator = ConsensusOrchestrator::new(vec![orch_end], Box::new(Never));

    let fake = tokio::spawn(async move {
        let mut buf = Vec::new();
        let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
        assert_eq!(msg.kind(), "data/scatter");

        let dual = vars(&[(1, &[0.0])]);
        tx.send(&Msg::Data(Payload::Dual(Cow::Borrowed(&dual))))
            .await
            .unwrap();
    });

    let state = ConsensusState::new(vars(&[(1, &[0.0])]), vec![vars(&[(1, &[0.0])])]);
    let (x, table) = codec::flatten(&state);
    let err = orchestrator.step(&x, &table).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::ProtocolViolation {
            worker_id: 0,
            expected: "data/residual",
            got: "data/dual",
        }
    ));
    fake.await.unwrap();
}

#[tokio::test]
async fn malformed_states_fail_before_scattering() {
    let mut cluster = cluster(
        vec![Node::new(1.0, 1.0, vars(&[(1, &[1.0])]))],
        Box::new(Never),
    );
    let (_, table) = codec::flatten(&cluster.state);

    let err = cluster
        .orchestrator
        .step(&Array1::zeros(5), &table)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Codec(CodecErr::LengthMismatch {
            got: 5,
            expected: 2
        })
    ));

    let two_nodes = ConsensusState::new(vars(&[(1, &[0.0])]), vec![vars(&[(1, &[0.0])]), VarMap::new()]);
    let (x, table) = codec::flatten(&two_nodes);
    let err = cluster.orchestrator.step(&x, &table).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    assert_eq!(cluster.orchestrator.iteration(), 0);

    teardown(cluster).await;
}
