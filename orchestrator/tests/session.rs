use comms::msg::{Command, Msg};
use orchestrator::{configs::ConsensusConfig, solve};
use tokio::{net::TcpListener, runtime::Runtime, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use worker::{WorkerBuilder, WorkerErr};

/// Binds a listener and serves one orchestrator the way the worker binary does.
fn serve(runtime: &Runtime) -> (String, JoinHandle<Result<(), WorkerErr>>) {
    let listener = runtime
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = runtime.spawn(async move {
        let (stream, _) = listener.accept().await?;
        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = comms::channel(rx, tx);

        let mut rx_buf = Vec::new();
        let Msg::Control(Command::CreateWorker(spec)) = rx.recv_into(&mut rx_buf).await? else {
            panic!("expected a worker spec");
        };

        WorkerBuilder::build(spec)
            .run(rx, tx, CancellationToken::new())
            .await
    });

    (addr, handle)
}

#[test]
fn solve_over_tcp() {
    let runtime = Runtime::new().unwrap();
    let (addr0, worker0) = serve(&runtime);
    let (addr1, worker1) = serve(&runtime);

    let raw = format!(
        r#"{{
            "workers": [
                {{
                    "addr": "{addr0}",
                    "spec": {{
                        "node_id": 0,
                        "rho": 1.0,
                        "solver": {{"quadratic": {{"weight": 1.0, "targets": {{"1": [1.0, 1.0]}}}}}}
                    }}
                }},
                {{
                    "addr": "{addr1}",
                    "spec": {{
                        "node_id": 1,
                        "rho": 1.0,
                        "solver": {{"quadratic": {{"weight": 1.0, "targets": {{"1": [3.0, -1.0], "2": 5.0}}}}}}
                    }}
                }}
            ],
            "initial_xbar": {{"1": [0.0, 0.0], "2": 0.0}},
            "max_iter": 200,
            "acceleration": {{"window": 3, "max_iter": 5, "rcond": 1e6}},
            "stopping": {{"rule": "absolute", "primal": 1e-9, "dual": 1e-9}}
        }}"#
    );
    let config = ConsensusConfig::from_json(&raw).unwrap();

    let outcome = solve(config).unwrap();

    assert!(outcome.residuals.last().unwrap().stopped);
    let expected = [(1, vec![2.0, 0.0]), (2, vec![5.0])];
    for (id, values) in expected {
        let got: Vec<f64> = outcome.state.xbar.get(id).unwrap().iter().copied().collect();
        for (g, e) in got.iter().zip(&values) {
            assert!((g - e).abs() < 1e-6, "variable {id}: got {got:?}");
        }
    }

    // The session hung up once the solve was over.
    runtime.block_on(async {
        worker0.await.unwrap().unwrap();
        worker1.await.unwrap().unwrap();
    });
}
