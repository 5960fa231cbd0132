//! End-to-end tests: workers talking to a coordinator over loopback gRPC.

use mr_core::{
    Coordinator, GrpcTaskClient, TaskClient, TaskKind, TaskReply, Worker, WorkerConfig,
    WorkerRuntime, apps,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::info;

const JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts `coordinator` on an ephemeral loopback port and returns its URI.
async fn start_coordinator(coordinator: Coordinator) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(e) = coordinator.serve_with_listener(listener).await {
            eprintln!("Coordinator failed: {}", e);
        }
    });
    format!("http://{}", addr)
}

fn config(work_dir: &Path, addr: &str) -> WorkerConfig {
    WorkerConfig::default()
        .with_coordinator_addr(addr)
        .with_work_dir(work_dir)
        .with_reduce_parallelism(2)
        .with_poll_interval(Duration::from_millis(10))
}

fn write_input(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

/// Runs `workers` loops of `app` until the job is done.
async fn run_workers(app_name: &str, work_dir: &Path, addr: &str, workers: usize) {
    let config = config(work_dir, addr);
    let runtime = WorkerRuntime::from_config(&config).unwrap();
    let client = GrpcTaskClient::connect(addr.to_string()).await.unwrap();
    let app = apps::by_name(app_name).unwrap();

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let worker = Worker::new(
                format!("worker-{}", i),
                client.clone(),
                app.clone(),
                runtime.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect();
    for handle in handles {
        let state = timeout(JOB_TIMEOUT, handle)
            .await
            .expect("worker did not finish in time")
            .unwrap()
            .unwrap();
        info!("{} completed {} tasks", state.worker_id, state.completed_tasks);
    }
}

fn read_output(work_dir: &Path, bucket: u32) -> String {
    std::fs::read_to_string(work_dir.join(format!("mr-out-{}", bucket))).unwrap()
}

#[tokio::test]
async fn test_word_count_single_bucket() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "split-0.txt", "the quick fox the");

    let coordinator = Coordinator::new(vec![input], 1)
        .unwrap()
        .with_linger(Duration::from_millis(500));
    let addr = start_coordinator(coordinator.clone()).await;

    run_workers("wc", dir.path(), &addr, 1).await;

    assert!(coordinator.is_done().await);
    assert_eq!(read_output(dir.path(), 0), "fox 1\nquick 1\nthe 2\n");
    assert!(dir.path().join("mr-0-0").exists());
}

#[tokio::test]
async fn test_word_count_many_workers_two_buckets() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![
        write_input(dir.path(), "split-0.txt", "the quick brown fox"),
        write_input(dir.path(), "split-1.txt", "the lazy dog jumps over the fox"),
        write_input(dir.path(), "split-2.txt", ""),
    ];

    let coordinator = Coordinator::new(inputs, 2)
        .unwrap()
        .with_linger(Duration::from_millis(500));
    let addr = start_coordinator(coordinator.clone()).await;

    run_workers("wc", dir.path(), &addr, 3).await;
    assert!(coordinator.is_done().await);

    // Every map task published one unit per bucket, empty ones included
    for map_task in 0..3 {
        for bucket in 0..2 {
            assert!(dir.path().join(format!("mr-{}-{}", map_task, bucket)).exists());
        }
    }

    let mut counts = BTreeMap::new();
    let mut buckets_holding_the = 0;
    for bucket in 0..2 {
        let output = read_output(dir.path(), bucket);
        let keys: Vec<&str> = output
            .lines()
            .map(|line| line.split_once(' ').unwrap().0)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "bucket {} output is not sorted", bucket);

        if keys.contains(&"the") {
            buckets_holding_the += 1;
        }
        for line in output.lines() {
            let (key, value) = line.split_once(' ').unwrap();
            assert!(counts.insert(key.to_string(), value.to_string()).is_none());
        }
    }
    assert_eq!(buckets_holding_the, 1);

    let expected: BTreeMap<String, String> = [
        ("brown", "1"),
        ("dog", "1"),
        ("fox", "2"),
        ("jumps", "1"),
        ("lazy", "1"),
        ("over", "1"),
        ("quick", "1"),
        ("the", "3"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(counts, expected);
}

#[tokio::test]
async fn test_indexer_lists_documents() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_input(dir.path(), "a.txt", "cat dog cat");
    let b = write_input(dir.path(), "b.txt", "dog");

    let coordinator = Coordinator::new(vec![a.clone(), b.clone()], 1)
        .unwrap()
        .with_linger(Duration::from_millis(500));
    let addr = start_coordinator(coordinator).await;

    run_workers("indexer", dir.path(), &addr, 2).await;

    assert_eq!(
        read_output(dir.path(), 0),
        format!("cat 1 {}\ndog 2 {},{}\n", a, a, b)
    );
}

#[tokio::test]
async fn test_unreadable_input_is_reported_and_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt").to_string_lossy().into_owned();

    let coordinator = Coordinator::new(vec![missing], 2).unwrap();
    let addr = start_coordinator(coordinator.clone()).await;

    let config = config(dir.path(), &addr);
    let client = GrpcTaskClient::connect(addr.clone()).await.unwrap();
    let mut worker = Worker::new(
        "worker-0",
        client,
        apps::by_name("wc").unwrap(),
        WorkerRuntime::from_config(&config).unwrap(),
    );

    for _ in 0..3 {
        assert!(worker.step().await.unwrap());
    }
    assert_eq!(worker.state().failed_tasks, 3);
    assert_eq!(worker.state().completed_tasks, 0);
    assert_eq!(coordinator.attempts(TaskKind::Map, 0).await, Some(3));
    assert!(!coordinator.is_done().await);

    assert!(!dir.path().join("mr-0-0").exists());
    assert!(!dir.path().join("mr-0-1").exists());
    assert!(!dir.path().join("mr-out-0").exists());
}

#[tokio::test]
async fn test_duplicate_done_report_is_declined() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "split-0.txt", "a b");

    let coordinator = Coordinator::new(vec![input], 1).unwrap();
    let addr = start_coordinator(coordinator).await;
    let mut client = GrpcTaskClient::connect(addr).await.unwrap();

    let task = match client.request_task("w1").await.unwrap() {
        TaskReply::Assigned(task) => task,
        other => panic!("expected a map task, got {:?}", other),
    };
    assert_eq!(task.kind, TaskKind::Map);
    assert_eq!(task.partition_count, 1);

    // Reduces wait for the outstanding map
    assert_eq!(
        client.request_task("w2").await.unwrap(),
        TaskReply::NoTaskAvailable
    );

    assert!(client.report_done("w1", task.id, task.kind, vec![]).await.unwrap());
    assert!(!client.report_done("w1", task.id, task.kind, vec![]).await.unwrap());

    match client.request_task("w2").await.unwrap() {
        TaskReply::Assigned(reduce) => {
            assert_eq!(reduce.kind, TaskKind::Reduce);
            assert_eq!(reduce.map_task_ids, vec![0]);
        }
        other => panic!("expected a reduce task, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_reports_leave_output_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "split-0.txt", "the quick fox the");

    let coordinator = Coordinator::new(vec![input], 1)
        .unwrap()
        .with_linger(Duration::from_secs(5));
    let addr = start_coordinator(coordinator.clone()).await;
    run_workers("wc", dir.path(), &addr, 1).await;

    let output_before = read_output(dir.path(), 0);
    let unit_before = std::fs::read(dir.path().join("mr-0-0")).unwrap();
    assert_eq!(output_before, "fox 1\nquick 1\nthe 2\n");

    let mut client = GrpcTaskClient::connect(addr).await.unwrap();
    let map_locations = vec![dir.path().join("mr-0-0").to_string_lossy().into_owned()];
    let out_locations = vec![dir.path().join("mr-out-0").to_string_lossy().into_owned()];
    assert!(
        !client
            .report_done("late", 0, TaskKind::Map, map_locations)
            .await
            .unwrap()
    );
    assert!(
        !client
            .report_done("late", 0, TaskKind::Reduce, out_locations)
            .await
            .unwrap()
    );
    assert_eq!(
        client.request_task("late").await.unwrap(),
        TaskReply::AllTasksDone
    );

    assert!(coordinator.is_done().await);
    assert_eq!(read_output(dir.path(), 0), output_before);
    assert_eq!(std::fs::read(dir.path().join("mr-0-0")).unwrap(), unit_before);
}
