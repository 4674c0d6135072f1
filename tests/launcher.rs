//! Launcher behaviour against real sockets.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use gateway_bootstrap::launch::{
    AppContext, AppRegistry, BindError, EntrypointError, LaunchError, LaunchSpec, Launcher,
    ProcessExit, ProcessState,
};
use gateway_bootstrap::lifecycle::TerminationSignal;
use gateway_bootstrap::provision::{DependencyManifest, Provisioner};
use gateway_bootstrap::stage;

mod common;

async fn context(ws: &common::Workspace) -> AppContext {
    let env = Provisioner::new(common::index_manager(&ws.index), ws.target())
        .install(&DependencyManifest::empty())
        .await
        .unwrap();
    let staged = stage::stage(&ws.source, &ws.workdir(), &env).await.unwrap();
    AppContext::new(env, staged)
}

fn hello_registry() -> Arc<AppRegistry> {
    let mut registry = AppRegistry::new();
    registry.register("app.main:app", |_| {
        Router::new().route("/", get(|| async { "hello" }))
    });
    Arc::new(registry)
}

fn spec(port: u16, entrypoint: &str) -> LaunchSpec {
    LaunchSpec::new("127.0.0.1", port, entrypoint.parse().unwrap()).unwrap()
}

#[tokio::test]
async fn test_serves_until_stopped() {
    let ws = common::Workspace::new("");
    common::write_tree(&ws.source, &["app/__init__.py", "app/main.py"]);
    let port = common::free_port();

    let process = Launcher::new(spec(port, "app.main:app"), hello_registry())
        .with_shutdown_timeout(Duration::from_secs(2))
        .start(context(&ws).await)
        .await
        .unwrap();
    assert_eq!(process.state(), ProcessState::Listening);
    assert_eq!(process.local_addr().port(), port);

    let body = common::client()
        .get(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "hello");

    let stop = process.stop_handle();
    let waiter = tokio::spawn(process.wait());
    stop.stop();

    let exit = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("process should stop")
        .unwrap();
    assert_eq!(exit, ProcessExit::Terminated(TerminationSignal::Requested));
    assert_eq!(exit.exit_code(), 0);

    // Port is released after shutdown.
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn test_port_in_use_is_a_bind_error() {
    let ws = common::Workspace::new("");
    common::write_tree(&ws.source, &["app/main.py"]);
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let err = Launcher::new(spec(port, "app.main:app"), hello_registry())
        .start(context(&ws).await)
        .await
        .err()
        .unwrap();

    assert!(
        matches!(err, LaunchError::Bind(BindError::AddressInUse { .. })),
        "{err}"
    );
}

#[tokio::test]
async fn test_missing_module_fails_before_bind() {
    let ws = common::Workspace::new("");
    common::write_tree(&ws.source, &["other/main.py"]);
    let port = common::free_port();

    let err = Launcher::new(spec(port, "app.main:app"), hello_registry())
        .start(context(&ws).await)
        .await
        .err()
        .unwrap();

    assert!(
        matches!(err, LaunchError::Entrypoint(EntrypointError::ModuleNotFound { .. })),
        "{err}"
    );
    // Nothing was bound.
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn test_unknown_object_fails_before_bind() {
    let ws = common::Workspace::new("");
    common::write_tree(&ws.source, &["app/main.py"]);
    let port = common::free_port();

    let err = Launcher::new(spec(port, "app.main:application"), hello_registry())
        .start(context(&ws).await)
        .await
        .err()
        .unwrap();

    assert!(
        matches!(err, LaunchError::Entrypoint(EntrypointError::ObjectNotFound { .. })),
        "{err}"
    );
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}
