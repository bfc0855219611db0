use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::{NameAllocator, WorkerIdentity};

use crate::session_ports::DatabaseConnection;
use crate::test_support::FakeConnection;

use super::{ScopedWorkspace, Workspace, with_workspace};

fn allocator(worker: &str) -> NameAllocator {
    let allocator =
        WorkerIdentity::new(worker).and_then(|identity| NameAllocator::new("x_db", identity));
    assert!(allocator.is_ok());
    allocator.unwrap_or_else(|_| unreachable!())
}

async fn drop_count(connection: &FakeConnection) -> usize {
    connection
        .statements()
        .await
        .iter()
        .filter(|statement| statement.starts_with("DROP DATABASE"))
        .count()
}

async fn panicking_body(_workspace: Workspace) -> HarnessResult<()> {
    panic!("assertion failed inside test body");
}

#[tokio::test]
async fn consecutive_workspaces_get_sequential_names() {
    let connection = Arc::new(FakeConnection::default());
    let mut allocator = allocator("worker");

    let first = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;
    assert!(first.is_ok());
    let first = first.unwrap_or_else(|_| unreachable!());
    assert_eq!(first.name(), "x_db_worker_0");
    assert!(first.release().await.is_ok());

    let second = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;
    assert!(second.is_ok());
    let second = second.unwrap_or_else(|_| unreachable!());
    assert_eq!(second.name(), "x_db_worker_1");
    assert!(second.release().await.is_ok());

    assert_eq!(
        connection.statements().await,
        vec![
            "CREATE DATABASE `x_db_worker_0`",
            "USE `x_db_worker_0`",
            "DROP DATABASE `x_db_worker_0`",
            "CREATE DATABASE `x_db_worker_1`",
            "USE `x_db_worker_1`",
            "DROP DATABASE `x_db_worker_1`",
        ]
    );
}

#[tokio::test]
async fn dead_connection_is_rejected_without_consuming_a_name() {
    let connection = Arc::new(FakeConnection::default());
    connection.kill().await;
    let mut allocator = allocator("gw0");

    let result = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;

    assert!(matches!(result, Err(HarnessError::ConnectionLost(_))));
    assert!(connection.statements().await.is_empty());
    assert_eq!(allocator.allocate(), "x_db_gw0_0");
}

#[tokio::test]
async fn failing_body_still_releases_once() {
    let connection = Arc::new(FakeConnection::default());
    let mut allocator = allocator("gw1");

    let result: HarnessResult<()> =
        with_workspace(connection.clone(), &mut allocator, |workspace| async move {
            workspace.execute("CREATE TABLE t (id INT)").await?;
            Err(HarnessError::Validation("expected two rows".to_owned()))
        })
        .await;

    assert!(matches!(result, Err(HarnessError::Validation(_))));
    assert_eq!(drop_count(&connection).await, 1);
    assert_eq!(
        connection.statements().await,
        vec![
            "CREATE DATABASE `x_db_gw1_0`",
            "USE `x_db_gw1_0`",
            "CREATE TABLE t (id INT)",
            "DROP DATABASE `x_db_gw1_0`",
        ]
    );
}

#[tokio::test]
async fn successful_body_returns_its_value() {
    let connection = Arc::new(FakeConnection::default());
    let mut allocator = allocator("gw1");

    let result = with_workspace(connection.clone(), &mut allocator, |workspace| async move {
        Ok(workspace.name().to_owned())
    })
    .await;

    assert_eq!(result.ok(), Some("x_db_gw1_0".to_owned()));
    assert_eq!(drop_count(&connection).await, 1);
}

fn current_thread_runtime() -> tokio::runtime::Runtime {
    let runtime = tokio::runtime::Builder::new_current_thread().build();
    assert!(runtime.is_ok());
    runtime.unwrap_or_else(|_| unreachable!())
}

#[test]
fn panicking_body_is_released_before_the_panic_escapes() {
    let connection = Arc::new(FakeConnection::default());
    let body_connection: Arc<dyn DatabaseConnection> = connection.clone();
    let mut allocator = allocator("gw5");

    let runtime = current_thread_runtime();
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(with_workspace(
            body_connection,
            &mut allocator,
            panicking_body,
        ))
    }));
    drop(runtime);
    assert!(outcome.is_err());

    let statements = current_thread_runtime().block_on(connection.statements());
    assert_eq!(
        statements,
        vec![
            "CREATE DATABASE `x_db_gw5_0`",
            "USE `x_db_gw5_0`",
            "DROP DATABASE `x_db_gw5_0`",
        ]
    );
}

#[tokio::test]
async fn unreleased_guard_drops_database_once() {
    let connection = Arc::new(FakeConnection::default());
    let mut allocator = allocator("gw3");

    let scoped = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;
    assert!(scoped.is_ok());
    drop(scoped);

    for _ in 0..16 {
        if drop_count(&connection).await > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(drop_count(&connection).await, 1);
}

#[tokio::test]
async fn failed_namespace_switch_drops_created_database() {
    let connection = Arc::new(FakeConnection::failing_on("USE"));
    let mut allocator = allocator("gw4");

    let result = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;

    assert!(matches!(result, Err(HarnessError::Internal(_))));
    assert_eq!(
        connection.statements().await,
        vec![
            "CREATE DATABASE `x_db_gw4_0`",
            "USE `x_db_gw4_0`",
            "DROP DATABASE `x_db_gw4_0`",
        ]
    );
}

#[tokio::test]
async fn workspace_clone_outlives_release_without_recreating_database() {
    let connection = Arc::new(FakeConnection::default());
    let mut allocator = allocator("gw6");

    let scoped = ScopedWorkspace::acquire(connection.clone(), &mut allocator).await;
    assert!(scoped.is_ok());
    let scoped = scoped.unwrap_or_else(|_| unreachable!());
    let stale = scoped.workspace().clone();
    assert!(scoped.release().await.is_ok());

    assert!(stale.execute("SELECT 1").await.is_ok());
    assert_eq!(drop_count(&connection).await, 1);
    assert_eq!(
        connection.statements().await,
        vec![
            "CREATE DATABASE `x_db_gw6_0`",
            "USE `x_db_gw6_0`",
            "DROP DATABASE `x_db_gw6_0`",
            "SELECT 1",
        ]
    );
}
