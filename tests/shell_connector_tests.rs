#![cfg(unix)]

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use scriptrun::{
    execution::drain::LINE_SEPARATOR, validate_and_execute, ConnectorError, ExecutionError,
    ExecutionRequest, ExecutorSettings, InputParameters, ScriptExecutor, ShellConnector,
};
use serde_json::json;
use tempfile::TempDir;

fn executor_in(dir: &Path) -> Arc<ScriptExecutor> {
    Arc::new(ScriptExecutor::new(ExecutorSettings {
        temp_dir: Some(dir.to_path_buf()),
        timeout: None,
    }))
}

fn shell_params(script: &str) -> InputParameters {
    [
        ("interpreter".to_string(), json!("/bin/sh")),
        ("parameter".to_string(), json!("-c")),
        ("script".to_string(), json!(script)),
    ]
    .into_iter()
    .collect()
}

fn script(lines: &[&str]) -> String {
    lines.join("\n")
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(dir)?.next().is_none())
}

#[cfg(target_os = "linux")]
async fn read_pid(path: &Path) -> Result<u32> {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return Ok(pid);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("no pid written to {}", path.display())
}

// A zombie counts as gone; nothing may reap it inside a container.
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z' | 'X') | None)
}

#[cfg(target_os = "linux")]
async fn assert_stopped(pid: u32) {
    for _ in 0..100 {
        if !is_running(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("script process {pid} is still running");
}

async fn run(dir: &TempDir, script: &str) -> Result<ShellConnector> {
    let mut connector = ShellConnector::new(executor_in(dir.path()));
    validate_and_execute(&mut connector, shell_params(script)).await?;
    Ok(connector)
}

#[tokio::test]
async fn test_multi_line_script() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let body = script(&["var=2", "echo $var", "var=$(($var+1))", "echo $var"]);
    let shell = run(&dir, &body).await?;

    let expected = format!("2{LINE_SEPARATOR}3{LINE_SEPARATOR}");
    assert_eq!(shell.result(), Some(expected.as_str()));
    assert_eq!(shell.exit_status(), Some(0));
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_silent_script_yields_empty_output() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shell = run(&dir, "true").await?;
    assert_eq!(shell.result(), Some(""));
    assert_eq!(shell.exit_status(), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_exit_status_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shell = run(&dir, "echo bye\nexit 3").await?;
    assert_eq!(shell.exit_status(), Some(3));
    assert_eq!(shell.result(), Some(format!("bye{LINE_SEPARATOR}").as_str()));
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_unknown_command_is_a_normal_result() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shell = run(&dir, "hefv ghfvg ").await?;
    assert_ne!(shell.exit_status(), Some(0));
    assert!(!shell.result().unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_standard_error_is_captured() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shell = run(&dir, "echo to-stderr 1>&2").await?;
    assert_eq!(shell.result(), Some(format!("to-stderr{LINE_SEPARATOR}").as_str()));
    Ok(())
}

#[tokio::test]
async fn test_bursty_output_is_complete() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let body = script(&[
        "echo start",
        "sleep 1",
        "i=0",
        "while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done",
        "sleep 1",
        "echo end",
    ]);
    let shell = run(&dir, &body).await?;

    let output = shell.result().unwrap_or_default();
    let lines: Vec<&str> = output.split_terminator(LINE_SEPARATOR).collect();
    assert_eq!(lines.len(), 2002);
    assert_eq!(lines[0], "start");
    assert_eq!(lines[1], "line-0");
    assert_eq!(lines[2000], "line-1999");
    assert_eq!(lines[2001], "end");
    assert_eq!(shell.exit_status(), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_pipes_run_inside_the_script() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shell = run(&dir, "printf 'a\\nb\\nc\\n' | wc -l | tr -d ' '").await?;
    assert_eq!(shell.result(), Some(format!("3{LINE_SEPARATOR}").as_str()));
    Ok(())
}

#[tokio::test]
async fn test_validation_failure_spawns_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut shell = ShellConnector::new(executor_in(dir.path()));

    let err = validate_and_execute(&mut shell, InputParameters::new())
        .await
        .unwrap_err();
    match err {
        ConnectorError::Validation(e) => assert_eq!(
            e.messages,
            vec![
                "interpreter cannot be empty!",
                "parameter cannot be empty!",
                "script cannot be empty!",
            ]
        ),
        other => panic!("expected a validation error, got {other}"),
    }
    assert!(shell.result().is_none());
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_missing_interpreter_cleans_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut shell = ShellConnector::new(executor_in(dir.path()));
    let mut params = shell_params("echo never");
    params.insert("interpreter".into(), json!("/no/such/interpreter"));

    let err = validate_and_execute(&mut shell, params).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Execution(ExecutionError::Launch(_))));
    assert_eq!(err.to_string(), "unable to execute script");
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_timeout_kills_and_cleans_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = ScriptExecutor::new(ExecutorSettings {
        temp_dir: Some(dir.path().to_path_buf()),
        timeout: Some(Duration::from_millis(500)),
    });
    let request = ExecutionRequest {
        interpreter: "/bin/sh".into(),
        parameter: "-c".into(),
        script: "echo started\nsleep 5\necho finished".into(),
    };

    let started = std::time::Instant::now();
    let err = executor.execute(&request).await.unwrap_err();
    assert!(matches!(err, ExecutionError::TimedOut(_)));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_stops_the_script_shell() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pids = tempfile::tempdir()?;
    let pid_file = pids.path().join("pid");
    let executor = ScriptExecutor::new(ExecutorSettings {
        temp_dir: Some(dir.path().to_path_buf()),
        timeout: Some(Duration::from_millis(1000)),
    });
    let request = ExecutionRequest {
        interpreter: "/bin/sh".into(),
        parameter: "-c".into(),
        script: format!(
            "echo $$ > \"{}\"\nwhile :; do sleep 1; done",
            pid_file.display()
        ),
    };

    let err = executor.execute(&request).await.unwrap_err();
    assert!(matches!(err, ExecutionError::TimedOut(_)));
    assert_stopped(read_pid(&pid_file).await?).await;
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_dropped_execution_cleans_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = executor_in(dir.path());
    let request = ExecutionRequest {
        interpreter: "/bin/sh".into(),
        parameter: "-c".into(),
        script: "sleep 5".into(),
    };

    let abandoned =
        tokio::time::timeout(Duration::from_millis(300), executor.execute(&request)).await;
    assert!(abandoned.is_err());
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropped_execution_stops_the_script_shell() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pids = tempfile::tempdir()?;
    let pid_file = pids.path().join("pid");
    let executor = executor_in(dir.path());
    let request = ExecutionRequest {
        interpreter: "/bin/sh".into(),
        parameter: "-c".into(),
        script: format!(
            "echo $$ > \"{}\"\nwhile :; do sleep 1; done",
            pid_file.display()
        ),
    };

    let abandoned =
        tokio::time::timeout(Duration::from_millis(1000), executor.execute(&request)).await;
    assert!(abandoned.is_err());
    assert_stopped(read_pid(&pid_file).await?).await;
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_background_jobs_do_not_outlive_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pids = tempfile::tempdir()?;
    let shell_pid = pids.path().join("shell");
    let job_pid = pids.path().join("job");
    let body = format!(
        "echo $$ > \"{}\"\nsleep 30 > /dev/null 2>&1 &\necho $! > \"{}\"\necho done",
        shell_pid.display(),
        job_pid.display()
    );

    let shell = run(&dir, &body).await?;
    assert_eq!(shell.exit_status(), Some(0));
    assert_eq!(shell.result(), Some(format!("done{LINE_SEPARATOR}").as_str()));
    assert_stopped(read_pid(&shell_pid).await?).await;
    assert_stopped(read_pid(&job_pid).await?).await;
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = executor_in(dir.path());
    let request = |n: usize| ExecutionRequest {
        interpreter: "/bin/sh".into(),
        parameter: "-c".into(),
        script: format!("sleep 1\necho run-{n}\nexit {n}"),
    };

    let (one, two) = (request(1), request(2));
    let (first, second) = tokio::join!(executor.execute(&one), executor.execute(&two));
    let (first, second) = (first?, second?);

    assert_eq!(first.exit_status, 1);
    assert_eq!(second.exit_status, 2);
    assert_eq!(first.output, format!("run-1{LINE_SEPARATOR}"));
    assert_eq!(second.output, format!("run-2{LINE_SEPARATOR}"));
    assert!(is_empty_dir(dir.path())?);
    Ok(())
}
