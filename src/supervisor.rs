//! Built-in supervisor that restarts the bridge on crash.
//!
//! `wsmq supervise` spawns `wsmq serve` and monitors it. On abnormal exit the
//! bridge is restarted with exponential backoff; once a run stays up past the
//! stable threshold the backoff resets. A clean exit (code 0) stops the
//! supervisor. SIGINT/SIGTERM are forwarded to the child.

use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;

/// Run the supervisor loop. Does not return unless the child exits cleanly.
pub async fn run_supervisor(config_path: Option<&str>, sup_config: &SupervisorConfig) -> ! {
    let exe = std::env::current_exe().expect("resolve own executable path");
    let stable_threshold = Duration::from_secs(sup_config.stable_threshold);
    let mut backoff = 1u64;

    loop {
        let started = Instant::now();

        let mut cmd = Command::new(&exe);
        cmd.arg("serve");
        if let Some(p) = config_path {
            cmd.args(["--config", p]);
        }

        let mut child = cmd.spawn().expect("failed to spawn bridge process");
        let pid = child.id();
        info!("Supervisor: started bridge (pid {pid:?})");

        let _signal_task = tokio::spawn(forward_signals(pid));

        let status = child.wait().await;
        let uptime = started.elapsed();

        match status {
            Ok(s) if s.success() => {
                info!("Bridge exited cleanly, supervisor stopping");
                std::process::exit(0);
            }
            Ok(s) => warn!(
                "Bridge exited: {s} (uptime {:.1}s), restarting in {backoff}s",
                uptime.as_secs_f64()
            ),
            Err(e) => error!(
                "Bridge wait error: {e} (uptime {:.1}s), restarting in {backoff}s",
                uptime.as_secs_f64()
            ),
        }

        tokio::time::sleep(Duration::from_secs(backoff)).await;
        backoff = if uptime >= stable_threshold {
            1
        } else {
            (backoff * 2).min(sup_config.max_backoff)
        };
    }
}

/// Forward the first SIGINT or SIGTERM to the child, then exit.
async fn forward_signals(pid: Option<u32>) {
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
    let signum = tokio::select! {
        _ = sigint.recv() => libc::SIGINT,
        _ = sigterm.recv() => libc::SIGTERM,
    };
    if let Some(pid) = pid {
        info!("Supervisor: forwarding signal {signum} to child");
        #[allow(clippy::cast_possible_wrap)]
        unsafe {
            libc::kill(pid as i32, signum);
        }
    }
}
