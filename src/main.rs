//! Terminal client for a training host's live stream.
//!
//! Examples:
//!   mmr-watch --addr ws://localhost:5001
//!   mmr-watch --addr ws://localhost:5001 --window 10 --snapshot
//!   mmr-watch --send get_config '{}'
//!
//! The address comes from `--addr`, then `MMR_WATCH_ADDR`, then the config
//! file in the OS config directory.

use std::path::PathBuf;
use std::process;

use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use mmr_watch::error::MonitorError;
use mmr_watch::paths::AppPaths;
use mmr_watch::prelude::*;

#[derive(Debug, Default)]
struct Args {
    addr: Option<String>,
    config: Option<PathBuf>,
    window: Option<usize>,
    send: Option<(String, Value)>,
    snapshot: bool,
}

fn usage() -> ! {
    eprintln!("mmr-watch (follows a training host's WebSocket stream)");
    eprintln!("Usage: mmr-watch [options]\n");
    eprintln!("Options:");
    eprintln!("  --addr <ws://host:port>     Training host to connect to");
    eprintln!("  --config <path>             Config file (default: OS config dir)");
    eprintln!("  --window <n>                Epochs per loss summary window");
    eprintln!("  --send <type> <json>        Send one request once connected");
    eprintln!("  --snapshot                  Print the final view state as JSON");
    process::exit(1);
}

fn parse_args<I: Iterator<Item = String>>(mut it: I) -> Result<Args, MonitorError> {
    let mut args = Args::default();
    let missing = |flag: &str| MonitorError::Usage(format!("{} needs a value", flag));

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--addr" => args.addr = Some(it.next().ok_or_else(|| missing("--addr"))?),
            "--config" => {
                args.config = Some(PathBuf::from(it.next().ok_or_else(|| missing("--config"))?))
            }
            "--window" => {
                let raw = it.next().ok_or_else(|| missing("--window"))?;
                let n = raw
                    .parse()
                    .map_err(|_| MonitorError::Usage(format!("--window must be a number, got {}", raw)))?;
                args.window = Some(n);
            }
            "--send" => {
                let kind = it.next().ok_or_else(|| missing("--send"))?;
                let data = it.next().ok_or_else(|| missing("--send"))?;
                args.send = Some((kind, serde_json::from_str(&data)?));
            }
            "--snapshot" => args.snapshot = true,
            "-h" | "--help" | "help" => usage(),
            other => return Err(MonitorError::Usage(format!("unknown argument {}", other))),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<MonitorConfig, MonitorError> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::load_or_default(&AppPaths::new()?.config_file())?,
    };
    config.apply_env()?;
    if let Some(addr) = &args.addr {
        config.address = Some(addr.clone());
    }
    if let Some(window) = args.window {
        config.loss_window = window;
    }
    config.validate()?;
    Ok(config)
}

/// Resolves once the host has closed the connection.
async fn closed(handle: &MonitorHandle, mut status: watch::Receiver<ConnectionStatus>) {
    loop {
        if handle.address().is_none() && *status.borrow_and_update() == ConnectionStatus::Disconnected {
            return;
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}

async fn print_summary(handle: &MonitorHandle) {
    let state = handle.state().read().await;
    let s = state.loss_summary();
    let fmt = |v: Option<f64>| v.map(|v| format!("{:.5}", v)).unwrap_or_else(|| "-".to_string());

    println!(
        "epochs={} latest={} last_{}={} prev_{}={} improvement={}",
        s.epochs,
        fmt(s.latest),
        s.window,
        fmt(s.last_mean),
        s.window,
        fmt(s.penultimate_mean),
        fmt(s.improvement),
    );
    println!(
        "games={} player_count={}",
        state.game_info().len(),
        state.training_player_count_raw()
    );
    for game in state.worst_games(5) {
        let miss = game
            .biggest_miss()
            .map(|p| format!("{} (mmr {:.0}, predicted {:.0})", p.tracker_suffix, p.mmr, p.prediction))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} mean_loss={} rmse={} mae={} biggest_miss={}",
            game.uuid,
            fmt(game.mean_loss()),
            fmt(game.rmse),
            fmt(game.mae),
            miss
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            usage();
        }
    };
    let config = load_config(&args)?;
    let Some(address) = config.address.clone() else {
        eprintln!("No address: pass --addr or set MMR_WATCH_ADDR");
        process::exit(2);
    };

    let (handle, task) = Monitor::spawn(WsConnector, config.view_state());
    handle.set_address(Some(address));

    if let Some((kind, data)) = args.send {
        let mut status = handle.watch_status();
        let settled = status
            .wait_for(|s| *s != ConnectionStatus::Disconnected)
            .await
            .is_ok();
        if settled && handle.send(&kind, data).await {
            info!("Sent {} request", kind);
        }
    }

    tokio::select! {
        _ = closed(&handle, handle.watch_status()) => info!("Training host closed the connection"),
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C: stopping"),
    }
    handle.shutdown();
    task.await?;

    print_summary(&handle).await;
    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&handle.snapshot().await)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, MonitorError> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_all_flags() {
        let args = parse(&[
            "--addr",
            "ws://trainer:5001",
            "--window",
            "12",
            "--send",
            "set_lr",
            r#"{"lr":0.01}"#,
            "--snapshot",
        ])
        .unwrap();
        assert_eq!(args.addr.as_deref(), Some("ws://trainer:5001"));
        assert_eq!(args.window, Some(12));
        let (kind, data) = args.send.unwrap();
        assert_eq!(kind, "set_lr");
        assert_eq!(data, serde_json::json!({"lr": 0.01}));
        assert!(args.snapshot);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&["--window", "x"]), Err(MonitorError::Usage(_))));
        assert!(matches!(parse(&["--addr"]), Err(MonitorError::Usage(_))));
        assert!(matches!(parse(&["--bogus"]), Err(MonitorError::Usage(_))));
        assert!(matches!(
            parse(&["--send", "t", "{oops"]),
            Err(MonitorError::Json(_))
        ));
    }
}
