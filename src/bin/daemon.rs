// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! zonefan-daemon: system service that takes fan control from the BMC or
//! hwmon driver, runs the zone curve, and hands control back on exit.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use zonefan::config::{self, Config, GatewayConfig};
use zonefan::gateway::hwmon::HwmonGateway;
use zonefan::gateway::ipmitool::IpmitoolGateway;
use zonefan::{
    ActuatorGateway, ControlHandle, ControlLoop, ControlSettings, Exit, LogSink, SensorGateway,
    SensorReading, run_guarded,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "zonefan-daemon", about = "Two-zone fan control daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the control loop (default).
    Run,
    /// Validate the configuration and print the effective settings.
    Check,
    /// Read every configured sensor once.
    Probe {
        /// Print readings as JSON.
        #[arg(long)]
        json: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path)?;
    let settings = cfg
        .control_settings()
        .with_context(|| format!("Rejected config {}", config_path.display()))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => {
            print_settings(&cfg, &settings);
            Ok(ExitCode::SUCCESS)
        }
        Command::Probe { json } => match &cfg.gateway {
            GatewayConfig::Ipmitool(c) => {
                probe(IpmitoolGateway::new(c.clone()), &settings.sensors, json).await
            }
            GatewayConfig::Hwmon(c) => {
                let gateway = HwmonGateway::discover(c)?;
                if !json {
                    list_hwmon_sensors(&gateway);
                }
                probe(gateway, &settings.sensors, json).await
            }
        },
        Command::Run => match &cfg.gateway {
            GatewayConfig::Ipmitool(c) => run(IpmitoolGateway::new(c.clone()), settings).await,
            GatewayConfig::Hwmon(c) => run(HwmonGateway::discover(c)?, settings).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run<G>(gateway: G, settings: ControlSettings) -> anyhow::Result<ExitCode>
where
    G: SensorGateway + ActuatorGateway + Clone + Send + 'static,
{
    let control = ControlLoop::new(settings, gateway.clone(), gateway.clone(), LogSink);
    spawn_signal_handler(control.handle())?;

    match run_guarded(control, gateway).await {
        Ok(Exit::Shutdown) => Ok(ExitCode::SUCCESS),
        // The failsafe has already reported itself through the event log.
        Ok(Exit::Failsafe(_)) => Ok(ExitCode::FAILURE),
        Err(e) => Err(e).context("Controller did not start; fans left untouched"),
    }
}

async fn probe<G>(mut gateway: G, sensors: &[String], json: bool) -> anyhow::Result<ExitCode>
where
    G: SensorGateway,
{
    let mut readings = Vec::with_capacity(sensors.len());
    for name in sensors {
        readings.push(gateway.read_sensor(name).await);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&readings)?);
    } else {
        for SensorReading { name, celsius } in &readings {
            match celsius {
                Some(c) => println!("{name:<24} {c}C"),
                None => println!("{name:<24} no reading"),
            }
        }
    }

    if readings.iter().any(SensorReading::is_valid) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn list_hwmon_sensors(gateway: &HwmonGateway) {
    println!("Available hwmon sensors:");
    for sensor in gateway.sensors() {
        println!(
            "  {:<24} {}",
            sensor.id,
            sensor.label.as_deref().unwrap_or("-")
        );
    }
    println!();
}

fn print_settings(cfg: &Config, settings: &ControlSettings) {
    println!("Configuration OK");
    println!("  sensors:        {}", settings.sensors.join(", "));
    let zones: Vec<&str> = settings.zones.iter().map(|z| z.as_str()).collect();
    println!("  zones:          {}", zones.join(", "));
    println!("  poll interval:  {:?}", settings.poll_interval);
    println!("  startup duty:   {}%", settings.startup_duty);
    println!("  emergency:      {}C", settings.emergency_c);
    let backend = match &cfg.gateway {
        GatewayConfig::Ipmitool(_) => "ipmitool",
        GatewayConfig::Hwmon(_) => "hwmon",
    };
    println!("  backend:        {backend}");
    println!("  curve:");
    for step in settings.curve.steps() {
        println!("    >= {:>4}C  {:>3}%", step.temp_c, step.duty);
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Turn SIGINT or SIGTERM into a shutdown request.
fn spawn_signal_handler(handle: ControlHandle) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        log::info!("Received shutdown signal");
        handle.request_shutdown();
    });
    Ok(())
}
