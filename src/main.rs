mod acquisition;
mod args;
mod config;
mod context;
mod control;
mod error;
mod frame;
mod input;
mod session;
mod slot;
mod transport;
mod writer;

use acquisition::Acquisition;
use args::Args;
use clap::Parser;
use config::Config;
use context::RecorderContext;
use control::{ControlState, Controller, Transition};
use crossbeam_channel::{bounded, select, unbounded};
use error::AppError;
use frame::FrameParser;
use input::{ChannelPrompt, Command};
use std::io::BufReader;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use writer::Writer;

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let default_level = args.verbose.log_level_filter().to_string();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if args.list_ports {
        let ports = transport::list_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config, AppError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    if args.save_config {
        match &args.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        log::info!("Saved configuration");
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), AppError> {
    let config = load_config(args)?;
    log::info!(
        "Expecting {} channels ({:?}): {}",
        config.channels.len(),
        config.encoding,
        config.channels.join(", ")
    );

    let source = transport::open_serial(&config)?;
    let context = Arc::new(RecorderContext::new());

    // Data collection thread -> slot -> writer thread
    let parser = FrameParser::new(config.encoding, config.channels.len());
    let acquisition = Acquisition::new(source, parser, context.clone(), config.poll_interval());
    let stats = acquisition.stats();
    let acquisition = acquisition.spawn().map_err(AppError::Thread)?;
    let writer = Writer::new(context.clone(), config.min_write_interval())
        .spawn()
        .map_err(AppError::Thread)?;

    let (interrupt_tx, interrupt_rx) = bounded::<()>(1);
    {
        let context = context.clone();
        ctrlc::set_handler(move || {
            context.request_shutdown();
            let _ = interrupt_tx.try_send(());
        })
        .map_err(|e| AppError::Signal(e.to_string()))?;
    }

    // The stdin thread is left blocked on its read at exit
    let (line_tx, lines) = unbounded();
    input::spawn_line_reader(BufReader::new(std::io::stdin()), line_tx).map_err(AppError::Thread)?;

    let mut controller = Controller::new(
        context.clone(),
        config.output_dir.clone(),
        config.channels.clone(),
        config.debounce(),
    );

    println!("Press Enter to start/stop recording, q to quit");
    while !context.is_shutting_down() {
        let line = select! {
            recv(lines) -> line => line.ok(),
            recv(interrupt_rx) -> _ => None,
        };
        let Some(line) = line else {
            break;
        };

        match Command::from_line(&line) {
            Command::Toggle => {
                let mut prompt = ChannelPrompt::new(&lines, &interrupt_rx);
                match controller.toggle(Instant::now(), &mut prompt) {
                    Ok(Some(Transition::Started(path))) => {
                        println!("Recording data to {}", path.display());
                    }
                    Ok(Some(Transition::Stopped(finalized))) => {
                        println!("Saved {}", finalized.path().display());
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("{}", e),
                }
            }
            Command::Quit => break,
            Command::Unknown(other) => {
                log::warn!("Unknown command {:?} (Enter toggles recording, q quits)", other);
            }
        }
    }

    log::info!("Shutting down");
    context.request_shutdown();
    if controller.state() == ControlState::Recording {
        log::warn!("Recording still running, keeping its timestamp-based name");
    }
    if let Some(finalized) = controller.shutdown() {
        println!("Saved {}", finalized.path().display());
    }

    match writer.join() {
        Ok(rows) => log::info!("{} rows written this run", rows),
        Err(_) => log::error!("Writer thread panicked"),
    }
    if acquisition.join().is_err() {
        log::error!("Acquisition thread panicked");
    }
    log::info!("{}", stats.summary());
    Ok(())
}
