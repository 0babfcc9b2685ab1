use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use shm_slotring::driver;
use shm_slotring::driver::settings::DriverSettingsBuilder;
use shm_slotring::driver::ShutdownSignal;
use shm_slotring::Quote;
use tracing::error;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Producer,
    Consumer,
}

#[derive(Parser, Debug)]
#[clap(name = "slotring")]
#[clap(
    about = "Shared memory ring buffer producer/consumer example",
    long_about = None
)]
struct Args {
    /// Run in producer or consumer mode.
    #[clap(value_enum)]
    mode: Mode,

    /// Name of the shared memory region.
    name: String,

    /// Size of the shared memory region. Only used in producer mode.
    size: usize,

    /// Seconds to wait before producing/consuming the next message.
    delay: u64,

    /// Wait and try again when the buffer is full or empty, instead of
    /// exiting with an error.
    #[clap(long)]
    retry_collisions: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = DriverSettingsBuilder::new()
        .name(args.name)
        .size(args.size)
        .delay(Duration::from_secs(args.delay))
        .retry_collisions(args.retry_collisions)
        .build();

    let shutdown = match ShutdownSignal::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("failed to install signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.mode {
        Mode::Producer => {
            let mut rng = rand::thread_rng();
            driver::run_producer(settings.clone(), shutdown.recv(), || {
                Quote::random(&mut rng).encode()
            })
            .await
            .map(|written| info!("produced {} messages", written))
        }
        Mode::Consumer => {
            driver::run_consumer(settings.clone(), shutdown.recv(), |record| {
                let quote = Quote::decode(&record);
                info!(
                    "message: symbol: {}, price: {}, quantity: {}",
                    quote.symbol_lossy(),
                    quote.price,
                    quote.quantity
                );
            })
            .await
            .map(|read| info!("consumed {} messages", read))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} exited with error: {:?}", settings.name(), e);
            ExitCode::FAILURE
        }
    }
}
