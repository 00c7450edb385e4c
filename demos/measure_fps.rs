//! # Throughput Calibration
//!
//! Sweeps one lit pixel along the strip as fast as the SPI devices accept
//! frames and prints the sustained frame rate. Use it to pick a realistic
//! `fps` for painting. The strip is turned off afterwards, including on
//! Ctrl+C.
//!
//! ## Run it
//! ```sh
//! cargo build --release --example measure_fps
//! sudo ./target/release/examples/measure_fps --settings lightbar_settings.json -n 1500
//! ```

#[cfg(not(feature = "hardware"))]
fn main() {
    eprintln!("This example requires the 'hardware' feature.");
}

#[cfg(feature = "hardware")]
fn main() {
    use clap::Parser;
    use lightbar_rs::{
        Color, Lightbar, LightbarSettings, LogicalFrame, SegmentTopology, setup_signal_handler,
        transport,
    };
    use std::path::PathBuf;

    #[derive(Parser)]
    #[command(about = "Measure how many frames per second the lightbar sustains")]
    struct Args {
        /// Lightbar settings file
        #[arg(long, default_value = "./lightbar_settings.json")]
        settings: PathBuf,

        /// Frames to write
        #[arg(short, long, default_value = "600")]
        n: usize,

        /// Print the running rate every this many frames (default n / 4)
        #[arg(long)]
        report_every: Option<usize>,
    }

    tracing_subscriber::fmt().with_target(false).compact().init();

    let args = Args::parse();
    let config = LightbarSettings::load(&args.settings)
        .and_then(|settings| settings.validate())
        .expect("Failed to load lightbar settings");

    let speed_hz = config.speed_hz();
    let topology = SegmentTopology::open(&config, |segment| {
        transport::open_spi(&segment.address, speed_hz)
    })
    .expect("Failed to open SPI devices");
    let mut lightbar = Lightbar::new(topology);
    let cancel = setup_signal_handler().expect("Failed to install Ctrl+C handler");

    let sweep = LogicalFrame::sweep(config.total_pixels(), Color::new(255, 0, 0));
    let report_every = args.report_every.unwrap_or(args.n / 4);

    match lightbar.measure_throughput(&sweep, args.n, report_every, &cancel) {
        Ok(report) => println!(
            "{} frames in {:.2}s: {:.2} fps",
            report.frames, report.elapsed_secs, report.fps
        ),
        Err(e) => eprintln!("Throughput run failed: {e}"),
    }

    if let Err(e) = lightbar.turn_off() {
        eprintln!("Failed to turn off lightbar: {e}");
    }
}
