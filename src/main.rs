//! Lightbar HTTP API Server
//!
//! Runs a web server on the Pi that prepares uploaded images and paints them,
//! one column per frame, on a segmented APA102 strip. Any device on the LAN
//! can upload, prepare and display images via simple HTTP requests.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the SPI devices, processes commands
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/lightbar-rs --settings lightbar_settings.json --data-dir data
//! ```

#[cfg(not(feature = "hardware"))]
fn main() {
    eprintln!("This binary requires the 'hardware' feature (spidev).");
    eprintln!("Build with: cargo build --release");
    eprintln!("Tests can run without it: cargo test --no-default-features");
    std::process::exit(1);
}

#[cfg(feature = "hardware")]
fn main() {
    hardware_main();
}

#[cfg(feature = "hardware")]
#[tokio::main(flavor = "current_thread")]
async fn hardware_main() {
    use clap::Parser;
    use lightbar_rs::render::{self, DisplayStatus};
    use lightbar_rs::server::{self, AppState};
    use lightbar_rs::store::ImageStore;
    use lightbar_rs::{Lightbar, LightbarSettings, SegmentTopology, transport};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::EnvFilter;

    /// Lightbar HTTP API Server
    #[derive(Parser)]
    #[command(name = "lightbar-rs")]
    #[command(about = "HTTP API server for light painting with an APA102 strip")]
    #[command(version)]
    struct Args {
        /// Directory holding uploaded images and the active image
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Lightbar settings file (strip length, devices, channel order)
        #[arg(long, default_value = "./lightbar_settings.json")]
        settings: PathBuf,

        /// Port to listen on
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    }

    // RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();

    let settings = match LightbarSettings::load(&args.settings) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Could not read {}: {}", args.settings.display(), e);
            std::process::exit(1);
        }
    };
    let config = match settings.validate() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid settings in {}: {}", args.settings.display(), e);
            std::process::exit(1);
        }
    };

    let store = ImageStore::open(&args.data_dir).expect("Failed to create data directory");

    tracing::info!("Lightbar HTTP Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Strip: {} pixels over {} segment(s) @ {} Hz",
        config.total_pixels(),
        config.segments().len(),
        config.speed_hz()
    );
    tracing::info!("Data dir: {}", store.root().display());

    let speed_hz = config.speed_hz();
    let topology = SegmentTopology::open(&config, |segment| {
        tracing::info!(
            "Opening {} ({} pixels, {:?})",
            segment.address,
            segment.pixel_count,
            segment.direction
        );
        transport::open_spi(&segment.address, speed_hz)
    })
    .expect("Failed to open SPI devices");

    // Render thread writes the status, HTTP handlers read it.
    let status = Arc::new(Mutex::new(DisplayStatus::new()));
    let (render, render_thread) = render::spawn(Lightbar::new(topology), status.clone());

    let app_state = AppState {
        render,
        status,
        store,
        settings: Arc::new(settings),
        config: Arc::new(config),
    };

    let app = server::create_router(app_state);

    let addr = format!("{}:{}", args.bind, args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl http://localhost:{}/api/v1/status", args.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Blocks until the process is killed
    axum::serve(listener, app).await.expect("Server error");

    drop(render_thread);
}
