//! Demo server and player for the streaming engine.
//!
//! Platform loopback capture and device playback are embedder concerns, so
//! this binary ships stand-ins: `serve` feeds a synthesized sine tone into
//! the fan-out pipeline, `play` counts what arrives. Useful for smoke
//! testing a deployment before wiring real adapters.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use lancast::{
    AudioFormat, CaptureSource, Client, FrameSink, PlaybackSink, Result, SampleEncoding, Server,
    ServerConfig,
};

#[derive(Parser)]
#[command(name = "lancast", about = "LAN loopback-audio streaming demo")]
struct Args {
    #[command(subcommand)]
    command: CommandLine,
}

#[derive(Subcommand)]
enum CommandLine {
    /// Serve a synthesized test tone to admitted players.
    Serve {
        /// Bind address (host:port), used by both TCP and UDP.
        #[arg(long, short, default_value = "0.0.0.0:5530")]
        bind: String,
        /// Path MTU used to size audio segments.
        #[arg(long, default_value_t = 1492)]
        mtu: usize,
    },
    /// Connect to a server and report the received stream.
    Play {
        /// Server host.
        #[arg(long, short = 's', default_value = "127.0.0.1")]
        host: String,
        /// Server port.
        #[arg(long, short, default_value_t = 5530)]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    match Args::parse().command {
        CommandLine::Serve { bind, mtu } => {
            let config = ServerConfig {
                mtu,
                ..ServerConfig::default()
            };
            let mut server = Server::with_config(&bind, Box::new(ToneSource::new()), config);
            if let Err(error) = server.start() {
                eprintln!("failed to start server: {error}");
                return;
            }

            println!("serving test tone on {bind} — press Enter to stop");
            wait_for_enter();
            server.stop();
        }
        CommandLine::Play { host, port } => {
            let mut client = Client::new();
            if let Err(error) = client.start(&host, port, Box::new(CountingSink::default())) {
                eprintln!("failed to start playback: {error}");
                return;
            }

            println!("playing from {host}:{port} — press Enter to stop");
            wait_for_enter();
            client.stop();
        }
    }
}

fn wait_for_enter() {
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}

/// 440 Hz sine generator standing in for loopback capture: 48 kHz stereo
/// f32, one 10 ms frame per tick from its own thread.
struct ToneSource {
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ToneSource {
    const FORMAT: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
        encoding: SampleEncoding::F32,
    };
    const FRAME_SAMPLES: usize = 480;
    const PITCH_HZ: f32 = 440.0;

    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureSource for ToneSource {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        self.worker = Some(thread::spawn(move || {
            let block_align = ToneSource::FORMAT.block_align() as usize;
            let step = ToneSource::PITCH_HZ * std::f32::consts::TAU
                / ToneSource::FORMAT.sample_rate as f32;
            let mut phase = 0f32;
            let mut frame = Vec::with_capacity(ToneSource::FRAME_SAMPLES * block_align);

            while running.load(Ordering::SeqCst) {
                frame.clear();
                for _ in 0..ToneSource::FRAME_SAMPLES {
                    let sample = (phase.sin() * 0.2).to_le_bytes();
                    frame.extend_from_slice(&sample);
                    frame.extend_from_slice(&sample);
                    phase = (phase + step) % std::f32::consts::TAU;
                }
                sink.deliver(&frame, block_align);
                thread::sleep(Duration::from_millis(10));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn format(&self) -> AudioFormat {
        Self::FORMAT
    }
}

/// Playback stand-in: tallies received bytes and logs once a second.
#[derive(Default)]
struct CountingSink {
    bytes: Arc<AtomicU64>,
    reporter: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl PlaybackSink for CountingSink {
    fn init(&mut self, format: &AudioFormat) -> Result<()> {
        tracing::info!(?format, "stream format negotiated");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let bytes = self.bytes.clone();
        self.reporter = Some(thread::spawn(move || {
            let mut previous = 0u64;
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));
                let total = bytes.load(Ordering::Relaxed);
                tracing::info!(total, rate = total - previous, "receiving");
                previous = total;
            }
        }));
        Ok(())
    }

    fn play(&mut self, frame: &[u8]) {
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.join();
        }
    }
}
